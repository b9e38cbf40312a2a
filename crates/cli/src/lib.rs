//! DocChat hosting surfaces

pub mod server;
