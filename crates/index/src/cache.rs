//! Process-wide index cache with single-flight builds

use crate::{IndexArtifact, IndexError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What happens to a failed build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildFailurePolicy {
    /// The next caller that arrives after the failure builds again
    #[default]
    Retry,
    /// Every later caller gets the same failure
    Remember,
}

enum Slot {
    Empty,
    Ready,
    Failed(IndexError),
}

/// Memoizes the [`IndexArtifact`] for the lifetime of the process.
///
/// The build runs while the slot lock is held, so concurrent first calls
/// wait for the one in-flight build and observe its result or its failure.
/// A finished artifact is read without taking the lock.
pub struct IndexCache {
    ready: OnceLock<Arc<IndexArtifact>>,
    slot: Mutex<Slot>,
    policy: BuildFailurePolicy,
    finished_attempts: AtomicU64,
    builds: AtomicUsize,
}

impl IndexCache {
    pub fn new(policy: BuildFailurePolicy) -> Self {
        Self {
            ready: OnceLock::new(),
            slot: Mutex::new(Slot::Empty),
            policy,
            finished_attempts: AtomicU64::new(0),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> BuildFailurePolicy {
        self.policy
    }

    /// Return the cached artifact, running `build` only if none exists yet.
    pub async fn get_or_build<F, Fut>(&self, build: F) -> Result<Arc<IndexArtifact>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IndexArtifact>>,
    {
        if let Some(artifact) = self.get() {
            return Ok(artifact);
        }

        let seen = self.finished_attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        match &*slot {
            Slot::Ready => {
                if let Some(artifact) = self.get() {
                    return Ok(artifact);
                }
            }
            Slot::Failed(err) => {
                let finished_while_waiting =
                    self.finished_attempts.load(Ordering::Acquire) != seen;
                if self.policy == BuildFailurePolicy::Remember || finished_while_waiting {
                    debug!("Returning failure of previous index build");
                    return Err(err.clone());
                }
                info!("Retrying index build after previous failure");
            }
            Slot::Empty => {}
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        let outcome = build().await;
        self.finished_attempts.fetch_add(1, Ordering::Release);

        match outcome {
            Ok(artifact) => {
                let artifact = Arc::clone(self.ready.get_or_init(|| Arc::new(artifact)));
                *slot = Slot::Ready;
                Ok(artifact)
            }
            Err(err) => {
                warn!("Index build failed: {}", err);
                *slot = Slot::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// The artifact, if a build has already succeeded.
    pub fn get(&self) -> Option<Arc<IndexArtifact>> {
        self.ready.get().cloned()
    }

    /// How many times a build function has been started
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new(BuildFailurePolicy::default())
    }
}
