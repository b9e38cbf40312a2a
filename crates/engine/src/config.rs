//! Environment-driven settings

use crate::session::SessionOptions;
use crate::ConfigError;
use docchat_index::{BuildFailurePolicy, BuildOptions, CorpusLoader};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

const DEFAULT_CORPUS_ROOT: &str = "docs";
const DEFAULT_EXTENSIONS: &str = "md";
const DEFAULT_TOPIC: &str = "PDM";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
const DEFAULT_TEMPERATURE: f32 = 0.5;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_CHUNK_CHARS: usize = 4096;
const DEFAULT_EMBED_BATCH: usize = 32;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HISTORY_MESSAGES: usize = 10;
const DEFAULT_RETRY_FAILED_BUILD: bool = true;

/// Resolved configuration for one process
#[derive(Clone)]
pub struct Settings {
    pub api_key: String,
    pub corpus_root: PathBuf,
    pub extensions: Vec<String>,
    pub topic: String,
    pub system_prompt: String,
    pub greeting: String,
    pub gemini_base_url: String,
    pub chat_model: String,
    pub embed_model: String,
    pub temperature: f32,
    pub top_k: usize,
    pub chunk_chars: usize,
    pub embed_batch: usize,
    pub request_timeout: Duration,
    pub history_messages: usize,
    pub failure_policy: BuildFailurePolicy,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("corpus_root", &self.corpus_root)
            .field("extensions", &self.extensions)
            .field("topic", &self.topic)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("chat_model", &self.chat_model)
            .field("embed_model", &self.embed_model)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .field("request_timeout", &self.request_timeout)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Defaults for everything except the credential and corpus root
    pub fn new(api_key: impl Into<String>, corpus_root: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            corpus_root: corpus_root.into(),
            extensions: vec![DEFAULT_EXTENSIONS.to_string()],
            topic: DEFAULT_TOPIC.to_string(),
            system_prompt: default_system_prompt(DEFAULT_TOPIC),
            greeting: default_greeting(DEFAULT_TOPIC),
            gemini_base_url: DEFAULT_GEMINI_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            embed_batch: DEFAULT_EMBED_BATCH,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            history_messages: DEFAULT_HISTORY_MESSAGES,
            failure_policy: BuildFailurePolicy::default(),
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key = get(API_KEY_VAR).ok_or(ConfigError::MissingCredential)?;
        let corpus_root = get("DOCCHAT_CORPUS_ROOT").unwrap_or_else(|| DEFAULT_CORPUS_ROOT.into());
        let mut settings = Self::new(api_key, corpus_root);

        if let Some(extensions) = get("DOCCHAT_EXTENSIONS") {
            settings.extensions = extensions
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
            if settings.extensions.is_empty() {
                return Err(invalid("DOCCHAT_EXTENSIONS", &extensions, "no extensions listed"));
            }
        }

        if let Some(topic) = get("DOCCHAT_TOPIC") {
            settings.system_prompt = default_system_prompt(&topic);
            settings.greeting = default_greeting(&topic);
            settings.topic = topic;
        }
        if let Some(prompt) = get("DOCCHAT_SYSTEM_PROMPT") {
            settings.system_prompt = prompt;
        }
        if let Some(greeting) = get("DOCCHAT_GREETING") {
            settings.greeting = greeting;
        }
        if let Some(url) = get("GEMINI_BASE_URL") {
            settings.gemini_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("GEMINI_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Some(model) = get("GEMINI_EMBED_MODEL") {
            settings.embed_model = model;
        }

        let temperature: f32 = parse_or(&get, "DOCCHAT_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(invalid(
                "DOCCHAT_TEMPERATURE",
                &temperature.to_string(),
                "must be between 0.0 and 2.0",
            ));
        }
        settings.temperature = temperature;
        settings.top_k = positive(&get, "DOCCHAT_TOP_K", DEFAULT_TOP_K)?;
        settings.chunk_chars = positive(&get, "DOCCHAT_CHUNK_CHARS", DEFAULT_CHUNK_CHARS)?;
        settings.embed_batch = positive(&get, "DOCCHAT_EMBED_BATCH", DEFAULT_EMBED_BATCH)?;
        settings.history_messages =
            positive(&get, "DOCCHAT_HISTORY_MESSAGES", DEFAULT_HISTORY_MESSAGES)?;
        settings.request_timeout = Duration::from_secs(positive(
            &get,
            "DOCCHAT_REQUEST_TIMEOUT_SECS",
            DEFAULT_TIMEOUT_SECS,
        )?);

        let retry = match get("DOCCHAT_RETRY_FAILED_BUILD") {
            Some(value) => parse_bool("DOCCHAT_RETRY_FAILED_BUILD", &value)?,
            None => DEFAULT_RETRY_FAILED_BUILD,
        };
        settings.failure_policy = if retry {
            BuildFailurePolicy::Retry
        } else {
            BuildFailurePolicy::Remember
        };

        Ok(settings)
    }

    pub fn loader(&self) -> CorpusLoader {
        CorpusLoader::new(&self.corpus_root).with_extensions(&self.extensions)
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            chunk_chars: self.chunk_chars,
            embed_batch: self.embed_batch,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            greeting: self.greeting.clone(),
            top_k: self.top_k,
            stage_timeout: self.request_timeout,
            history_messages: self.history_messages,
        }
    }
}

fn default_system_prompt(topic: &str) -> String {
    format!(
        "You are an expert on {topic} and your job is to answer technical questions. \
         Assume that all questions are related to {topic}. \
         Keep your answers technical and based on facts - do not hallucinate features."
    )
}

fn default_greeting(topic: &str) -> String {
    format!("Ask me a question about {topic}!")
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| invalid(key, &value, &e.to_string())),
        None => Ok(default),
    }
}

fn positive<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value <= T::default() {
        return Err(invalid(key, &value.to_string(), "must be greater than zero"));
    }
    Ok(value)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_credential() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);

        let err = Settings::from_lookup(lookup(&[(API_KEY_VAR, "   ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingCredential);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[(API_KEY_VAR, "key")])).unwrap();

        assert_eq!(settings.api_key, "key");
        assert_eq!(settings.corpus_root, PathBuf::from("docs"));
        assert_eq!(settings.extensions, vec!["md"]);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.greeting, "Ask me a question about PDM!");
        assert!(settings.system_prompt.starts_with("You are an expert on PDM"));
        assert_eq!(settings.failure_policy, BuildFailurePolicy::Retry);
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (API_KEY_VAR, "key"),
            ("DOCCHAT_CORPUS_ROOT", "/srv/docs"),
            ("DOCCHAT_EXTENSIONS", ".md, .TXT"),
            ("DOCCHAT_TOPIC", "Cargo"),
            ("DOCCHAT_TOP_K", "5"),
            ("DOCCHAT_RETRY_FAILED_BUILD", "off"),
            ("GEMINI_BASE_URL", "http://localhost:9000/"),
        ]))
        .unwrap();

        assert_eq!(settings.corpus_root, PathBuf::from("/srv/docs"));
        assert_eq!(settings.extensions, vec!["md", "txt"]);
        assert_eq!(settings.greeting, "Ask me a question about Cargo!");
        assert_eq!(settings.top_k, 5);
        assert_eq!(settings.failure_policy, BuildFailurePolicy::Remember);
        assert_eq!(settings.gemini_base_url, "http://localhost:9000");
    }

    #[test]
    fn test_invalid_numbers() {
        let err = Settings::from_lookup(lookup(&[(API_KEY_VAR, "key"), ("DOCCHAT_TOP_K", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "DOCCHAT_TOP_K"));

        let err = Settings::from_lookup(lookup(&[
            (API_KEY_VAR, "key"),
            ("DOCCHAT_TEMPERATURE", "hot"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_debug_redacts_key() {
        let settings = Settings::new("secret-key", "docs");
        assert!(!format!("{:?}", settings).contains("secret-key"));
    }
}
