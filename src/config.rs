//! Runtime settings
//!
//! Read from the process environment. Binaries load `.env` through `dotenv`
//! before calling [`Settings::from_env`].

use crate::error::{InsightError, Result};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_env: String,
    pub llm_api_base: String,
    pub llm_api_key: String,
    pub embedding_model: String,
    pub llm_model: String,
    /// `memory` or `qdrant`.
    pub vector_provider: String,
    pub qdrant_url: Option<String>,
    pub qdrant_api_key: Option<String>,
    pub retrieval_top_k: usize,
    pub execution_timeout: Duration,
    pub max_db_connections: u32,
    pub audit_log_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_env: "dev".to_string(),
            llm_api_base: String::new(),
            llm_api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            vector_provider: "memory".to_string(),
            qdrant_url: None,
            qdrant_api_key: None,
            retrieval_top_k: 12,
            execution_timeout: Duration::from_secs(30),
            max_db_connections: 5,
            audit_log_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retrieval_top_k = match lookup("RETRIEVAL_TOP_K") {
            Some(raw) => parse_number::<usize>("RETRIEVAL_TOP_K", &raw)?,
            None => defaults.retrieval_top_k,
        };
        let execution_timeout = match lookup("EXECUTION_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("EXECUTION_TIMEOUT_SECS", &raw)?),
            None => defaults.execution_timeout,
        };
        let max_db_connections = match lookup("MAX_DB_CONNECTIONS") {
            Some(raw) => parse_number::<u32>("MAX_DB_CONNECTIONS", &raw)?,
            None => defaults.max_db_connections,
        };

        Ok(Self {
            app_env: text("APP_ENV", defaults.app_env),
            llm_api_base: text("LLM_API_BASE", defaults.llm_api_base),
            llm_api_key: text("LLM_API_KEY", defaults.llm_api_key),
            embedding_model: text("EMBEDDING_MODEL", defaults.embedding_model),
            llm_model: text("LLM_MODEL", defaults.llm_model),
            vector_provider: text("VECTOR_PROVIDER", defaults.vector_provider).trim().to_lowercase(),
            qdrant_url: optional("QDRANT_URL"),
            qdrant_api_key: optional("QDRANT_API_KEY"),
            retrieval_top_k,
            execution_timeout,
            max_db_connections,
            audit_log_path: optional("AUDIT_LOG_PATH").map(PathBuf::from),
            log_filter: text("LOG_FILTER", defaults.log_filter),
        })
    }

    /// The HTTP embedding provider is used only when both base URL and key are set.
    pub fn embedding_configured(&self) -> bool {
        !self.llm_api_base.trim().is_empty() && !self.llm_api_key.trim().is_empty()
    }

    /// Qdrant backs the vector store only when selected and given a URL.
    pub fn qdrant_configured(&self) -> bool {
        self.vector_provider == "qdrant" && self.qdrant_url.is_some()
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| InsightError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_env_empty() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.retrieval_top_k, 12);
        assert_eq!(settings.execution_timeout, Duration::from_secs(30));
        assert!(settings.audit_log_path.is_none());
        assert!(!settings.embedding_configured());
        assert_eq!(settings.llm_model, "gpt-4o-mini");
        assert_eq!(settings.vector_provider, "memory");
        assert!(!settings.qdrant_configured());
    }

    #[test]
    fn test_qdrant_needs_provider_and_url() {
        let only_url = Settings::from_lookup(lookup_from(&[("QDRANT_URL", "http://localhost:6333")])).unwrap();
        assert!(!only_url.qdrant_configured());

        let only_provider = Settings::from_lookup(lookup_from(&[("VECTOR_PROVIDER", "qdrant"), ("QDRANT_URL", " ")])).unwrap();
        assert!(!only_provider.qdrant_configured());

        let settings = Settings::from_lookup(lookup_from(&[
            ("VECTOR_PROVIDER", "Qdrant"),
            ("QDRANT_URL", "http://localhost:6333"),
            ("QDRANT_API_KEY", "k"),
        ]))
        .unwrap();
        assert!(settings.qdrant_configured());
        assert_eq!(settings.qdrant_api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_overrides_and_embedding_flag() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("LLM_API_BASE", "https://llm.internal/v1"),
            ("LLM_API_KEY", "secret"),
            ("RETRIEVAL_TOP_K", "20"),
            ("AUDIT_LOG_PATH", "/var/log/audit.jsonl"),
        ]))
        .unwrap();
        assert!(settings.embedding_configured());
        assert_eq!(settings.retrieval_top_k, 20);
        assert_eq!(settings.audit_log_path, Some(PathBuf::from("/var/log/audit.jsonl")));
    }

    #[test]
    fn test_malformed_number_is_config_error() {
        let err = Settings::from_lookup(lookup_from(&[("MAX_DB_CONNECTIONS", "many")])).unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));
    }
}
