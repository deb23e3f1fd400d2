//! # Docflow Config
//!
//! Environment-driven configuration for the intake services. Unset keys fall
//! back to documented defaults; unparseable values fall back rather than
//! abort. The only hard requirement is `POSTGRES_DSN`, which fails fast at
//! startup before any workflow can run.

use thiserror::Error;

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENAI_TIMEOUT_SEC: u64 = 30;
const DEFAULT_MINIO_ENDPOINT: &str = "localhost:9000";
const DEFAULT_MINIO_BUCKET: &str = "documents";
const DEFAULT_WORKFLOW_ID_PREFIX: &str = "doc-intake";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Configuration loading errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingVar(&'static str),
}

/// Runtime configuration for the intake services.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeConfig {
    pub http_port: u16,
    pub postgres_dsn: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_timeout_sec: u64,
    pub minio_endpoint: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_bucket: String,
    pub minio_use_ssl: bool,
    pub workflow_id_prefix: String,
    pub max_upload_bytes: u64,
}

impl IntakeConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup, so tests do not touch the process
    /// environment.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = Self {
            http_port: get_parsed(&lookup, "HTTP_PORT", DEFAULT_HTTP_PORT),
            postgres_dsn: get_or(&lookup, "POSTGRES_DSN", ""),
            openai_api_key: get_or(&lookup, "OPENAI_API_KEY", ""),
            openai_model: get_or(&lookup, "OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            openai_timeout_sec: get_parsed(&lookup, "OPENAI_TIMEOUT_SEC", DEFAULT_OPENAI_TIMEOUT_SEC),
            minio_endpoint: get_or(&lookup, "MINIO_ENDPOINT", DEFAULT_MINIO_ENDPOINT),
            minio_access_key: get_or(&lookup, "MINIO_ACCESS_KEY", ""),
            minio_secret_key: get_or(&lookup, "MINIO_SECRET_KEY", ""),
            minio_bucket: get_or(&lookup, "MINIO_BUCKET", DEFAULT_MINIO_BUCKET),
            minio_use_ssl: get_parsed(&lookup, "MINIO_USE_SSL", false),
            workflow_id_prefix: get_or(&lookup, "WORKFLOW_ID_PREFIX", DEFAULT_WORKFLOW_ID_PREFIX),
            max_upload_bytes: get_parsed(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        };

        if config.postgres_dsn.is_empty() {
            return Err(ConfigError::MissingVar("POSTGRES_DSN"));
        }

        Ok(config)
    }
}

fn get_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, fallback: &str) -> String {
    match lookup(key) {
        Some(value) if !value.is_empty() => value,
        _ => fallback.to_string(),
    }
}

fn get_parsed<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    fallback: T,
) -> T {
    lookup(key)
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_applied() {
        let vars = env(&[("POSTGRES_DSN", "postgres://localhost/docflow")]);
        let config = IntakeConfig::load_from(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.openai_timeout_sec, 30);
        assert_eq!(config.minio_bucket, "documents");
        assert!(!config.minio_use_ssl);
        assert_eq!(config.workflow_id_prefix, "doc-intake");
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_missing_dsn_fails_fast() {
        let vars = env(&[]);
        assert_eq!(
            IntakeConfig::load_from(|key| vars.get(key).cloned()),
            Err(ConfigError::MissingVar("POSTGRES_DSN"))
        );
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let vars = env(&[
            ("POSTGRES_DSN", "postgres://localhost/docflow"),
            ("HTTP_PORT", "not-a-port"),
            ("MAX_UPLOAD_BYTES", "lots"),
            ("MINIO_USE_SSL", "yes-please"),
        ]);
        let config = IntakeConfig::load_from(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(!config.minio_use_ssl);
    }

    #[test]
    fn test_overrides_win() {
        let vars = env(&[
            ("POSTGRES_DSN", "postgres://db/docs"),
            ("HTTP_PORT", "9999"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("WORKFLOW_ID_PREFIX", "intake"),
            ("MINIO_USE_SSL", "true"),
        ]);
        let config = IntakeConfig::load_from(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.http_port, 9999);
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.workflow_id_prefix, "intake");
        assert!(config.minio_use_ssl);
    }
}
