//! Engine configuration, read once at start-up.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::BackendKind;
use crate::config::{BACKEND_ENV, BATCH_MODE_ENV};
use crate::kernels::vectorize::BatchMode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub backend: BackendKind,
    pub batch_mode: BatchMode,
}

impl BackendConfig {
    pub fn new(backend: BackendKind, batch_mode: BatchMode) -> Self {
        Self { backend, batch_mode }
    }

    /// Build from optional textual settings; `None` keeps the default.
    pub fn parse(backend: Option<&str>, batch_mode: Option<&str>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = backend {
            config.backend = raw
                .parse::<BackendKind>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {} value", BACKEND_ENV))?;
        }
        if let Some(raw) = batch_mode {
            config.batch_mode = raw
                .parse::<BatchMode>()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid {} value", BATCH_MODE_ENV))?;
        }
        Ok(config)
    }

    /// Read `MANIFOLD_BACKEND` and `MANIFOLD_BATCH_MODE`.
    pub fn from_env() -> Result<Self> {
        let backend = std::env::var(BACKEND_ENV).ok();
        let batch_mode = std::env::var(BATCH_MODE_ENV).ok();
        Self::parse(backend.as_deref(), batch_mode.as_deref())
    }

    /// Like [`from_env`](Self::from_env), but a bad value is logged and
    /// replaced by the default.
    pub fn from_env_or_default() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "ignoring backend environment, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cfg = BackendConfig::parse(None, None).unwrap();
        assert_eq!(cfg, BackendConfig::default());
        assert_eq!(cfg.backend, BackendKind::Traced);
        assert_eq!(cfg.batch_mode, BatchMode::Sequential);
    }

    #[test]
    fn test_parse_values() {
        let cfg = BackendConfig::parse(Some("eager"), Some("par")).unwrap();
        assert_eq!(cfg, BackendConfig::new(BackendKind::Eager, BatchMode::Parallel));
    }

    #[test]
    fn test_parse_error_names_variable() {
        let err = BackendConfig::parse(Some("cuda"), None).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains(BACKEND_ENV), "{}", msg);
        assert!(msg.contains("cuda"), "{}", msg);
    }

    #[test]
    fn test_json_round_trip_and_defaults() {
        let cfg = BackendConfig::new(BackendKind::Eager, BatchMode::Parallel);
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(text, r#"{"backend":"eager","batch_mode":"parallel"}"#);
        let back: BackendConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cfg);

        let partial: BackendConfig = serde_json::from_str(r#"{"batch_mode":"parallel"}"#).unwrap();
        assert_eq!(partial.backend, BackendKind::Traced);
    }
}
