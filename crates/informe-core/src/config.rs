use std::env;
use std::time::Duration;

use crate::InformeError;

/// Wrapper around sensitive values to reduce accidental logging.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Resolved pipeline configuration, passed explicitly into the workflow.
///
/// Nothing is ever written back into the process environment; concurrent
/// sessions each read the same immutable value.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub api_key: SecretValue,
    pub api_base: String,
    pub model: String,
    pub summary_sentences: usize,
    pub step_timeout: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_API_BASE: &'static str = "https://models.inference.ai.azure.com";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";
    pub const DEFAULT_SUMMARY_SENTENCES: usize = 25;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Resolve the configuration from process environment variables.
    ///
    /// `OPENAI_API_KEY` is required; `OPENAI_API_BASE`, `OPENAI_MODEL_NAME`,
    /// `INFORME_SUMMARY_SENTENCES` and `INFORME_TIMEOUT_SECS` fall back to
    /// defaults. The key format is not validated here; an invalid key only
    /// surfaces when the first model call fails.
    pub fn from_env() -> Result<Self, InformeError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Resolve the configuration from an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, InformeError> {
        let api_key = match get("OPENAI_API_KEY") {
            Some(value) if !value.trim().is_empty() => SecretValue::new(value),
            _ => return Err(InformeError::MissingSecret("OPENAI_API_KEY".to_string())),
        };

        let api_base = get("OPENAI_API_BASE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string());

        let model = get("OPENAI_MODEL_NAME")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());

        let summary_sentences = match get("INFORME_SUMMARY_SENTENCES") {
            Some(value) => value.trim().parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(
                || {
                    InformeError::InvalidConfiguration(
                        "INFORME_SUMMARY_SENTENCES must be a positive integer".to_string(),
                    )
                },
            )?,
            None => Self::DEFAULT_SUMMARY_SENTENCES,
        };

        let step_timeout = match get("INFORME_TIMEOUT_SECS") {
            Some(value) => value.trim().parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(
                || {
                    InformeError::InvalidConfiguration(
                        "INFORME_TIMEOUT_SECS must be a positive integer".to_string(),
                    )
                },
            )?,
            None => Self::DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            api_base,
            model,
            summary_sentences,
            step_timeout: Duration::from_secs(step_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let env = vars(&[("OPENAI_API_KEY", "token")]);
        let config = PipelineConfig::from_lookup(|k| env.get(k).cloned()).expect("config");

        assert_eq!(config.api_key.expose(), "token");
        assert_eq!(config.api_base, PipelineConfig::DEFAULT_API_BASE);
        assert_eq!(config.model, PipelineConfig::DEFAULT_MODEL);
        assert_eq!(config.summary_sentences, 25);
        assert_eq!(config.step_timeout, Duration::from_secs(300));
    }

    #[test]
    fn missing_key_is_reported() {
        let env = vars(&[("OPENAI_API_BASE", "https://example.test")]);
        let err = PipelineConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, InformeError::MissingSecret(_)));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let env = vars(&[("OPENAI_API_KEY", "   ")]);
        let err = PipelineConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, InformeError::MissingSecret(_)));
    }

    #[test]
    fn overrides_are_honored() {
        let env = vars(&[
            ("OPENAI_API_KEY", "token"),
            ("OPENAI_API_BASE", "https://example.test/v1"),
            ("OPENAI_MODEL_NAME", "gpt-4o-mini"),
            ("INFORME_SUMMARY_SENTENCES", "5"),
            ("INFORME_TIMEOUT_SECS", "30"),
        ]);
        let config = PipelineConfig::from_lookup(|k| env.get(k).cloned()).expect("config");

        assert_eq!(config.api_base, "https://example.test/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.summary_sentences, 5);
        assert_eq!(config.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_sentence_count_is_rejected() {
        let env = vars(&[
            ("OPENAI_API_KEY", "token"),
            ("INFORME_SUMMARY_SENTENCES", "zero"),
        ]);
        let err = PipelineConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, InformeError::InvalidConfiguration(_)));
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = SecretValue::new("hunter2");
        assert_eq!(format!("{secret:?}"), "***redacted***");
    }
}
