use anyhow::Result;
use informe_core::{InformeError, PipelineConfig};
use std::env;
use tracing::warn;

/// Service configuration resolved from the environment.
///
/// A missing `OPENAI_API_KEY` is not fatal: the service starts with the
/// pipeline disabled, `/health/ready` answers 503 and the dashboard keeps
/// its action button off until a key is provided and the process restarted.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub auth_token: Option<String>,
    pub pipeline: Option<PipelineConfig>,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";

    pub fn from_env() -> Result<Self> {
        let listen_addr =
            env::var("GUI_LISTEN_ADDR").unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = env::var("GUI_MAX_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let auth_token = env::var("GUI_AUTH_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let pipeline = match PipelineConfig::from_env() {
            Ok(config) => Some(config),
            Err(InformeError::MissingSecret(var)) => {
                warn!(%var, "API key not set; report generation disabled until configured");
                None
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            listen_addr,
            max_concurrency,
            auth_token,
            pipeline,
        })
    }
}
