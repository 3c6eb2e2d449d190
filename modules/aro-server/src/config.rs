use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use aro_runtime::EngineConfig;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Compiled application (JSON feature sets).
    pub application: PathBuf,
    /// OpenAPI contract. Without one no HTTP listener is started.
    pub contract: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let application = lookup("ARO_APPLICATION")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("ARO_APPLICATION environment variable is required"))?;

        let mut engine = EngineConfig::default();
        if let Some(ms) = lookup("ARO_REQUEST_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .context("ARO_REQUEST_TIMEOUT_MS must be a number")?;
            // 0 disables the per-request deadline.
            engine.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(depth) = lookup("ARO_MAX_CASCADE") {
            engine.max_cascade = depth.parse().context("ARO_MAX_CASCADE must be a number")?;
        }

        Ok(Self {
            application,
            contract: lookup("ARO_CONTRACT").filter(|c| !c.is_empty()).map(PathBuf::from),
            host: lookup("ARO_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("ARO_PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("ARO_PORT must be a number")?,
            engine,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_summary(&self) {
        info!(
            application = %self.application.display(),
            contract = ?self.contract.as_ref().map(|c| c.display().to_string()),
            addr = %self.addr(),
            request_timeout_ms = ?self.engine.request_timeout.map(|d| d.as_millis()),
            max_cascade = self.engine.max_cascade,
            "Config loaded"
        );
    }
}
