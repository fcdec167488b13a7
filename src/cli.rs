use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;
use wabridge_relay::RelayConfig;
use wabridge_server::ServerConfig;
use wabridge_session::SidecarConfig;
use wabridge_telemetry::{parse_level, parse_module_level, LogFormat, TelemetryConfig};

/// Bridge a WhatsApp session to an HTTP webhook and expose a control API.
#[derive(Debug, Parser)]
#[command(name = "wabridge", version, about)]
pub struct Cli {
    /// Destination for inbound messages.
    #[arg(
        long,
        env = "WEBHOOK_URL",
        default_value = "http://localhost:5678/webhook/whatsapp-in"
    )]
    pub webhook_url: String,

    /// Destination for `GET /test-webhook-url`.
    #[arg(long, env = "TEST_WEBHOOK_URL")]
    pub test_webhook_url: Option<String>,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Browser executable handed to the session helper.
    #[arg(long, env = "BROWSER_PATH")]
    pub browser_path: Option<PathBuf>,

    #[arg(
        long,
        env = "BROWSER_ARGS",
        value_delimiter = ',',
        default_value = "--no-sandbox,--disable-setuid-sandbox,--disable-dev-shm-usage",
        allow_hyphen_values = true
    )]
    pub browser_args: Vec<String>,

    /// Where the helper persists the authenticated session.
    #[arg(long, env = "SESSION_DIR", default_value = "./.wwebjs_auth")]
    pub session_dir: PathBuf,

    /// Session helper executable.
    #[arg(long = "sidecar", env = "SIDECAR_CMD", default_value = "node")]
    pub sidecar_cmd: String,

    #[arg(
        long = "sidecar-arg",
        env = "SIDECAR_ARGS",
        value_delimiter = ',',
        default_value = "sidecar/index.js",
        allow_hyphen_values = true
    )]
    pub sidecar_args: Vec<String>,

    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: Level,

    /// Per-module level override, e.g. `wabridge_relay=debug`. Repeatable.
    #[arg(
        long = "log-module",
        env = "LOG_MODULES",
        value_delimiter = ',',
        value_parser = parse_module_level
    )]
    pub log_modules: Vec<(String, Level)>,

    /// `json` or `pretty`.
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = 30)]
    pub relay_timeout_secs: u64,
}

impl Cli {
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            module_levels: self.log_modules.clone(),
            format: self.log_format,
        }
    }

    pub fn relay(&self) -> RelayConfig {
        let mut config = RelayConfig::new(self.webhook_url.clone());
        config.test_url = self.test_webhook_url.clone();
        config.timeout = Duration::from_secs(self.relay_timeout_secs);
        config
    }

    pub fn sidecar(&self) -> SidecarConfig {
        let mut config = SidecarConfig::new(
            self.sidecar_cmd.clone(),
            self.sidecar_args.clone(),
            self.session_dir.clone(),
        );
        config.browser_path = self.browser_path.clone();
        config.browser_args = self.browser_args.clone();
        config
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            ..Default::default()
        }
    }
}
