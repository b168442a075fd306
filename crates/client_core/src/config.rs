use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_SETTINGS_FILE: &str = "client";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load client settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("unsupported protocol '{0}', expected http: or https:")]
    Protocol(String),
}

/// Where the backend lives and how the runtime talks to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub protocol: String,
    pub hostname: String,
    pub port: u16,
    pub api_path: String,
    pub ws_path: String,
    /// Absolute REST base, bypasses protocol/hostname/port when set.
    pub api_base_override: Option<String>,
    pub ws_base_override: Option<String>,
    pub http_success_code: u16,
    pub ws_reconnect_delay_ms: u64,
    pub request_timeout_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protocol: "http:".into(),
            hostname: "localhost".into(),
            port: 8080,
            api_path: "/2187/iapi".into(),
            ws_path: "/2187/wapi".into(),
            api_base_override: None,
            ws_base_override: None,
            http_success_code: 200,
            ws_reconnect_delay_ms: 4000,
            request_timeout_ms: None,
        }
    }
}

impl Settings {
    /// Settings pointing both REST and WebSocket traffic at `base_url`
    /// (e.g. `http://127.0.0.1:4000`), without the `/2187` prefixes.
    pub fn for_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            format!("ws://{}", base_url.trim_start_matches("http://"))
        };
        Self {
            api_base_override: Some(base_url.to_string()),
            ws_base_override: Some(ws_base),
            ..Self::default()
        }
    }

    fn scheme(&self) -> Result<&'static str, SettingsError> {
        match self.protocol.trim_end_matches(':') {
            "http" => Ok("http"),
            "https" => Ok("https"),
            other => Err(SettingsError::Protocol(other.to_string())),
        }
    }

    pub fn api_base_url(&self) -> Result<String, SettingsError> {
        if let Some(base) = &self.api_base_override {
            return Ok(base.trim_end_matches('/').to_string());
        }
        Ok(format!(
            "{}://{}:{}{}",
            self.scheme()?,
            self.hostname,
            self.port,
            self.api_path.trim_end_matches('/')
        ))
    }

    pub fn ws_url(&self, path: &str) -> Result<String, SettingsError> {
        if let Some(base) = &self.ws_base_override {
            return Ok(format!("{}{path}", base.trim_end_matches('/')));
        }
        let scheme = match self.scheme()? {
            "https" => "wss",
            _ => "ws",
        };
        Ok(format!(
            "{scheme}://{}:{}{}{path}",
            self.hostname,
            self.port,
            self.ws_path.trim_end_matches('/')
        ))
    }

    pub fn ws_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.ws_reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Loads `client.toml` from the working directory when present, then
/// `APP__*` environment overrides.
pub fn load_settings() -> Result<Settings, SettingsError> {
    build_settings(
        File::with_name(DEFAULT_SETTINGS_FILE).required(false),
        Environment::with_prefix("APP").separator("__").try_parsing(true),
    )
}

pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    build_settings(
        File::from(path).required(true),
        Environment::with_prefix("APP").separator("__").try_parsing(true),
    )
}

fn build_settings<F>(file: F, env: Environment) -> Result<Settings, SettingsError>
where
    F: config::Source + Send + Sync + 'static,
{
    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(env)
        .build()?
        .try_deserialize()?;
    settings.scheme()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
