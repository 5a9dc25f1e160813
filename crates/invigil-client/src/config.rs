//! Client configuration and backend factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use invigil_core::session::SessionContext;
use invigil_core::sync::SyncConfig;
use invigil_core::traits::QuizBackend;

use crate::rest::RestBackend;

/// Connection settings for the course platform.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the course platform API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Supports `${VAR_NAME}` references resolved at load.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Autosave retries after a transient failure.
    #[serde(default = "default_save_retries")]
    pub save_retries: u32,
    /// Delay between autosave retries in milliseconds.
    #[serde(default = "default_save_retry_delay")]
    pub save_retry_delay_ms: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("timeout_secs", &self.timeout_secs)
            .field("save_retries", &self.save_retries)
            .field("save_retry_delay_ms", &self.save_retry_delay_ms)
            .finish()
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_save_retries() -> u32 {
    2
}
fn default_save_retry_delay() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            save_retries: default_save_retries(),
            save_retry_delay_ms: default_save_retry_delay(),
        }
    }
}

impl ClientConfig {
    /// Autosave tuning derived from this configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            max_retries: self.save_retries,
            retry_delay: std::time::Duration::from_millis(self.save_retry_delay_ms),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `invigil.toml` in the current directory
/// 2. `~/.config/invigil/config.toml`
///
/// Environment variable overrides: `INVIGIL_BASE_URL`, `INVIGIL_TOKEN`.
pub fn load_config() -> Result<ClientConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ClientConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("invigil.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ClientConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if let Ok(base_url) = std::env::var("INVIGIL_BASE_URL") {
        config.base_url = base_url;
    }
    if let Ok(token) = std::env::var("INVIGIL_TOKEN") {
        config.token = Some(token);
    }

    config.base_url = resolve_env_vars(&config.base_url);
    config.token = config.token.as_deref().map(resolve_env_vars);

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("invigil"))
}

/// REST backend for this configuration, behind the trait object the session
/// engines take.
pub fn create_backend(config: &ClientConfig) -> Arc<dyn QuizBackend> {
    Arc::new(RestBackend::new(config))
}

/// Ready-to-use session context: REST backend, system clock, and the
/// configured autosave tuning.
pub fn session_context(config: &ClientConfig) -> SessionContext {
    SessionContext::new(create_backend(config)).with_sync(config.sync_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_INVIGIL_TEST_VAR", "sekrit");
        assert_eq!(resolve_env_vars("${_INVIGIL_TEST_VAR}"), "sekrit");
        assert_eq!(
            resolve_env_vars("Bearer ${_INVIGIL_TEST_VAR}!"),
            "Bearer sekrit!"
        );
        std::env::remove_var("_INVIGIL_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.save_retries, 2);
        assert!(config.token.is_none());
    }

    #[test]
    fn parse_config_with_partial_fields() {
        let toml_str = r#"
base_url = "https://lms.example.edu"
token = "tok-123"
"#;
        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.base_url, "https://lms.example.edu");
        assert_eq!(config.token.as_deref(), Some("tok-123"));
        // Unspecified fields fall back to defaults.
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.save_retry_delay_ms, 500);
    }

    #[test]
    fn debug_masks_the_token() {
        let config = ClientConfig {
            token: Some("tok-secret".to_string()),
            ..ClientConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("tok-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn load_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"https://campus.example.edu\"").unwrap();
        writeln!(file, "save_retries = 5").unwrap();

        let config = load_config_from(Some(file.path())).unwrap();
        assert_eq!(config.base_url, "https://campus.example.edu");
        assert_eq!(config.save_retries, 5);
        assert_eq!(config.sync_config().max_retries, 5);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
