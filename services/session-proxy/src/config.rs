//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Session tokens are seeded from SESSION_ACCESS_TOKEN and
//! SESSION_REFRESH_TOKEN, never stored in the TOML directly.

use common::Secret;
use serde::Deserialize;
use session_refresh::DEFAULT_EXCLUDED_ENDPOINTS;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    /// Token pair from the environment, applied at startup
    #[serde(skip)]
    pub seed: Option<SeedTokens>,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session refresh settings
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub refresh_url: String,
    pub credential_file: PathBuf,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_excluded_endpoints")]
    pub excluded_endpoints: Vec<String>,
}

/// Admin API settings; disabled when `listen_addr` is absent
#[derive(Debug, Default, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

/// Access/refresh pair supplied through the environment
#[derive(Debug)]
pub struct SeedTokens {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_excluded_endpoints() -> Vec<String> {
    DEFAULT_EXCLUDED_ENDPOINTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn require_http(field: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {url}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Seed tokens are only taken when both SESSION_ACCESS_TOKEN and
    /// SESSION_REFRESH_TOKEN are set and non-empty.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        require_http("upstream_url", &config.proxy.upstream_url)?;
        require_http("refresh_url", &config.session.refresh_url)?;

        if config.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let access = std::env::var("SESSION_ACCESS_TOKEN").unwrap_or_default();
        let refresh = std::env::var("SESSION_REFRESH_TOKEN").unwrap_or_default();
        if !access.trim().is_empty() && !refresh.trim().is_empty() {
            config.seed = Some(SeedTokens {
                access: Secret::new(access.trim().to_owned()),
                refresh: Secret::new(refresh.trim().to_owned()),
            });
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-proxy.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_seed_env() {
        unsafe {
            remove_env("SESSION_ACCESS_TOKEN");
            remove_env("SESSION_REFRESH_TOKEN");
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "https://api.example.com"

[session]
refresh_url = "https://api.example.com/auth/refresh"
credential_file = "/var/lib/session-proxy/credentials.json"
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        let config = Config::load(&path).unwrap();
        assert_eq!(config.proxy.upstream_url, "https://api.example.com");
        assert_eq!(config.proxy.timeout_secs, 60);
        assert_eq!(config.proxy.max_connections, 1000);
        assert_eq!(
            config.session.refresh_url,
            "https://api.example.com/auth/refresh"
        );
        assert!(config.session.client_id.is_none());
        assert_eq!(
            config.session.excluded_endpoints,
            vec!["/auth/login", "/auth/register", "/auth/refresh"]
        );
        assert!(config.admin.listen_addr.is_none());
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "http://localhost:3000"
timeout_secs = 15
max_connections = 500

[session]
refresh_url = "http://localhost:3000/token/refresh"
credential_file = "creds.json"
client_id = "mobile"
excluded_endpoints = ["/token/issue"]

[admin]
listen_addr = "127.0.0.1:9090"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.proxy.timeout_secs, 15);
        assert_eq!(config.proxy.max_connections, 500);
        assert_eq!(config.session.client_id.as_deref(), Some("mobile"));
        assert_eq!(config.session.excluded_endpoints, vec!["/token/issue"]);
        assert_eq!(
            config.admin.listen_addr,
            Some("127.0.0.1:9090".parse().unwrap())
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_session_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "https://api.example.com"
"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_seed_tokens_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe {
            set_env("SESSION_ACCESS_TOKEN", "at_env");
            set_env("SESSION_REFRESH_TOKEN", "rt_env\n");
        }
        let config = Config::load(&path).unwrap();
        clear_seed_env();

        let seed = config.seed.unwrap();
        assert_eq!(seed.access.expose(), "at_env");
        assert_eq!(seed.refresh.expose(), "rt_env");
    }

    #[test]
    fn test_seed_requires_both_tokens() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        clear_seed_env();
        unsafe { set_env("SESSION_ACCESS_TOKEN", "at_env") };
        let config = Config::load(&path).unwrap();
        clear_seed_env();

        assert!(
            config.seed.is_none(),
            "an access token without a refresh token must not seed the store"
        );
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("session-proxy.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace("https://api.example.com\"", "api.example.com\""),
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("upstream_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_invalid_refresh_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace("https://api.example.com/auth/refresh", "/auth/refresh"),
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("refresh_url must start with http"), "got: {err}");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace(
                "upstream_url = \"https://api.example.com\"",
                "upstream_url = \"https://api.example.com\"\ntimeout_secs = 0",
            ),
        );
        assert!(
            Config::load(&path).is_err(),
            "timeout_secs = 0 must be rejected"
        );
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_seed_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &valid_toml().replace(
                "upstream_url = \"https://api.example.com\"",
                "upstream_url = \"https://api.example.com\"\nmax_connections = 0",
            ),
        );
        assert!(
            Config::load(&path).is_err(),
            "max_connections = 0 must be rejected"
        );
    }
}
