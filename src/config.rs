use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for RepoMirror
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// GitLab (source platform) settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// GitHub (destination platform) settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Git transport used for both the source clone and the destination push.
///
/// Any other value in the configuration file fails deserialization, which
/// aborts the run before any repository is touched.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Ambient key-based transport (git@host:owner/repo.git)
    Ssh,
    /// Token-authenticated HTTPS
    #[default]
    Https,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Ssh => "ssh",
            TransportMode::Https => "https",
        }
    }
}

/// GitLab configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitLabConfig {
    /// GitLab instance to mirror from
    #[serde(default = "default_gitlab_host")]
    pub host: String,

    /// Personal access token (falls back to GITLAB_TOKEN)
    pub token: Option<String>,
}

/// GitHub configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// Authentication method
    #[serde(default = "default_auth_method")]
    pub auth_method: String, // "auto", "gh_cli", "token"

    /// Destination account login (auto-detected if null, falls back to
    /// GITHUB_USERNAME)
    pub username: Option<String>,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Git transport mode
    #[serde(default)]
    pub transport: TransportMode,

    /// Per-repository time budget in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Source repository exclusion patterns
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Where ephemeral working areas are created (system temp if null)
    pub workdir_root: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_gitlab_host() -> String {
    "https://gitlab.com".to_string()
}
fn default_auth_method() -> String {
    "auto".to_string()
}
fn default_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            host: default_gitlab_host(),
            token: None,
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            auth_method: default_auth_method(),
            username: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            timeout: default_timeout(),
            exclude_patterns: Vec::new(),
            workdir_root: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gitlab: GitLabConfig::default(),
            github: GitHubConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }

            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repomirror").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(root) = &self.sync.workdir_root {
            self.sync.workdir_root = Some(
                shellexpand::full(root)
                    .context("Failed to expand workdir_root path")?
                    .into_owned(),
            );
        }

        Ok(())
    }

    /// Resolve the GitLab token from the config file or GITLAB_TOKEN.
    pub fn gitlab_token(&self) -> Result<String> {
        if let Some(token) = &self.gitlab.token {
            if !token.is_empty() {
                return Ok(token.clone());
            }
        }

        match std::env::var("GITLAB_TOKEN") {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(anyhow!(
                "No GitLab token found. Set `gitlab.token` in the config file \
                 or the GITLAB_TOKEN environment variable."
            )),
        }
    }

    /// Destination account override from the config file or GITHUB_USERNAME.
    pub fn github_username_override(&self) -> Option<String> {
        self.github
            .username
            .clone()
            .or_else(|| std::env::var("GITHUB_USERNAME").ok().filter(|u| !u.is_empty()))
    }

    /// Per-repository time budget.
    pub fn per_repo_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout)
    }

    /// Root directory for ephemeral working areas, if overridden.
    pub fn workdir_root(&self) -> Option<PathBuf> {
        self.sync.workdir_root.as_ref().map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.gitlab.host, "https://gitlab.com");
        assert!(config.gitlab.token.is_none());
        assert_eq!(config.github.auth_method, "auto");
        assert!(config.github.username.is_none());
        assert_eq!(config.sync.transport, TransportMode::Https);
        assert_eq!(config.sync.timeout, 600);
        assert!(config.sync.exclude_patterns.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
gitlab:
  host: "https://gitlab.example.com"
  token: "glpat-abc"
github:
  auth_method: "token"
  username: "mirror-bot"
sync:
  transport: "ssh"
  timeout: 120
  exclude_patterns:
    - "archived-*"
    - "*.wiki"
logging:
  level: "debug"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.gitlab.host, "https://gitlab.example.com");
        assert_eq!(config.gitlab.token, Some("glpat-abc".to_string()));
        assert_eq!(config.github.auth_method, "token");
        assert_eq!(config.github.username, Some("mirror-bot".to_string()));
        assert_eq!(config.sync.transport, TransportMode::Ssh);
        assert_eq!(config.sync.timeout, 120);
        assert_eq!(config.sync.exclude_patterns.len(), 2);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_unsupported_transport_mode_is_rejected() {
        let yaml_content = r#"
sync:
  transport: "ftp"
"#;
        let result: std::result::Result<Config, _> = serde_yaml::from_str(yaml_content);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.gitlab.host = "https://gitlab.internal".to_string();
        config.github.username = Some("backup-account".to_string());
        config.sync.transport = TransportMode::Ssh;
        config.sync.timeout = 90;

        config.save(&config_path).expect("Failed to save config");
        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.gitlab.host, "https://gitlab.internal");
        assert_eq!(loaded.github.username, Some("backup-account".to_string()));
        assert_eq!(loaded.sync.transport, TransportMode::Ssh);
        assert_eq!(loaded.sync.timeout, 90);
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_paths() {
        env::set_var("TEST_REPOMIRROR_SCRATCH", "/test/scratch");

        let mut config = Config::default();
        config.sync.workdir_root = Some("${TEST_REPOMIRROR_SCRATCH}/mirrors".to_string());

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(
            config.sync.workdir_root,
            Some("/test/scratch/mirrors".to_string())
        );

        env::remove_var("TEST_REPOMIRROR_SCRATCH");
    }

    #[test]
    #[serial]
    fn test_gitlab_token_prefers_config_over_env() {
        env::set_var("GITLAB_TOKEN", "from-env");

        let mut config = Config::default();
        config.gitlab.token = Some("from-file".to_string());
        assert_eq!(config.gitlab_token().unwrap(), "from-file");

        config.gitlab.token = None;
        assert_eq!(config.gitlab_token().unwrap(), "from-env");

        env::remove_var("GITLAB_TOKEN");
        assert!(config.gitlab_token().is_err());
    }

    #[test]
    #[serial]
    fn test_github_username_override_falls_back_to_env() {
        env::remove_var("GITHUB_USERNAME");

        let mut config = Config::default();
        assert!(config.github_username_override().is_none());

        env::set_var("GITHUB_USERNAME", "env-user");
        assert_eq!(config.github_username_override(), Some("env-user".to_string()));

        config.github.username = Some("file-user".to_string());
        assert_eq!(config.github_username_override(), Some("file-user".to_string()));

        env::remove_var("GITHUB_USERNAME");
    }

    #[test]
    fn test_default_config_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("repomirror"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }
}
