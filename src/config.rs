use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::MirrorError;

/// Main configuration structure for mirrormaker
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitHub (source platform) settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// GitLab (target platform) settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// GitHub configuration
#[derive(Deserialize, Serialize, Clone)]
pub struct GitHubConfig {
    /// REST API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Web host used in mirror URLs
    #[serde(default = "default_github_host")]
    pub host: String,

    /// Personal access token
    pub token: Option<String>,

    /// GitHub namespace for mirror URLs (authenticated login if null)
    pub username: Option<String>,
}

/// GitLab configuration
#[derive(Deserialize, Serialize, Clone)]
pub struct GitLabConfig {
    /// Instance URL
    #[serde(default = "default_gitlab_url")]
    pub url: String,

    /// Personal access token
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"
}

// Default value functions
fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
fn default_github_host() -> String {
    "github.com".to_string()
}
fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations
impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            host: default_github_host(),
            token: None,
            username: None,
        }
    }
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: default_gitlab_url(),
            token: None,
            timeout: default_timeout(),
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

fn redacted(token: &Option<String>) -> Option<&'static str> {
    token.as_ref().map(|_| "*****")
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("host", &self.host)
            .field("token", &redacted(&self.token))
            .field("username", &self.username)
            .finish()
    }
}

impl fmt::Debug for GitLabConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabConfig")
            .field("url", &self.url)
            .field("token", &redacted(&self.token))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Tokens for both platforms, validated before any network call
#[derive(Clone)]
pub struct Credentials {
    pub github_token: String,
    pub gitlab_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials { .. }")
    }
}

/// Values given on the command line (or their environment variables)
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub github_token: Option<String>,
    pub gitlab_token: Option<String>,
    pub github_user: Option<String>,
}

impl Config {
    /// Load configuration from the default location, or defaults if there is none
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let path = Self::expand_path(path)?;

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("mirrormaker").join("config.yml"))
    }

    /// Expand `~` and environment variables in a path given by the user
    fn expand_path(path: &Path) -> Result<PathBuf> {
        let raw = path.to_string_lossy();
        let expanded = shellexpand::full(&raw)
            .with_context(|| format!("Failed to expand config path: {}", raw))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Apply command-line values on top of the file configuration
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(token) = overrides.github_token {
            self.github.token = Some(token);
        }
        if let Some(token) = overrides.gitlab_token {
            self.gitlab.token = Some(token);
        }
        if let Some(user) = overrides.github_user {
            self.github.username = Some(user);
        }
    }

    /// Tokens for both platforms; missing or blank tokens are a configuration error
    pub fn credentials(&self) -> Result<Credentials, MirrorError> {
        fn require(token: &Option<String>, what: &str) -> Result<String, MirrorError> {
            match token.as_deref().map(str::trim) {
                Some(token) if !token.is_empty() => Ok(token.to_string()),
                _ => Err(MirrorError::configuration(format!(
                    "missing {} (pass --{} or set it in the config file)",
                    what,
                    what.to_lowercase().replace(' ', "-")
                ))),
            }
        }

        Ok(Credentials {
            github_token: require(&self.github.token, "GitHub token")?,
            gitlab_token: require(&self.gitlab.token, "GitLab token")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.host, "github.com");
        assert_eq!(config.github.token, None);
        assert_eq!(config.gitlab.url, "https://gitlab.com");
        assert_eq!(config.gitlab.timeout, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(
            &config_path,
            r#"
github:
  token: "ghp_file"
  username: "octocat"
gitlab:
  url: "https://gitlab.example.com/"
  timeout: 5
"#,
        )
        .expect("Failed to write config");

        let config = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(config.github.token.as_deref(), Some("ghp_file"));
        assert_eq!(config.github.username.as_deref(), Some("octocat"));
        assert_eq!(config.github.host, "github.com");
        assert_eq!(config.gitlab.url, "https://gitlab.example.com/");
        assert_eq!(config.gitlab.timeout, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        std::fs::write(&config_path, "github: [unterminated").expect("Failed to write config");

        let err = Config::load(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());
        config.gitlab.token = Some("gitlab-file".to_string());

        config.apply_overrides(Overrides {
            github_token: Some("from-cli".to_string()),
            gitlab_token: None,
            github_user: Some("someone".to_string()),
        });

        assert_eq!(config.github.token.as_deref(), Some("from-cli"));
        assert_eq!(config.gitlab.token.as_deref(), Some("gitlab-file"));
        assert_eq!(config.github.username.as_deref(), Some("someone"));
    }

    #[test]
    fn test_missing_tokens_are_configuration_errors() {
        let mut config = Config::default();
        assert_matches!(
            config.credentials(),
            Err(MirrorError::Configuration(msg)) if msg.contains("GitHub token")
        );

        config.github.token = Some("ghp_x".to_string());
        config.gitlab.token = Some("   ".to_string());
        assert_matches!(
            config.credentials(),
            Err(MirrorError::Configuration(msg)) if msg.contains("--gitlab-token")
        );

        config.gitlab.token = Some("glpat-x".to_string());
        let credentials = config.credentials().unwrap();
        assert_eq!(credentials.github_token, "ghp_x");
        assert_eq!(credentials.gitlab_token, "glpat-x");
    }

    #[test]
    fn test_debug_output_hides_tokens() {
        let mut config = Config::default();
        config.github.token = Some("ghp_secret".to_string());
        config.gitlab.token = Some("glpat-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghp_secret"));
        assert!(!debug.contains("glpat-secret"));
        assert!(!format!("{:?}", config.credentials().unwrap()).contains("secret"));
    }

    #[test]
    fn test_config_default_path_xdg() {
        let default_path = Config::default_config_path().expect("Failed to get default path");
        assert!(default_path.to_string_lossy().contains("mirrormaker"));
        assert!(default_path.to_string_lossy().ends_with("config.yml"));
    }
}
