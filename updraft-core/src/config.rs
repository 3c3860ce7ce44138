//! YAML configuration for batch and directory syncs.
//!
//! # Storage layout
//!
//! ```text
//! ~/.updraft/
//!   config.yaml          (mode 0600)
//!   manifests/           (last published listing per directory sync)
//!   locks/               (advisory publish locks)
//! ```
//!
//! # API pattern
//!
//! Every function touching the home directory has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::layout::Layout;
use crate::types::{DirectorySpec, FileDescriptor};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_PROBE_URL: &str = "https://www.gstatic.com/generate_204";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdraftConfig {
    /// Local sync root; files land under `root/owner/repo[/branch]/…`.
    pub root: PathBuf,
    #[serde(default)]
    pub layout: Layout,
    /// Branch directory used offline for branch-scoped descriptors without a ref.
    #[serde(default = "default_branch")]
    pub default_branch: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Bearer token; takes precedence over `token_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_download_attempts")]
    pub download_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_connectivity_timeout")]
    pub connectivity_timeout_secs: u64,
    #[serde(default = "default_connectivity_interval")]
    pub connectivity_interval_secs: u64,
    #[serde(default = "default_mtime_tolerance")]
    pub mtime_tolerance_secs: u64,
    #[serde(default = "default_true")]
    pub local_fallback: bool,

    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub directories: Vec<DirectorySpec>,
}

impl UpdraftConfig {
    /// Fresh config with every tunable at its default.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: Layout::default(),
            default_branch: default_branch(),
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            probe_url: default_probe_url(),
            token: None,
            token_env: default_token_env(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            download_attempts: default_download_attempts(),
            retry_delay_ms: default_retry_delay(),
            connectivity_timeout_secs: default_connectivity_timeout(),
            connectivity_interval_secs: default_connectivity_interval(),
            mtime_tolerance_secs: default_mtime_tolerance(),
            local_fallback: true,
            files: vec![],
            directories: vec![],
        }
    }

    /// Token from config, else from the `token_env` variable. Empty values count as absent.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(&self.token_env).ok())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connectivity_timeout(&self) -> Duration {
        Duration::from_secs(self.connectivity_timeout_secs)
    }

    pub fn connectivity_interval(&self) -> Duration {
        Duration::from_secs(self.connectivity_interval_secs)
    }

    pub fn mtime_tolerance(&self) -> Duration {
        Duration::from_secs(self.mtime_tolerance_secs)
    }

    /// Reject values the sync engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root must not be empty".into()));
        }
        if self.download_attempts == 0 {
            return Err(ConfigError::Invalid(
                "download_attempts must be at least 1".into(),
            ));
        }
        for base in [&self.api_base, &self.raw_base, &self.probe_url] {
            if !(base.starts_with("https://") || base.starts_with("http://")) {
                return Err(ConfigError::Invalid(format!("'{base}' is not an http(s) URL")));
            }
        }
        for file in &self.files {
            if file.owner.is_empty() || file.repo.is_empty() || file.path.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "file entry {}/{}:{} is incomplete",
                    file.owner, file.repo, file.path
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.updraft/`. Pure, no I/O.
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".updraft")
}

/// `<home>/.updraft/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.updraft/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<UpdraftConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// Load a config from an explicit file path.
pub fn load_from(path: &Path) -> Result<UpdraftConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: UpdraftConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<UpdraftConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.updraft/config.yaml`.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &UpdraftConfig) -> Result<(), ConfigError> {
    let dir = state_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &UpdraftConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Create a default config rooted at `root`.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path, root: PathBuf) -> Result<UpdraftConfig, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = UpdraftConfig::with_root(root);
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(root: PathBuf) -> Result<UpdraftConfig, ConfigError> {
    init_at(&home()?, root)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn default_branch() -> String {
    "main".to_string()
}
fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}
fn default_raw_base() -> String {
    DEFAULT_RAW_BASE.to_string()
}
fn default_probe_url() -> String {
    DEFAULT_PROBE_URL.to_string()
}
fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}
fn default_download_attempts() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_connectivity_timeout() -> u64 {
    30
}
fn default_connectivity_interval() -> u64 {
    2
}
fn default_mtime_tolerance() -> u64 {
    3
}
fn default_true() -> bool {
    true
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    #[test]
    fn config_path_is_correct() {
        let home = make_home();
        let path = config_path_at(home.path());
        assert!(path.ends_with(".updraft/config.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let mut config = UpdraftConfig::with_root("/srv/tools");
        config.files.push(FileDescriptor::new("octo", "widgets", "bin/tool", None));
        save_at(home.path(), &config).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let home = make_home();
        let dir = state_dir_at(home.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "root: /srv/tools\n").unwrap();

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded.download_attempts, 3);
        assert_eq!(loaded.retry_delay(), Duration::from_secs(1));
        assert_eq!(loaded.api_base, DEFAULT_API_BASE);
        assert!(loaded.local_fallback);
        assert_eq!(loaded.layout, Layout::Flat);
    }

    #[test]
    fn save_cleans_up_tmp() {
        let home = make_home();
        save_at(home.path(), &UpdraftConfig::with_root("/x")).expect("save");
        let tmp = config_path_at(home.path()).with_file_name("config.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn state_dir_created_with_perms() {
        let home = make_home();
        save_at(home.path(), &UpdraftConfig::with_root("/x")).expect("save");
        let dir = state_dir_at(home.path());
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn load_missing_config_returns_not_found() {
        let home = make_home();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigNotFound { .. }));
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let mut config = UpdraftConfig::with_root("/x");
        config.download_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn explicit_token_wins_over_env() {
        let mut config = UpdraftConfig::with_root("/x");
        config.token_env = "UPDRAFT_TEST_TOKEN_UNSET_VAR".into();
        assert_eq!(config.resolve_token(), None);
        config.token = Some("secret".into());
        assert_eq!(config.resolve_token().as_deref(), Some("secret"));
        config.token = Some("  ".into());
        assert_eq!(config.resolve_token(), None);
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
