//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from a TOML file; every setting has a
//! compiled default so a missing or broken file never prevents startup.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `ROLLCALL_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "ROLLCALL_ROOT_FOLDER";

/// Environment variable pointing at an explicit config file
pub const CONFIG_FILE_ENV: &str = "ROLLCALL_CONFIG";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "rollcall.db";

/// Index artifact directory inside the root folder
pub const ARTIFACT_DIR: &str = "serialized";

fn default_port() -> u16 {
    5730
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gateway_timeout_ms() -> u64 {
    5000
}

fn default_acceptance_threshold() -> f64 {
    0.6
}

fn default_capture_timeout_ms() -> u64 {
    120_000
}

// ========================================
// TOML bootstrap configuration
// ========================================

/// Bootstrap configuration loaded from TOML
///
/// Cannot change while the service is running.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and index artifacts
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub gateways: GatewayConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            gateways: GatewayConfig::default(),
            recognition: RecognitionConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Which gateway implementation backs the derived indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// In-process index structures
    #[default]
    Embedded,
    /// External index executables invoked per operation
    External,
}

/// Index gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub mode: GatewayMode,

    /// Upper bound on any single gateway call
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,

    /// Working directory of the external executables (defaults to the root
    /// folder); they read `executable/data/students.csv` relative to it
    #[serde(default)]
    pub work_dir: Option<PathBuf>,

    /// Directory holding the external index executables, relative to `work_dir`
    /// unless absolute (defaults to `executable`)
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Directory for serialized index artifacts (defaults to `<root>/serialized`)
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::default(),
            timeout_ms: default_gateway_timeout_ms(),
            work_dir: None,
            bin_dir: None,
            artifact_dir: None,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Identity resolution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Maximum (exclusive) descriptor distance accepted as a match
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
        }
    }
}

/// Biometric capture configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Capture program and its arguments; `None` disables device capture
    #[serde(default)]
    pub command: Option<Vec<String>>,

    #[serde(default = "default_capture_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_ms: default_capture_timeout_ms(),
        }
    }
}

impl CaptureConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl TomlConfig {
    /// Parse a config file, failing on unreadable or malformed content
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first config file found, degrading to defaults
    ///
    /// A missing file is logged at info, a malformed one at warn; neither
    /// stops startup.
    pub fn load() -> Self {
        let Some(path) = locate_config_file() else {
            info!("No config file found, using built-in defaults");
            return Self::default();
        };

        match Self::load_from(&path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.recognition.acceptance_threshold > 0.0) {
            return Err(Error::Config(format!(
                "recognition.acceptance_threshold must be positive, got {}",
                self.recognition.acceptance_threshold
            )));
        }
        if self.gateways.timeout_ms == 0 {
            return Err(Error::Config(
                "gateways.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(command) = &self.capture.command {
            if command.is_empty() {
                return Err(Error::Config(
                    "capture.command must name a program".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Find the config file: explicit env override, then user, then system
fn locate_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("rollcall").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/rollcall/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

// ========================================
// Root folder resolution
// ========================================

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
    pub port: u16,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
            port: default_port(),
        }
    }
}

fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/rollcall (or /var/lib/rollcall for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/rollcall"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/rollcall"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rollcall"))
    } else {
        PathBuf::from("./rollcall_data")
    }
}

/// Resolves the root folder following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    /// Highest-priority override from the command line
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// `root_folder` value from the loaded TOML config
    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from config file: {}", path.display());
            return path.clone();
        }

        let path = CompiledDefaults::for_current_platform().root_folder;
        info!(module = %self.module_name, "Root folder from compiled default: {}", path.display());
        path
    }
}

/// Creates the root folder layout on first run
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            info!("Creating root folder: {}", self.root_folder.display());
        }
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.artifact_dir())?;
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root_folder.join(ARTIFACT_DIR)
    }
}
