//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ZOTAG_ROOT_FOLDER`, then `ZOTAG_ROOT`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file is never fatal: it is logged and the
//! compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "zotag.db";

/// Rendered chart directory name inside the root folder
pub const IMAGE_DIR_NAME: &str = "images";

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Root folder holding the query cache database and rendered images
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub zotero: ZoteroConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Override for the rendered chart directory (defaults to `<root>/images`)
    pub image_dir: Option<PathBuf>,
    /// Maximum number of tag-set queries resolved concurrently per request
    pub fetch_concurrency: Option<usize>,
}

/// Logging section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
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

fn default_log_level() -> String {
    "info".to_string()
}

/// Zotero library section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ZoteroConfig {
    /// Numeric library ID (group or user)
    pub library_id: Option<String>,
    /// `group` (default) or `user`
    pub library_type: Option<String>,
    /// Optional API key, required for private libraries
    pub api_key: Option<String>,
    /// API base URL (defaults to https://api.zotero.org)
    pub base_url: Option<String>,
    /// Items requested per page (Zotero caps this at 100)
    pub page_size: Option<u32>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// HTTP server section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:5780`
    pub bind: Option<String>,
    /// URL path under which rendered charts are served
    pub image_url: Option<String>,
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/zotag (or /var/lib/zotag for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("zotag"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/zotag"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("zotag"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/zotag"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("zotag"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\zotag"))
    } else {
        PathBuf::from("./zotag_data")
    }
}

/// Default TOML path for a module: `<config_dir>/zotag/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("zotag").join(format!("{}.toml", module_name)))
}

/// Load a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load a TOML config file, falling back to defaults when missing or invalid
pub fn load_toml_config_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        return TomlConfig::default();
    };

    if !path.exists() {
        debug!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}; using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write a TOML config file, creating the parent directory if needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;

    Ok(())
}

/// Resolves the root folder following the four-tier priority order
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_config: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_config: None,
        }
    }

    /// Highest-priority override from the command line
    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    /// Use an already-loaded TOML config instead of reading the default path
    pub fn with_toml_config(mut self, config: TomlConfig) -> Self {
        self.toml_config = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variables
        for var in ["ZOTAG_ROOT_FOLDER", "ZOTAG_ROOT"] {
            if let Ok(path) = std::env::var(var) {
                if !path.trim().is_empty() {
                    return PathBuf::from(path);
                }
            }
        }

        // Priority 3: TOML config file
        let toml_root = match &self.toml_config {
            Some(config) => config.root_folder.clone(),
            None => {
                let path = default_config_path(&self.module_name);
                load_toml_config_or_default(path.as_deref()).root_folder
            }
        };
        if let Some(root) = toml_root {
            return root;
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on first run
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
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root_folder.join(IMAGE_DIR_NAME)
    }
}
