//! Configuration resolution for zotag-tab
//!
//! Library ID and API key: ENV → TOML. Everything else comes from the TOML
//! file (or its defaults) and the resolved root folder.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use zotag_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use zotag_common::{Error, Result};

use crate::aggregate::DEFAULT_CONCURRENCY;
use crate::client::{LibraryType, ZoteroSettings, DEFAULT_PAGE_SIZE, ZOTERO_BASE_URL};

pub const MODULE_NAME: &str = "zotag-tab";
pub const DEFAULT_BIND: &str = "127.0.0.1:5780";
pub const DEFAULT_IMAGE_URL: &str = "/images";

/// Zotero caps `limit` at 100
const MAX_PAGE_SIZE: u32 = 100;

/// Resolved runtime configuration, built once at startup
#[derive(Debug, Clone)]
pub struct TabConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub image_dir: PathBuf,
    pub image_url: String,
    pub bind: String,
    pub fetch_concurrency: usize,
    pub log_level: String,
}

impl TabConfig {
    pub fn resolve(toml_config: &TomlConfig, cli_root: Option<PathBuf>) -> Self {
        let root_folder = RootFolderResolver::new(MODULE_NAME)
            .with_cli_arg(cli_root)
            .with_toml_config(toml_config.clone())
            .resolve();
        let layout = RootFolderInitializer::new(root_folder.clone());

        let image_url = toml_config
            .server
            .image_url
            .as_deref()
            .map(|url| format!("/{}", url.trim_matches('/')))
            .filter(|url| url != "/")
            .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string());

        Self {
            database_path: layout.database_path(),
            image_dir: toml_config
                .image_dir
                .clone()
                .unwrap_or_else(|| layout.image_dir()),
            image_url,
            bind: toml_config
                .server
                .bind
                .clone()
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
            fetch_concurrency: toml_config
                .fetch_concurrency
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_CONCURRENCY),
            log_level: toml_config.logging.level.clone(),
            root_folder,
        }
    }
}

/// Resolve Zotero connection settings
///
/// **Priority:** ENV (`ZOTAG_LIBRARY_ID`, `ZOTAG_API_KEY`) → TOML `[zotero]`
pub fn resolve_zotero_settings(toml_config: &TomlConfig) -> Result<ZoteroSettings> {
    let zotero = &toml_config.zotero;

    let library_id = resolve_value("library ID", "ZOTAG_LIBRARY_ID", zotero.library_id.as_deref())
        .ok_or_else(|| {
            Error::Config(
                "Zotero library ID not configured. Set ZOTAG_LIBRARY_ID or \
                 [zotero] library_id in the TOML config"
                    .to_string(),
            )
        })?;
    if !library_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::Config(format!(
            "Zotero library ID must be numeric, got '{}'",
            library_id
        )));
    }

    let library_type = match zotero.library_type.as_deref() {
        Some(value) => value.parse::<LibraryType>().map_err(Error::Config)?,
        None => LibraryType::default(),
    };

    let mut settings = ZoteroSettings::new(library_type, library_id);
    settings.api_key = resolve_value("API key", "ZOTAG_API_KEY", zotero.api_key.as_deref());
    settings.base_url = zotero
        .base_url
        .clone()
        .unwrap_or_else(|| ZOTERO_BASE_URL.to_string());
    settings.page_size = zotero
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    if let Some(secs) = zotero.timeout_secs {
        settings.timeout = Duration::from_secs(secs.max(1));
    }

    Ok(settings)
}

fn resolve_value(name: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_value(v));
    let toml_value = toml_value.filter(|v| is_valid_value(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "Zotero {} found in both {} and TOML config. Using environment (highest priority).",
            name, env_var
        );
    }

    if let Some(value) = env_value {
        info!("Zotero {} loaded from environment variable", name);
        return Some(value.trim().to_string());
    }
    toml_value.map(|value| {
        info!("Zotero {} loaded from TOML config", name);
        value.trim().to_string()
    })
}

/// Non-empty, non-whitespace
fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
