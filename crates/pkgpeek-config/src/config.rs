use std::{
    fs,
    path::{Path, PathBuf},
    sync::{LazyLock, PoisonError, RwLock},
};

use documented::{Documented, DocumentedFields};
use pkgpeek_utils::{
    bytes::parse_bytes,
    path::{resolve_path, xdg_config_home},
    system::normalize_architecture,
};
use serde::{Deserialize, Serialize};
use toml_edit::{DocumentMut, Item};
use tracing::{debug, info};

use crate::{
    annotations::annotate_toml_table,
    display::DisplaySettings,
    error::{ConfigError, Result},
};

/// Default cap for a single in-memory member, resource or file read.
pub const DEFAULT_MAX_ENTRY_SIZE: &str = "256 MiB";

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct Config {
    /// Windows app package (appx, msix and their bundles) options
    pub appx: AppxSettings,

    /// Chromium resource package options
    pub pak: PakSettings,

    /// Limits applied while reading containers
    pub limits: LimitSettings,

    /// Display settings for CLI output formatting
    pub display: DisplaySettings,
}

/// Windows app package options
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct AppxSettings {
    /// Architecture used to choose a sub-package out of a bundle: "x86", "x64", "arm64" or "arm".
    /// Default: the architecture of the running process
    pub architecture: Option<String>,
}

/// Chromium resource package options
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct PakSettings {
    /// Suffix a sniffed file extension (".png", ".txt", ...) to extracted resource names.
    /// Default: true
    pub append_extension: Option<bool>,
}

/// Limits applied while reading containers
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
#[serde(default)]
pub struct LimitSettings {
    /// Largest single member, resource or file read into memory, e.g. "256 MiB".
    /// Default: "256 MiB"
    pub max_entry_size: Option<String>,
}

pub static CONFIG: LazyLock<RwLock<Option<Config>>> = LazyLock::new(|| RwLock::new(None));

pub static CONFIG_PATH: LazyLock<RwLock<PathBuf>> = LazyLock::new(|| {
    RwLock::new(match std::env::var("PKGPEEK_CONFIG") {
        Ok(path_str) => PathBuf::from(path_str),
        Err(_) => xdg_config_home().join("pkgpeek").join("config.toml"),
    })
});

/// Returns the path the configuration is read from and written to.
pub fn config_path() -> PathBuf {
    CONFIG_PATH
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Points [`CONFIG_PATH`] at another file. Relative paths and variables are resolved.
pub fn set_config_path(path: &str) -> Result<()> {
    let resolved = resolve_path(path)?;
    *CONFIG_PATH.write().unwrap_or_else(PoisonError::into_inner) = resolved;
    Ok(())
}

/// Loads the configuration file into the process-wide slot.
pub fn init() -> Result<()> {
    let config = Config::new()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
    Ok(())
}

/// Returns the loaded configuration, falling back to defaults if [`init`] was never called.
pub fn get_config() -> Config {
    if let Some(config) = CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return config.clone();
    }

    let mut slot = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(Config::default_config).clone()
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            appx: AppxSettings {
                architecture: None,
            },
            pak: PakSettings {
                append_extension: Some(true),
            },
            limits: LimitSettings {
                max_entry_size: Some(DEFAULT_MAX_ENTRY_SIZE.to_string()),
            },
            display: DisplaySettings {
                icons: Some(true),
                colors: Some(true),
            },
        }
    }

    /// Loads the configuration from [`CONFIG_PATH`], or the defaults when no file exists.
    pub fn new() -> Result<Self> {
        let path = config_path();
        match Self::load(&path) {
            Err(ConfigError::IoError(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default_config())
            }
            other => other,
        }
    }

    /// Reads and validates a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.resolve()?;
        Ok(config)
    }

    /// Validates user supplied values and fills in defaults.
    pub fn resolve(&mut self) -> Result<()> {
        if let Some(arch) = &self.appx.architecture {
            let normalized = normalize_architecture(arch)
                .ok_or_else(|| ConfigError::InvalidArchitecture(arch.clone()))?;
            self.appx.architecture = Some(normalized.to_string());
        }

        if let Some(limit) = &self.limits.max_entry_size {
            let bytes = parse_bytes(limit)?;
            if bytes == 0 {
                return Err(ConfigError::InvalidSizeLimit(limit.clone()));
            }
        }

        self.pak.append_extension.get_or_insert(true);
        self.limits
            .max_entry_size
            .get_or_insert_with(|| DEFAULT_MAX_ENTRY_SIZE.to_string());

        Ok(())
    }

    /// Architecture override for bundle selection. `PKGPEEK_ARCH` wins over the file.
    pub fn architecture(&self) -> Result<Option<&'static str>> {
        if let Ok(env_arch) = std::env::var("PKGPEEK_ARCH") {
            return normalize_architecture(&env_arch)
                .map(Some)
                .ok_or(ConfigError::InvalidArchitecture(env_arch));
        }

        match &self.appx.architecture {
            Some(arch) => {
                normalize_architecture(arch)
                    .map(Some)
                    .ok_or_else(|| ConfigError::InvalidArchitecture(arch.clone()))
            }
            None => Ok(None),
        }
    }

    pub fn append_extension(&self) -> bool {
        self.pak.append_extension.unwrap_or(true)
    }

    pub fn max_entry_size(&self) -> Result<u64> {
        let limit = self
            .limits
            .max_entry_size
            .as_deref()
            .unwrap_or(DEFAULT_MAX_ENTRY_SIZE);
        Ok(parse_bytes(limit)?)
    }

    pub fn display(&self) -> DisplaySettings {
        self.display.clone()
    }

    pub fn to_annotated_document(&self) -> Result<DocumentMut> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut doc = toml_string.parse::<DocumentMut>()?;

        annotate_toml_table::<Config>(doc.as_table_mut(), false)?;

        if let Some(Item::Table(table)) = doc.get_mut("appx") {
            annotate_toml_table::<AppxSettings>(table, false)?;
        }
        if let Some(Item::Table(table)) = doc.get_mut("pak") {
            annotate_toml_table::<PakSettings>(table, false)?;
        }
        if let Some(Item::Table(table)) = doc.get_mut("limits") {
            annotate_toml_table::<LimitSettings>(table, false)?;
        }
        if let Some(Item::Table(table)) = doc.get_mut("display") {
            annotate_toml_table::<DisplaySettings>(table, false)?;
        }

        Ok(doc)
    }
}

/// Writes an annotated default configuration to [`CONFIG_PATH`].
pub fn generate_default_config() -> Result<PathBuf> {
    let path = config_path();

    if path.exists() {
        return Err(ConfigError::ConfigAlreadyExists);
    }

    let annotated_doc = Config::default_config().to_annotated_document()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&path, annotated_doc.to_string())?;
    info!(
        "Default configuration file generated with documentation at: {}",
        path.display()
    );
    Ok(path)
}
