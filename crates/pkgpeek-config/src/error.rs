use miette::Diagnostic;
use pkgpeek_utils::error::{BytesError, PathError, UtilsError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(pkgpeek_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(pkgpeek_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Configuration file already exists")]
    #[diagnostic(
        code(pkgpeek_config::already_exists),
        help("Remove the existing config file or use a different location")
    )]
    ConfigAlreadyExists,

    #[error("Invalid architecture: {0}")]
    #[diagnostic(
        code(pkgpeek_config::invalid_architecture),
        help("Use one of: x86, x64, arm64, arm")
    )]
    InvalidArchitecture(String),

    #[error("Invalid size limit: {0}")]
    #[diagnostic(
        code(pkgpeek_config::invalid_size_limit),
        help("Use a size such as \"256 MiB\" or a plain byte count")
    )]
    InvalidSizeLimit(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(pkgpeek_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(pkgpeek_config::utils))]
    Utils(#[from] UtilsError),

    #[error("Failed to parse TOML: {0}")]
    #[diagnostic(code(pkgpeek_config::toml))]
    Toml(#[from] toml_edit::TomlError),

    #[error("Encountered unexpected TOML item: {0}")]
    #[diagnostic(code(pkgpeek_config::unexpected_toml_item))]
    UnexpectedTomlItem(String),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<BytesError> for ConfigError {
    fn from(err: BytesError) -> Self {
        Self::InvalidSizeLimit(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
