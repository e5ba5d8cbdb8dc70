use miette::Diagnostic;
use pkgpeek_config::error::ConfigError;
use pkgpeek_package::PackageError;
use pkgpeek_utils::error::{FileSystemError, PathError, UtilsError};
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(pkgpeek::utils))]
    Utils(#[from] UtilsError),

    #[error("Error while {action}")]
    #[diagnostic(code(pkgpeek::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(pkgpeek::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(pkgpeek::toml), help("Check your configuration syntax"))]
    TomlError(#[from] toml::ser::Error),

    #[error("Failed to write icon: {0}")]
    #[diagnostic(code(pkgpeek::icon))]
    Image(#[from] image::ImageError),

    #[error("{0}")]
    #[diagnostic(code(pkgpeek::custom))]
    Custom(String),
}

impl From<FileSystemError> for CliError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

pub type CliResult<T> = std::result::Result<T, CliError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> CliResult<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> CliResult<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            CliError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
