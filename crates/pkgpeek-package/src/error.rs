//! Error types for the package crate.

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while reading a package.
#[derive(Error, Diagnostic, Debug)]
pub enum PackageError {
    #[error("Error while {action}: {source}")]
    #[diagnostic(code(pkgpeek_package::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },

    /// The container is structurally broken or is not the format it claims to be.
    #[error("Invalid {format} data: {reason}")]
    #[diagnostic(
        code(pkgpeek_package::invalid_format),
        help("The file may be truncated, corrupt or of a different type")
    )]
    InvalidFormat {
        format: &'static str,
        reason: String,
    },

    /// A member the format requires is absent.
    #[error("{format} package has no '{member}'")]
    #[diagnostic(
        code(pkgpeek_package::missing_member),
        help("The file is not a valid package of this type")
    )]
    MissingMember {
        format: &'static str,
        member: String,
    },

    /// The format is recognized, but this part of it is not implemented.
    #[error("{0} is not supported")]
    #[diagnostic(code(pkgpeek_package::unsupported))]
    Unsupported(String),

    #[error(transparent)]
    #[diagnostic(code(pkgpeek_package::zip))]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to parse XML manifest: {0}")]
    #[diagnostic(code(pkgpeek_package::xml))]
    Xml(#[from] roxmltree::Error),

    #[error("Failed to parse property list: {0}")]
    #[diagnostic(code(pkgpeek_package::plist))]
    Plist(#[from] plist::Error),

    #[error(transparent)]
    #[diagnostic(code(pkgpeek_package::image))]
    ImageError(#[from] image::ImageError),

    #[error("{0}")]
    #[diagnostic(code(pkgpeek_package::custom))]
    Custom(String),
}

/// A specialized Result type for package operations.
pub type Result<T> = std::result::Result<T, PackageError>;

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    /// Adds context to an error, describing what action was being performed.
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            PackageError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

impl From<pkgpeek_utils::error::FileSystemError> for PackageError {
    fn from(err: pkgpeek_utils::error::FileSystemError) -> Self {
        PackageError::Custom(err.to_string())
    }
}

impl PackageError {
    pub(crate) fn invalid(format: &'static str, reason: impl Into<String>) -> Self {
        PackageError::InvalidFormat {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(format: &'static str, member: impl Into<String>) -> Self {
        PackageError::MissingMember {
            format,
            member: member.into(),
        }
    }
}
