//! Package format detection and the per-format readers.
//!
//! The format is taken from the file extension when it is a known one, and from the
//! file contents otherwise.

pub mod appx;
pub mod apple;
pub mod ar;
pub(crate) mod archive;
pub mod compression;
pub mod deb;
pub mod dmg;
pub mod ipa;
pub mod pak;
pub mod sniff;

use std::{
    fmt,
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    str::FromStr,
};

use pkgpeek_utils::fs::read_file_signature;
use serde::Serialize;
use tracing::trace;
use zip::ZipArchive;

use self::{appx::AppxInfo, deb::DebInfo, dmg::DmgInfo, ipa::IpaInfo};
use crate::{
    error::{ErrorContext, PackageError, Result},
    options::ReadOptions,
    traits::PackageInfo,
};

/// Magic bytes for ZIP based packages.
pub const ZIP_MAGIC_BYTES: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Supported package formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Windows app package (`.appx`, `.msix`).
    Appx,
    /// Windows app bundle (`.appxbundle`, `.msixbundle`).
    AppxBundle,
    /// Debian binary package.
    Deb,
    /// Apple disk image.
    Dmg,
    /// iOS app archive.
    Ipa,
    /// Chromium resource pack.
    Pak,
    /// Unknown or unsupported format.
    Unknown,
}

impl PackageFormat {
    /// Maps a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "appx" | "msix" => Self::Appx,
            "appxbundle" | "msixbundle" => Self::AppxBundle,
            "deb" => Self::Deb,
            "dmg" => Self::Dmg,
            "ipa" => Self::Ipa,
            "pak" => Self::Pak,
            _ => Self::Unknown,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::Unknown, Self::from_extension)
    }

    /// Resolves the format from the extension, falling back to the file contents.
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = Self::from_path(path);
        if format != Self::Unknown {
            return Ok(format);
        }

        let magic_bytes = read_file_signature(path, 8)?;
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let format = format_from_contents(&magic_bytes, &mut BufReader::new(file))?;
        trace!(path = %path.display(), ?format, "detected format from contents");
        Ok(format)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Appx => "appx",
            Self::AppxBundle => "appxbundle",
            Self::Deb => "deb",
            Self::Dmg => "dmg",
            Self::Ipa => "ipa",
            Self::Pak => "pak",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match Self::from_extension(s) {
            Self::Unknown => Err(format!("unknown package format '{s}'")),
            format => Ok(format),
        }
    }
}

/// Detects the package format by reading magic bytes from the file.
///
/// `.pak` files have no magic and are never detected here.
///
/// # Errors
///
/// Returns [`PackageError`] if reading or seeking fails.
pub fn get_file_type<T>(file: &mut BufReader<T>) -> Result<PackageFormat>
where
    T: Read + Seek,
{
    let mut magic_bytes = Vec::with_capacity(8);
    file.by_ref()
        .take(8)
        .read_to_end(&mut magic_bytes)
        .with_context(|| "reading magic bytes".to_string())?;

    format_from_contents(&magic_bytes, file)
}

fn format_from_contents<T>(magic_bytes: &[u8], file: &mut BufReader<T>) -> Result<PackageFormat>
where
    T: Read + Seek,
{
    if magic_bytes == ar::AR_MAGIC.as_slice() {
        return Ok(PackageFormat::Deb);
    }

    if dmg::read_koly(file)?.is_some() {
        return Ok(PackageFormat::Dmg);
    }

    if magic_bytes.starts_with(&ZIP_MAGIC_BYTES) {
        file.rewind()
            .with_context(|| "rewinding archive".to_string())?;
        if let Ok(archive) = ZipArchive::new(&mut *file) {
            return Ok(zip_package_format(archive.file_names()));
        }
    }

    Ok(PackageFormat::Unknown)
}

fn zip_package_format<'a, I: IntoIterator<Item = &'a str>>(names: I) -> PackageFormat {
    let mut format = PackageFormat::Unknown;
    for name in names {
        match name {
            appx::reader::APPX_MANIFEST => return PackageFormat::Appx,
            appx::bundle::BUNDLE_MANIFEST => return PackageFormat::AppxBundle,
            _ if is_ipa_info_plist(name) => format = PackageFormat::Ipa,
            _ => {}
        }
    }
    format
}

fn is_ipa_info_plist(name: &str) -> bool {
    name.strip_prefix("Payload/")
        .and_then(|rest| rest.strip_suffix("/Info.plist"))
        .is_some_and(|app| app.ends_with(".app") && !app.contains('/'))
}

/// The metadata record of any package that has one.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum PackageRecord {
    Appx(AppxInfo),
    Deb(DebInfo),
    Dmg(DmgInfo),
    Ipa(IpaInfo),
}

impl PackageRecord {
    pub fn info(&self) -> &dyn PackageInfo {
        match self {
            Self::Appx(info) => info,
            Self::Deb(info) => info,
            Self::Dmg(info) => info,
            Self::Ipa(info) => info,
        }
    }
}

/// Reads the metadata record of a package.
///
/// # Errors
///
/// [`PackageError::Unsupported`] for `.pak` files, which carry resources rather than
/// metadata, and for unknown formats.
pub fn read_package<P: AsRef<Path>>(
    path: P,
    format: PackageFormat,
    options: &ReadOptions,
) -> Result<PackageRecord> {
    let path = path.as_ref();
    match format {
        PackageFormat::Appx => {
            Ok(PackageRecord::Appx(AppxInfo::from(
                &appx::AppxReader::open_with_options(path, options)?,
            )))
        }
        PackageFormat::AppxBundle => {
            Ok(PackageRecord::Appx(AppxInfo::from(
                &appx::AppxBundleReader::open_with_options(path, options)?,
            )))
        }
        PackageFormat::Deb => {
            Ok(PackageRecord::Deb(
                deb::DebReader::open_with_options(path, options)?.info(),
            ))
        }
        PackageFormat::Dmg => Ok(PackageRecord::Dmg(dmg::parse(path, options)?)),
        PackageFormat::Ipa => Ok(PackageRecord::Ipa(ipa::parse(path, options)?)),
        PackageFormat::Pak | PackageFormat::Unknown => {
            Err(PackageError::Unsupported(format!(
                "{format} files have no metadata record"
            )))
        }
    }
}
