//! Windows app packages (`.appx`, `.msix`) and bundles (`.appxbundle`, `.msixbundle`).

pub mod bundle;
pub mod icon;
pub mod reader;

use std::path::Path;

use serde::Serialize;

pub use bundle::{AppxBundleManifest, AppxBundleReader, BundlePackage};
pub use icon::select_logo_entry;
pub use reader::{publisher_common_name, AppxManifest, AppxReader};

use crate::{error::Result, options::ReadOptions, traits::PackageInfo};

pub(crate) const FORMAT: &str = "appx";

/// What an app package panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppxInfo {
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub publisher: Option<String>,
    #[serde(skip)]
    pub logo: Option<Vec<u8>>,
    pub capabilities: Vec<String>,
    pub name: Option<String>,
    pub publisher_display_name: Option<String>,
    pub description: Option<String>,
    pub logo_path: Option<String>,
}

impl From<&AppxReader> for AppxInfo {
    fn from(reader: &AppxReader) -> Self {
        Self {
            product_name: reader.display_name().map(str::to_string),
            product_version: reader.version().map(str::to_string),
            publisher: reader.publisher().map(str::to_string),
            logo: reader.icon().map(<[u8]>::to_vec),
            capabilities: reader.capabilities().to_vec(),
            name: reader.name().map(str::to_string),
            publisher_display_name: reader.publisher_display_name().map(str::to_string),
            description: reader.description().map(str::to_string),
            logo_path: reader.logo().map(str::to_string),
        }
    }
}

impl From<&AppxBundleReader> for AppxInfo {
    fn from(reader: &AppxBundleReader) -> Self {
        Self {
            product_name: reader.display_name().map(str::to_string),
            product_version: reader.version().map(str::to_string),
            publisher: reader.publisher().map(str::to_string),
            logo: reader.icon().map(<[u8]>::to_vec),
            capabilities: reader.capabilities().to_vec(),
            name: reader.name().map(str::to_string),
            publisher_display_name: reader.publisher_display_name().map(str::to_string),
            description: reader.description().map(str::to_string),
            logo_path: reader.logo().map(str::to_string),
        }
    }
}

impl PackageInfo for AppxInfo {
    fn kind(&self) -> &'static str {
        FORMAT
    }

    fn name(&self) -> Option<&str> {
        self.product_name.as_deref().or(self.name.as_deref())
    }

    fn version(&self) -> Option<&str> {
        self.product_version.as_deref()
    }

    fn publisher(&self) -> Option<&str> {
        self.publisher.as_deref()
    }

    fn icon(&self) -> Option<&[u8]> {
        self.logo.as_deref()
    }
}

/// Whether `path` names a bundle rather than a single package.
pub fn is_bundle_path<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ext.eq_ignore_ascii_case("appxbundle") || ext.eq_ignore_ascii_case("msixbundle")
        })
        .unwrap_or(false)
}

/// Reads a package or bundle, choosing the reader from the file extension.
pub fn parse<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<AppxInfo> {
    let path = path.as_ref();
    if is_bundle_path(path) {
        Ok(AppxInfo::from(&AppxBundleReader::open_with_options(
            path, options,
        )?))
    } else {
        Ok(AppxInfo::from(&AppxReader::open_with_options(path, options)?))
    }
}
