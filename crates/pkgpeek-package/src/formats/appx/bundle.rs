use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Seek},
    path::Path,
};

use roxmltree::{Document, Node};
use serde::Serialize;
use tracing::{debug, trace, warn};
use zip::ZipArchive;

use super::{
    reader::{attr, child, publisher_common_name, AppxReader},
    FORMAT,
};
use crate::{
    error::{ErrorContext, PackageError, Result},
    formats::archive::{decoded_names, read_zip_entry, read_zip_text},
    options::ReadOptions,
};

pub const BUNDLE_MANIFEST: &str = "AppxMetadata/AppxBundleManifest.xml";

/// One `<Package>` row of a bundle manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundlePackage {
    pub package_type: Option<String>,
    pub architecture: Option<String>,
    pub file_name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppxBundleManifest {
    pub name: Option<String>,
    pub publisher: Option<String>,
    pub version: Option<String>,
    pub packages: Vec<BundlePackage>,
}

impl AppxBundleManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let bundle = doc.root_element();
        let mut manifest = Self::default();

        if let Some(identity) = child(bundle, "Identity") {
            manifest.name = attr(identity, "Name");
            manifest.version = attr(identity, "Version");
            manifest.publisher = identity
                .attribute("Publisher")
                .map(publisher_common_name);
        }

        if let Some(packages) = child(bundle, "Packages") {
            manifest.packages = packages
                .children()
                .filter(Node::is_element)
                .map(|package| {
                    BundlePackage {
                        package_type: attr(package, "Type"),
                        architecture: attr(package, "Architecture"),
                        file_name: attr(package, "FileName"),
                        version: attr(package, "Version"),
                    }
                })
                .collect();
        }

        Ok(manifest)
    }

    /// The application package built for `architecture`, or else the first package listed.
    pub fn select_package(&self, architecture: &str) -> Option<&BundlePackage> {
        self.packages
            .iter()
            .find(|p| {
                p.package_type.as_deref() == Some("application")
                    && p.architecture.as_deref() == Some(architecture)
            })
            .or_else(|| self.packages.first())
    }
}

/// An `.appxbundle`/`.msixbundle`: bundle identity plus one sub-package opened for details.
#[derive(Debug, Clone)]
pub struct AppxBundleReader {
    manifest: AppxBundleManifest,
    selected: Option<BundlePackage>,
    package: Option<AppxReader>,
}

impl AppxBundleReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        trace!(path = %path.display(), "opening appx bundle");
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file), options)
    }

    /// Reads the bundle manifest, picks a sub-package and opens it.
    ///
    /// # Errors
    ///
    /// [`PackageError::MissingMember`] without `AppxMetadata/AppxBundleManifest.xml`. A
    /// sub-package that cannot be read leaves only the bundle identity populated.
    pub fn from_reader<R: Read + Seek>(reader: R, options: &ReadOptions) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let xml = read_zip_text(&mut archive, FORMAT, BUNDLE_MANIFEST, options.max_entry_size)?;
        let manifest = AppxBundleManifest::parse(&xml)?;

        let architecture = options.target_architecture();
        let selected = manifest.select_package(architecture).cloned();
        debug!(
            architecture,
            selected = ?selected.as_ref().and_then(|p| p.file_name.as_deref()),
            "selected bundle package"
        );

        let package = match selected.as_ref().and_then(|p| p.file_name.as_deref()) {
            Some(file_name) => {
                match open_package(&mut archive, file_name, options) {
                    Ok(package) => Some(package),
                    Err(err) => {
                        warn!(package = file_name, "failed to open bundled package: {err}");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Self {
            manifest,
            selected,
            package,
        })
    }

    pub fn manifest(&self) -> &AppxBundleManifest {
        &self.manifest
    }

    pub fn selected_package(&self) -> Option<&BundlePackage> {
        self.selected.as_ref()
    }

    /// The opened sub-package.
    pub fn package(&self) -> Option<&AppxReader> {
        self.package.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.manifest
            .name
            .as_deref()
            .or_else(|| self.package.as_ref()?.name())
    }

    pub fn publisher(&self) -> Option<&str> {
        self.manifest
            .publisher
            .as_deref()
            .or_else(|| self.package.as_ref()?.publisher())
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest
            .version
            .as_deref()
            .or_else(|| self.package.as_ref()?.version())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.package.as_ref()?.display_name()
    }

    pub fn publisher_display_name(&self) -> Option<&str> {
        self.package.as_ref()?.publisher_display_name()
    }

    pub fn description(&self) -> Option<&str> {
        self.package.as_ref()?.description()
    }

    pub fn logo(&self) -> Option<&str> {
        self.package.as_ref()?.logo()
    }

    pub fn capabilities(&self) -> &[String] {
        self.package
            .as_ref()
            .map(AppxReader::capabilities)
            .unwrap_or_default()
    }

    pub fn icon(&self) -> Option<&[u8]> {
        self.package.as_ref()?.icon()
    }
}

fn open_package<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    file_name: &str,
    options: &ReadOptions,
) -> Result<AppxReader> {
    let data = match read_zip_entry(archive, FORMAT, file_name, options.max_entry_size) {
        Err(PackageError::MissingMember { .. }) => {
            let stored = decoded_names(archive)
                .into_iter()
                .find(|(_, decoded)| decoded == file_name)
                .map(|(stored, _)| stored)
                .ok_or_else(|| PackageError::missing(FORMAT, file_name))?;
            read_zip_entry(archive, FORMAT, &stored, options.max_entry_size)?
        }
        other => other?,
    };

    AppxReader::from_reader(Cursor::new(data), options)
}
