use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::LazyLock,
};

use regex::Regex;
use roxmltree::{Document, Node};
use serde::Serialize;
use tracing::{debug, trace, warn};
use zip::ZipArchive;

use super::{icon::select_logo_entry, FORMAT};
use crate::{
    error::{ErrorContext, PackageError, Result},
    formats::archive::{decoded_names, read_zip_entry, read_zip_text},
    options::ReadOptions,
};

pub const APPX_MANIFEST: &str = "AppxManifest.xml";

static COMMON_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CN=([^,]*),?").expect("unable to compile common name regex")
});

/// Extracts the common name out of a distinguished name such as
/// `CN=Contoso, O=Contoso, C=US`. Returns the input unchanged if it has no `CN=`.
pub fn publisher_common_name(publisher: &str) -> String {
    COMMON_NAME
        .captures(publisher)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| publisher.to_string(), |m| m.as_str().to_string())
}

pub(crate) fn child<'a, 'input>(
    node: Node<'a, 'input>,
    name: &str,
) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

pub(crate) fn attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

/// Identity, properties and capabilities declared by `AppxManifest.xml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppxManifest {
    pub name: Option<String>,
    pub publisher: Option<String>,
    pub version: Option<String>,
    pub display_name: Option<String>,
    pub publisher_display_name: Option<String>,
    pub description: Option<String>,
    /// Logo path with `/` separators.
    pub logo: Option<String>,
    pub capabilities: Vec<String>,
}

impl AppxManifest {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)?;
        let package = doc.root_element();
        let mut manifest = Self::default();

        if let Some(identity) = child(package, "Identity") {
            manifest.name = attr(identity, "Name");
            manifest.version = attr(identity, "Version");
            manifest.publisher = identity
                .attribute("Publisher")
                .map(publisher_common_name);
        }

        if let Some(properties) = child(package, "Properties") {
            manifest.display_name = text(properties, "DisplayName");
            manifest.publisher_display_name = text(properties, "PublisherDisplayName");
            manifest.description = text(properties, "Description");
            manifest.logo = text(properties, "Logo").map(|logo| logo.replace('\\', "/"));
        }

        if let Some(capabilities) = child(package, "Capabilities") {
            manifest.capabilities = capabilities
                .children()
                .filter(Node::is_element)
                .filter_map(|n| attr(n, "Name"))
                .collect();
        }

        Ok(manifest)
    }
}

/// A single `.appx`/`.msix` package.
#[derive(Debug, Clone)]
pub struct AppxReader {
    manifest: AppxManifest,
    logo_entry: Option<String>,
    icon: Option<Vec<u8>>,
}

impl AppxReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        trace!(path = %path.display(), "opening appx package");
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::from_reader(BufReader::new(file), options)
    }

    /// Reads a package from any seekable stream, such as a member of a bundle.
    ///
    /// # Errors
    ///
    /// [`PackageError::MissingMember`] without `AppxManifest.xml`. A missing or unreadable
    /// logo only leaves [`AppxReader::icon`] empty.
    pub fn from_reader<R: Read + Seek>(reader: R, options: &ReadOptions) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let xml = read_zip_text(&mut archive, FORMAT, APPX_MANIFEST, options.max_entry_size)?;
        let manifest = AppxManifest::parse(&xml)?;

        let mut logo_entry = None;
        let mut icon = None;
        if let Some(logo) = manifest.logo.as_deref() {
            let names = decoded_names(&archive);
            let selected = select_logo_entry(
                logo,
                names.iter().map(|(s, d)| (s.as_str(), d.as_str())),
            )
            .map(|(entry, _)| entry.to_string());

            match selected {
                Some(entry) => {
                    match read_zip_entry(&mut archive, FORMAT, &entry, options.max_entry_size) {
                        Ok(data) => icon = Some(data),
                        Err(err) => warn!(entry = %entry, "failed to read appx logo: {err}"),
                    }
                    logo_entry = Some(entry);
                }
                None => debug!(logo, "no member matches the declared logo"),
            }
        }

        Ok(Self {
            manifest,
            logo_entry,
            icon,
        })
    }

    pub fn manifest(&self) -> &AppxManifest {
        &self.manifest
    }

    pub fn name(&self) -> Option<&str> {
        self.manifest.name.as_deref()
    }

    pub fn publisher(&self) -> Option<&str> {
        self.manifest.publisher.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.manifest.display_name.as_deref()
    }

    pub fn publisher_display_name(&self) -> Option<&str> {
        self.manifest.publisher_display_name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }

    /// Declared logo path.
    pub fn logo(&self) -> Option<&str> {
        self.manifest.logo.as_deref()
    }

    pub fn capabilities(&self) -> &[String] {
        &self.manifest.capabilities
    }

    /// The member the logo was resolved to.
    pub fn logo_entry(&self) -> Option<&str> {
        self.logo_entry.as_deref()
    }

    /// Raw bytes of the resolved logo.
    pub fn icon(&self) -> Option<&[u8]> {
        self.icon.as_deref()
    }
}
