//! Apple disk images (`.dmg`): UDIF or raw disks, partition discovery, HFS+ volumes, and
//! the application bundle found inside.

pub mod hfsplus;
pub mod partition;
pub mod udif;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Seek},
    path::{Path, PathBuf},
    sync::LazyLock,
};

use image::RgbaImage;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace, warn};

pub use hfsplus::{CatalogListing, Extent, ForkData, HfsEntry, HfsPlusVolume};
pub use partition::{find_hfs_volumes, Partition, PartitionScheme};
pub use udif::{read_koly, KolyTrailer, UdifImage};

use crate::{
    error::{ErrorContext, PackageError, Result},
    formats::apple::{decode_icns, platform_version, BundleIdentity, PlistValue},
    options::ReadOptions,
    traits::PackageInfo,
};

pub(crate) const FORMAT: &str = "dmg";

static INFO_PLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*\.app)/Contents/Info\.plist$").expect("unable to compile Info.plist regex")
});

/// Anything the disk layer can read from.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// What a disk image panel shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DmgInfo {
    pub display_name: Option<String>,
    pub short_version: Option<String>,
    pub version: Option<String>,
    pub identifier: Option<String>,
    pub minimum_os_version: Option<String>,
    pub platform_version: Option<String>,
    pub supported_platforms: Option<String>,
    pub icon_name: Option<String>,
    pub icon_entry: Option<String>,
    pub contents_entry: Option<String>,
    pub volume_label: Option<String>,
    #[serde(skip)]
    pub icon: Option<Vec<u8>>,
    #[serde(skip)]
    pub logo: Option<RgbaImage>,
}

impl DmgInfo {
    fn apply_info_plist(&mut self, info: &PlistValue) {
        let identity = BundleIdentity::from_info_plist(info);
        self.display_name = identity.name().map(str::to_string);
        self.short_version = identity.short_version;
        self.version = identity.version;
        self.identifier = identity.identifier;
        self.minimum_os_version = platform_version(info, "LSMinimumSystemVersion", "macOS");
        self.platform_version = platform_version(info, "DTPlatformVersion", "macOS");
        self.supported_platforms = info
            .get("CFBundleSupportedPlatforms")
            .and_then(|platforms| platforms.join(", "));
        self.icon_name = info
            .get_str("CFBundleIconFile")
            .map(|icon| icon.strip_suffix(".icns").unwrap_or(icon).to_string());
    }

    /// The decoded application icon.
    pub fn logo(&self) -> Option<&RgbaImage> {
        self.logo.as_ref()
    }
}

impl PackageInfo for DmgInfo {
    fn kind(&self) -> &'static str {
        FORMAT
    }

    fn name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn version(&self) -> Option<&str> {
        self.short_version.as_deref().or(self.version.as_deref())
    }

    fn publisher(&self) -> Option<&str> {
        None
    }

    fn icon(&self) -> Option<&[u8]> {
        self.icon.as_deref()
    }
}

/// A disk image opened down to its first HFS+ volume.
///
/// The catalog walk only records metadata; file contents are read on demand through
/// [`DmgReader::read_file`].
pub struct DmgReader {
    path: PathBuf,
    partition: Option<Partition>,
    volume: Option<HfsPlusVolume<Box<dyn ReadSeek>>>,
    entries: BTreeMap<String, HfsEntry>,
    info: DmgInfo,
    max_entry_size: u64,
}

impl DmgReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    /// Opens an image.
    ///
    /// Failing to open the file, or a `koly` trailer whose resource fork cannot be
    /// decoded, is an error. Anything past that point (no HFS+ volume, a broken catalog,
    /// an unreadable `Info.plist` or icon) is logged and leaves the record partial.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;

        let (mut disk, disk_size): (Box<dyn ReadSeek>, u64) = match read_koly(&mut file)? {
            Some(koly) => {
                let image = UdifImage::new(file, &koly, options.max_entry_size)?;
                let size = image.size();
                debug!(path = %path.display(), size, "reading udif image");
                (Box::new(image), size)
            }
            None => {
                let size = file
                    .metadata()
                    .with_context(|| format!("reading metadata of {}", path.display()))?
                    .len();
                debug!(path = %path.display(), size, "reading raw disk image");
                (Box::new(file), size)
            }
        };

        let mut reader = Self {
            path: path.to_path_buf(),
            partition: None,
            volume: None,
            entries: BTreeMap::new(),
            info: DmgInfo::default(),
            max_entry_size: options.max_entry_size,
        };

        let volumes = find_hfs_volumes(&mut disk, disk_size);
        let Some(partition) = volumes.into_iter().next() else {
            warn!(path = %path.display(), "no HFS+ volume found in disk image");
            return Ok(reader);
        };
        trace!(scheme = ?partition.scheme, offset = partition.offset, "using HFS+ volume");

        let mut volume = match HfsPlusVolume::open(disk, partition.offset) {
            Ok(volume) => volume,
            Err(err) => {
                warn!(path = %path.display(), "failed to open HFS+ volume: {err}");
                return Ok(reader);
            }
        };

        let listing = volume.walk();
        reader.info.volume_label = listing.label;
        reader.entries = listing.entries;
        reader.partition = Some(partition);
        reader.volume = Some(volume);

        reader.read_bundle();
        Ok(reader)
    }

    fn read_bundle(&mut self) {
        let Some((plist_path, app)) = select_info_plist(self.entries.keys()) else {
            debug!(path = %self.path.display(), "no application bundle in disk image");
            return;
        };
        let contents = format!("{app}/Contents");
        self.info.contents_entry = Some(contents.clone());

        let info = match self
            .read_file(&plist_path)
            .and_then(|data| PlistValue::from_bytes(&data))
        {
            Ok(info) => info,
            Err(err) => {
                warn!(entry = %plist_path, "failed to read Info.plist: {err}");
                return;
            }
        };
        self.info.apply_info_plist(&info);

        let Some(icon_name) = self.info.icon_name.clone() else {
            return;
        };
        let prefix = format!("{contents}/Resources/{icon_name}.");
        let Some(icon_entry) = self
            .entries
            .iter()
            .find(|(path, entry)| !entry.is_dir && path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
        else {
            debug!(icon = %icon_name, "icon file not found in bundle resources");
            return;
        };

        let icon = match self.read_file(&icon_entry) {
            Ok(icon) => icon,
            Err(err) => {
                warn!(entry = %icon_entry, "failed to read icon: {err}");
                return;
            }
        };

        if icon_entry.to_ascii_lowercase().ends_with(".icns") {
            match decode_icns(&icon) {
                Ok(logo) => self.info.logo = Some(logo),
                Err(err) => warn!(entry = %icon_entry, "failed to decode icon: {err}"),
            }
        }
        self.info.icon_entry = Some(icon_entry);
        self.info.icon = Some(icon);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The partition the volume was read from.
    pub fn partition(&self) -> Option<&Partition> {
        self.partition.as_ref()
    }

    /// Every file and folder on the volume, keyed by `/`-joined path.
    pub fn entries(&self) -> &BTreeMap<String, HfsEntry> {
        &self.entries
    }

    pub fn info(&self) -> &DmgInfo {
        &self.info
    }

    pub fn into_info(self) -> DmgInfo {
        self.info
    }

    /// Reads a file from the volume.
    pub fn read_file(&mut self, path: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| PackageError::missing(FORMAT, path))?;
        let fork = match (entry.is_dir, entry.fork) {
            (false, Some(fork)) => fork,
            _ => {
                return Err(PackageError::invalid(
                    FORMAT,
                    format!("{path} is not a regular file"),
                ))
            }
        };
        let volume = self
            .volume
            .as_mut()
            .ok_or_else(|| PackageError::missing(FORMAT, path))?;
        volume.read_fork(&fork, self.max_entry_size)
    }
}

/// Picks the shallowest `*.app/Contents/Info.plist`, first in path order on ties.
/// Returns the plist path and the `.app` directory.
fn select_info_plist<'a, I>(paths: I) -> Option<(String, String)>
where
    I: IntoIterator<Item = &'a String>,
{
    paths
        .into_iter()
        .filter_map(|path| {
            let captures = INFO_PLIST.captures(path)?;
            Some((path.clone(), captures[1].to_string()))
        })
        .min_by_key(|(path, _)| path.matches('/').count())
}

/// Reads an image and returns its metadata record.
pub fn parse<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<DmgInfo> {
    Ok(DmgReader::open_with_options(path, options)?.into_info())
}
