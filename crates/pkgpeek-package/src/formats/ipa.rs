//! iOS application archives (`.ipa`).

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::LazyLock,
};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, trace, warn};
use zip::ZipArchive;

use crate::{
    error::{ErrorContext, PackageError, Result},
    formats::{
        apple::{platform_version, BundleIdentity, PlistValue},
        archive::{decoded_names, read_zip_entry},
    },
    options::ReadOptions,
    traits::PackageInfo,
};

pub(crate) const FORMAT: &str = "ipa";

static APP_INFO_PLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Payload/[^/]+\.app/)Info\.plist$")
        .expect("unable to compile ipa Info.plist regex")
});

/// Maps a `UIDeviceFamily` number to a device name.
pub fn device_family_name(family: i128) -> &'static str {
    match family {
        1 => "iPhone",
        2 => "iPad",
        3 => "Apple TV",
        4 => "Apple Watch",
        5 => "HomePod",
        6 => "Mac",
        7 => "Apple Vision Pro",
        _ => "Unknown Device",
    }
}

/// What an iOS app panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IpaInfo {
    pub display_name: Option<String>,
    pub short_version: Option<String>,
    pub version: Option<String>,
    pub identifier: Option<String>,
    pub minimum_os_version: Option<String>,
    pub platform_version: Option<String>,
    pub device_family: Vec<String>,
    pub icon_name: Option<String>,
    pub icon_entry: Option<String>,
    pub app_root: String,
    #[serde(skip)]
    pub icon: Option<Vec<u8>>,
}

impl PackageInfo for IpaInfo {
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

/// The icon file name an `Info.plist` declares: the last of the primary icon files,
/// else the last of the legacy `CFBundleIconFiles`.
fn declared_icon(info: &PlistValue) -> Option<String> {
    let last = |files: Option<&PlistValue>| {
        files?
            .as_array()?
            .iter()
            .filter_map(PlistValue::as_str)
            .last()
            .map(str::to_string)
    };

    let primary = info
        .get("CFBundleIcons")
        .and_then(|icons| icons.get("CFBundlePrimaryIcon"))
        .and_then(|primary| primary.get("CFBundleIconFiles"));

    last(primary).or_else(|| last(info.get("CFBundleIconFiles")))
}

pub struct IpaReader;

impl IpaReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<IpaInfo> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<IpaInfo> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        trace!(path = %path.display(), "reading ipa");
        Self::from_reader(BufReader::new(file), options)
    }

    /// Reads an archive from any seekable stream.
    ///
    /// # Errors
    ///
    /// [`PackageError::MissingMember`] when there is no `Payload/*.app/Info.plist`. An
    /// unreadable icon only leaves [`IpaInfo::icon`] empty.
    pub fn from_reader<R: Read + Seek>(reader: R, options: &ReadOptions) -> Result<IpaInfo> {
        let mut archive = ZipArchive::new(reader)?;
        let names: Vec<String> = decoded_names(&archive)
            .into_iter()
            .map(|(stored, _)| stored)
            .collect();

        let (plist_entry, app_root) = names
            .iter()
            .find_map(|name| {
                let captures = APP_INFO_PLIST.captures(name)?;
                Some((name.clone(), captures[1].to_string()))
            })
            .ok_or_else(|| PackageError::missing(FORMAT, "Payload/*.app/Info.plist"))?;

        let data = read_zip_entry(&mut archive, FORMAT, &plist_entry, options.max_entry_size)?;
        let info = PlistValue::from_bytes(&data)?;
        let identity = BundleIdentity::from_info_plist(&info);

        let device_family = info
            .get("UIDeviceFamily")
            .and_then(PlistValue::as_array)
            .map(|families| {
                families
                    .iter()
                    .filter_map(PlistValue::as_integer)
                    .map(|family| device_family_name(family).to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut record = IpaInfo {
            display_name: identity.display_name,
            short_version: identity.short_version,
            version: identity.version,
            identifier: identity.identifier,
            minimum_os_version: platform_version(&info, "MinimumOSVersion", "iOS"),
            platform_version: platform_version(&info, "DTPlatformVersion", "iOS"),
            device_family,
            icon_name: declared_icon(&info),
            icon_entry: None,
            app_root: app_root.clone(),
            icon: None,
        };

        let Some(icon_name) = record.icon_name.as_deref() else {
            return Ok(record);
        };
        let icon_entry = names.iter().find(|name| {
            name.strip_prefix(&app_root)
                .is_some_and(|rest| !rest.contains('/') && rest.starts_with(icon_name))
        });

        match icon_entry {
            Some(entry) => {
                match read_zip_entry(&mut archive, FORMAT, entry, options.max_entry_size) {
                    Ok(data) => record.icon = Some(data),
                    Err(err) => warn!(entry = %entry, "failed to read ipa icon: {err}"),
                }
                record.icon_entry = Some(entry.clone());
            }
            None => debug!(icon = %icon_name, "no member matches the declared icon"),
        }

        Ok(record)
    }
}

/// Reads an archive and returns its metadata record.
pub fn parse<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<IpaInfo> {
    IpaReader::open_with_options(path, options)
}
