//! Debian packages: an `ar` archive holding `control.tar.*`, whose `./control` file
//! carries the package metadata.

use std::{
    io::Read,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{
    ar::{ArEntry, ArReader},
    compression::CompressionMethod,
};
use crate::{
    error::{ErrorContext, PackageError, Result},
    options::ReadOptions,
    traits::PackageInfo,
};

const FORMAT: &str = "deb";
const CONTROL_PREFIX: &str = "control.tar";
const CONTROL_PATH: &[u8] = b"./control";

/// Parsed `key: value` lines of a control file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlFields(Vec<(String, String)>);

impl ControlFields {
    /// Parses control text line by line.
    ///
    /// Lines starting with whitespace are continuation lines and are skipped rather than
    /// folded into the previous value. When a key repeats, the first value is kept.
    pub fn parse(text: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() || line.starts_with(char::is_whitespace) {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };

            let key = key.trim();
            if fields.iter().any(|(k, _)| k == key) {
                continue;
            }
            fields.push((key.to_string(), value.trim().to_string()));
        }

        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Flat view of the fields a package panel shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebInfo {
    pub package: Option<String>,
    pub maintainer: Option<String>,
    pub uploaders: Option<String>,
    pub version: Option<String>,
    pub architecture: Option<String>,
    pub description: Option<String>,
}

impl From<&ControlFields> for DebInfo {
    fn from(fields: &ControlFields) -> Self {
        let field = |key: &str| fields.get(key).map(str::to_string);
        Self {
            package: field("Package"),
            maintainer: field("Maintainer"),
            uploaders: field("Uploaders"),
            version: field("Version"),
            architecture: field("Architecture"),
            description: field("Description"),
        }
    }
}

impl PackageInfo for DebInfo {
    fn kind(&self) -> &'static str {
        FORMAT
    }

    fn name(&self) -> Option<&str> {
        self.package.as_deref()
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn publisher(&self) -> Option<&str> {
        self.maintainer.as_deref()
    }
}

/// Reads the control metadata of a `.deb` file.
#[derive(Debug, Clone)]
pub struct DebReader {
    path: PathBuf,
    control: Option<String>,
    fields: ControlFields,
}

impl DebReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    /// Opens a package.
    ///
    /// A broken `ar` container is fatal, and so is a control member compressed with a
    /// codec that is not supported. A missing or unreadable control member yields a reader
    /// with no fields.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let entries = ArReader::read_with_options(path, options)?;

        let control = match extract_control(&entries, options) {
            Ok(text) => Some(text),
            Err(PackageError::MissingMember { member, .. }) => {
                debug!(path = %path.display(), member = %member, "deb has no control data");
                None
            }
            Err(err @ PackageError::Unsupported(_)) => return Err(err),
            Err(err) => {
                warn!(path = %path.display(), "failed to extract deb control file: {err}");
                None
            }
        };

        let fields = control
            .as_deref()
            .map(ControlFields::parse)
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            control,
            fields,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw control file text, if one was found.
    pub fn control(&self) -> Option<&str> {
        self.control.as_deref()
    }

    pub fn fields(&self) -> &ControlFields {
        &self.fields
    }

    pub fn info(&self) -> DebInfo {
        DebInfo::from(&self.fields)
    }
}

/// Pulls `./control` out of the first `control.tar*` member.
///
/// # Errors
///
/// * [`PackageError::MissingMember`] when there is no control tarball or it lacks
///   `./control`
/// * [`PackageError::Unsupported`] for LZMA or Zstd compressed tarballs
/// * [`PackageError::IoError`] when decompression or the tar walk fails
pub fn extract_control(entries: &[ArEntry], options: &ReadOptions) -> Result<String> {
    let member = entries
        .iter()
        .find(|entry| entry.name.starts_with(CONTROL_PREFIX))
        .ok_or_else(|| PackageError::missing(FORMAT, format!("{CONTROL_PREFIX}*")))?;

    let method = CompressionMethod::from_file_name(&member.name);
    trace!(member = %member.name, ?method, "decompressing control tarball");
    let tarball = method.decompress(&member.data, options.max_entry_size)?;

    let mut archive = tar::Archive::new(tarball.as_slice());
    let entries = archive
        .entries()
        .with_context(|| format!("listing {}", member.name))?;

    for entry in entries {
        let mut entry = entry.with_context(|| format!("reading {}", member.name))?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        if entry.path_bytes().as_ref() != CONTROL_PATH {
            continue;
        }

        let mut data = Vec::new();
        entry
            .by_ref()
            .take(options.max_entry_size)
            .read_to_end(&mut data)
            .with_context(|| "reading ./control".to_string())?;
        return Ok(String::from_utf8_lossy(&data).into_owned());
    }

    Err(PackageError::missing(FORMAT, "./control"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::formats::ar::tests::build_ar;

    const CONTROL: &str = "Package: foo\nVersion: 1.0\nMaintainer: a <a@b.c>\n";

    fn control_tar(path: &str, contents: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.as_gnu_mut().unwrap().name[..2].copy_from_slice(b"./");
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_mode(0o755);
        dir.set_size(0);
        dir.set_cksum();
        builder.append(&dir, std::io::empty()).unwrap();

        let mut header = tar::Header::new_gnu();
        header.as_gnu_mut().unwrap().name[..path.len()].copy_from_slice(path.as_bytes());
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append(&header, contents.as_bytes()).unwrap();

        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn bz2(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn write_deb(dir: &tempfile::TempDir, members: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.path().join("test.deb");
        std::fs::write(&path, build_ar(members)).unwrap();
        path
    }

    #[test]
    fn test_parse_control_fields() {
        let fields = ControlFields::parse(CONTROL);
        assert_eq!(fields.get("Package"), Some("foo"));
        assert_eq!(fields.get("Version"), Some("1.0"));
        assert_eq!(fields.get("Maintainer"), Some("a <a@b.c>"));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_continuation_lines_are_skipped() {
        let fields =
            ControlFields::parse("Description: short\n continuation text\n .\nHomepage: x\n");
        assert_eq!(fields.get("Description"), Some("short"));
        assert_eq!(fields.get("Homepage"), Some("x"));
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_first_duplicate_wins_and_junk_lines_ignored() {
        let fields = ControlFields::parse("Package: a\nno colon here\n\nPackage: b\nDepends:\n");
        assert_eq!(fields.get("Package"), Some("a"));
        assert_eq!(fields.get("Depends"), Some(""));
    }

    #[test]
    fn test_reads_gzip_control() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = gzip(&control_tar("./control", CONTROL));
        let path = write_deb(
            &dir,
            &[("debian-binary", b"2.0\n"), ("control.tar.gz", &tarball)],
        );

        let reader = DebReader::open(&path).unwrap();
        let info = reader.info();
        assert_eq!(info.package.as_deref(), Some("foo"));
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(info.maintainer.as_deref(), Some("a <a@b.c>"));
        assert!(info.uploaders.is_none());
        assert_eq!(reader.control(), Some(CONTROL));
        assert_eq!(info.name(), Some("foo"));
    }

    #[test]
    fn test_reads_xz_and_bzip2_control() {
        let dir = tempfile::tempdir().unwrap();
        for (name, tarball) in [
            ("control.tar.xz", xz(&control_tar("./control", CONTROL))),
            ("control.tar.bz2", bz2(&control_tar("./control", CONTROL))),
            ("control.tar", control_tar("./control", CONTROL)),
        ] {
            let path = write_deb(&dir, &[("debian-binary", b"2.0\n"), (name, &tarball)]);
            let info = DebReader::open(&path).unwrap().info();
            assert_eq!(info.package.as_deref(), Some("foo"), "{name}");
        }
    }

    #[test]
    fn test_missing_control_member_yields_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_deb(&dir, &[("debian-binary", b"2.0\n"), ("data.tar.gz", b"x")]);

        let reader = DebReader::open(&path).unwrap();
        assert_eq!(reader.info(), DebInfo::default());
        assert!(reader.control().is_none());
    }

    #[test]
    fn test_control_path_must_match_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = gzip(&control_tar("./md5sums", "abc  file\n"));
        let path = write_deb(&dir, &[("control.tar.gz", &tarball)]);

        assert_eq!(DebReader::open(&path).unwrap().info(), DebInfo::default());
    }

    #[test]
    fn test_corrupt_control_tarball_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_deb(&dir, &[("control.tar.gz", b"not gzip at all")]);

        assert_eq!(DebReader::open(&path).unwrap().info(), DebInfo::default());
    }

    #[test]
    fn test_unsupported_compression_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_deb(&dir, &[("control.tar.lzma", b"whatever")]);

        assert!(matches!(
            DebReader::open(&path),
            Err(PackageError::Unsupported(_))
        ));

        let entries = vec![ArEntry {
            name: "data.tar.gz".into(),
            size: 0,
            data: Vec::new(),
        }];
        assert!(matches!(
            extract_control(&entries, &ReadOptions::default()),
            Err(PackageError::MissingMember { .. })
        ));
    }

    #[test]
    fn test_not_an_archive_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.deb");
        std::fs::write(&path, b"definitely not ar").unwrap();

        assert!(matches!(
            DebReader::open(&path),
            Err(PackageError::InvalidFormat { .. })
        ));
    }
}
