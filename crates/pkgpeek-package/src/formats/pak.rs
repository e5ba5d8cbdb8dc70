//! Chromium `.pak` resource bundles.
//!
//! Version 5 layout (little-endian):
//!
//! ```text
//! u32 version | u8 encoding | u8[3] reserved | u16 resource_count | u16 alias_count
//! (u16 id, u32 offset) x (resource_count + 1)
//! (u16 id, u16 entry_index) x alias_count
//! payload
//! ```
//!
//! Version 4 has `u32 version | u32 resource_count | u8 encoding`, the same entry table,
//! and no aliases. The last table entry is a sentinel whose offset marks the end of the
//! payload; resource `i` spans `offset[i]..offset[i + 1]`.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use pkgpeek_utils::fs::{ensure_dir_exists, write_file};
use serde::Serialize;
use tracing::{debug, trace};

use super::sniff::guess_file_extension;
use crate::{
    error::{ErrorContext, PackageError, Result},
    options::ReadOptions,
};

const FORMAT: &str = "pak";
const ENTRY_SIZE: u64 = 6;
const ALIAS_SIZE: u64 = 4;

/// How the text resources of a pak are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PakEncoding {
    Binary,
    Utf8,
    Utf16,
    Other(u8),
}

impl From<u8> for PakEncoding {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Binary,
            1 => Self::Utf8,
            2 => Self::Utf16,
            other => Self::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PakHeader {
    pub version: u32,
    pub encoding: PakEncoding,
    pub resource_count: u32,
    pub alias_count: u16,
}

impl PakHeader {
    fn size(&self) -> u64 {
        if self.version == 4 {
            9
        } else {
            12
        }
    }

    /// First byte past the entry and alias tables.
    fn table_end(&self) -> u64 {
        self.size()
            + (self.resource_count as u64 + 1) * ENTRY_SIZE
            + self.alias_count as u64 * ALIAS_SIZE
    }
}

/// One row of the entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PakEntry {
    pub id: u16,
    pub offset: u32,
}

/// Maps an extra id onto an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PakAlias {
    pub id: u16,
    pub entry_index: u16,
}

/// A resource as located by the entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PakResource {
    pub id: u16,
    pub offset: u32,
    pub length: u32,
}

/// File name used for an extracted resource: the id padded to nine digits.
pub fn resource_name(id: u16) -> String {
    format!("{id:09}")
}

pub struct PakExtractor<R> {
    reader: R,
    header: PakHeader,
    entries: Vec<PakEntry>,
    aliases: Vec<PakAlias>,
    options: ReadOptions,
}

impl PakExtractor<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, &ReadOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        trace!(path = %path.display(), "opening pak");
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::new(BufReader::new(file), options)
    }
}

impl<R: Read + Seek> PakExtractor<R> {
    /// Parses and validates the header, entry table and alias table.
    ///
    /// # Errors
    ///
    /// Version 4 has its own header; every other version is read with the version 5 layout.
    ///
    /// * [`PackageError::InvalidFormat`] when offsets decrease, point into the tables or
    ///   past the end of the file, or an alias names a missing entry
    pub fn new(mut reader: R, options: &ReadOptions) -> Result<Self> {
        let file_len = reader
            .seek(SeekFrom::End(0))
            .with_context(|| "measuring pak".to_string())?;
        reader
            .rewind()
            .with_context(|| "rewinding pak".to_string())?;

        let header = read_header(&mut reader)?;
        if header.table_end() > file_len {
            return Err(PackageError::invalid(
                FORMAT,
                format!(
                    "tables need {} bytes but the file has {file_len}",
                    header.table_end()
                ),
            ));
        }

        let mut entries = Vec::with_capacity(header.resource_count as usize + 1);
        for _ in 0..=header.resource_count {
            entries.push(PakEntry {
                id: read_u16(&mut reader)?,
                offset: read_u32(&mut reader)?,
            });
        }

        let mut aliases = Vec::with_capacity(header.alias_count as usize);
        for _ in 0..header.alias_count {
            aliases.push(PakAlias {
                id: read_u16(&mut reader)?,
                entry_index: read_u16(&mut reader)?,
            });
        }

        validate(&header, &entries, &aliases, file_len)?;
        debug!(
            version = header.version,
            resources = header.resource_count,
            aliases = header.alias_count,
            "parsed pak table"
        );

        Ok(Self {
            reader,
            header,
            entries,
            aliases,
            options: options.clone(),
        })
    }

    pub fn header(&self) -> &PakHeader {
        &self.header
    }

    /// Entry table including the trailing sentinel.
    pub fn entries(&self) -> &[PakEntry] {
        &self.entries
    }

    pub fn aliases(&self) -> &[PakAlias] {
        &self.aliases
    }

    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resources(&self) -> impl Iterator<Item = PakResource> + '_ {
        self.entries.windows(2).map(|pair| {
            PakResource {
                id: pair[0].id,
                offset: pair[0].offset,
                length: pair[1].offset - pair[0].offset,
            }
        })
    }

    /// Reads resource `index` into `buf`, replacing its contents.
    pub fn read_resource_into(&mut self, index: usize, buf: &mut Vec<u8>) -> Result<()> {
        if index >= self.len() {
            return Err(PackageError::invalid(FORMAT, format!("no resource at index {index}")));
        }
        let (entry, next) = (self.entries[index], self.entries[index + 1]);
        let resource = PakResource {
            id: entry.id,
            offset: entry.offset,
            length: next.offset - entry.offset,
        };

        if resource.length as u64 > self.options.max_entry_size {
            return Err(PackageError::invalid(
                FORMAT,
                format!(
                    "resource {} is {} bytes, above the {} byte limit",
                    resource.id, resource.length, self.options.max_entry_size
                ),
            ));
        }

        buf.clear();
        buf.resize(resource.length as usize, 0);
        self.reader
            .seek(SeekFrom::Start(resource.offset as u64))
            .with_context(|| format!("seeking to resource {}", resource.id))?;
        self.reader
            .read_exact(buf)
            .with_context(|| format!("reading resource {}", resource.id))?;
        Ok(())
    }

    pub fn read_resource(&mut self, index: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_resource_into(index, &mut buf)?;
        Ok(buf)
    }

    /// Looks a resource up by id, directly or through the alias table.
    pub fn find(&mut self, id: u16) -> Result<Option<Vec<u8>>> {
        let table = &self.entries[..self.entries.len() - 1];
        let index = match table.binary_search_by_key(&id, |entry| entry.id) {
            Ok(index) => Some(index),
            Err(_) => {
                self.aliases
                    .iter()
                    .find(|alias| alias.id == id)
                    .map(|alias| alias.entry_index as usize)
            }
        };

        index.map(|index| self.read_resource(index)).transpose()
    }

    /// Writes every resource to `dir` under its nine-digit name, one at a time through a
    /// single reused buffer. Returns the written paths.
    pub fn extract_to_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        ensure_dir_exists(dir)?;

        let mut buf = Vec::new();
        let mut written = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            self.read_resource_into(index, &mut buf)?;
            let path = dir.join(resource_name(self.entries[index].id));
            write_file(&path, &buf)?;
            trace!(path = %path.display(), size = buf.len(), "extracted pak resource");
            written.push(path);
        }

        Ok(written)
    }

    /// Reads every resource into a map keyed by its nine-digit name, suffixed with a sniffed
    /// extension when [`ReadOptions::append_extension`] is set.
    pub fn extract_to_map(&mut self) -> Result<BTreeMap<String, Vec<u8>>> {
        let append_extension = self.options.append_extension;
        let mut map = BTreeMap::new();

        for index in 0..self.len() {
            let data = self.read_resource(index)?;
            let mut name = resource_name(self.entries[index].id);
            if append_extension {
                name.push_str(guess_file_extension(&data));
            }
            map.insert(name, data);
        }

        Ok(map)
    }
}

fn read_header<R: Read>(reader: &mut R) -> Result<PakHeader> {
    let version = read_u32(reader)?;
    match version {
        4 => {
            let resource_count = read_u32(reader)?;
            let encoding = read_u8(reader)?;
            Ok(PakHeader {
                version,
                encoding: encoding.into(),
                resource_count,
                alias_count: 0,
            })
        }
        _ => {
            let encoding = read_u8(reader)?;
            let mut reserved = [0u8; 3];
            reader
                .read_exact(&mut reserved)
                .map_err(|err| truncated(err, "header"))?;
            let resource_count = read_u16(reader)? as u32;
            let alias_count = read_u16(reader)?;
            Ok(PakHeader {
                version,
                encoding: encoding.into(),
                resource_count,
                alias_count,
            })
        }
    }
}

fn validate(
    header: &PakHeader,
    entries: &[PakEntry],
    aliases: &[PakAlias],
    file_len: u64,
) -> Result<()> {
    let table_end = header.table_end();

    if let Some(first) = entries.first() {
        if (first.offset as u64) < table_end {
            return Err(PackageError::invalid(
                FORMAT,
                format!(
                    "first resource offset {} lies inside the tables ending at {table_end}",
                    first.offset
                ),
            ));
        }
    }

    if let Some(pair) = entries.windows(2).find(|pair| pair[1].offset < pair[0].offset) {
        return Err(PackageError::invalid(
            FORMAT,
            format!(
                "offset of resource {} goes backwards ({} < {})",
                pair[1].id, pair[1].offset, pair[0].offset
            ),
        ));
    }

    if let Some(sentinel) = entries.last() {
        if sentinel.offset as u64 > file_len {
            return Err(PackageError::invalid(
                FORMAT,
                format!(
                    "payload ends at {} past the end of the file ({file_len})",
                    sentinel.offset
                ),
            ));
        }
    }

    if let Some(alias) = aliases
        .iter()
        .find(|alias| alias.entry_index as u32 >= header.resource_count)
    {
        return Err(PackageError::invalid(
            FORMAT,
            format!(
                "alias {} points at entry {} of {}",
                alias.id, alias.entry_index, header.resource_count
            ),
        ));
    }

    Ok(())
}

fn truncated(err: std::io::Error, what: &str) -> PackageError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        PackageError::invalid(FORMAT, format!("truncated {what}"))
    } else {
        PackageError::IoError {
            action: format!("reading pak {what}"),
            source: err,
        }
    }
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|err| truncated(err, "header"))?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader
        .read_exact(&mut buf)
        .map_err(|err| truncated(err, "table"))?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|err| truncated(err, "table"))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x01];

    fn build_pak(resources: &[(u16, &[u8])], aliases: &[(u16, u16)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&5u32.to_le_bytes());
        out.push(1);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(&(resources.len() as u16).to_le_bytes());
        out.extend_from_slice(&(aliases.len() as u16).to_le_bytes());

        let mut offset =
            12 + (resources.len() as u32 + 1) * 6 + aliases.len() as u32 * 4;
        for (id, data) in resources {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            offset += data.len() as u32;
        }
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());

        for (id, index) in aliases {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&index.to_le_bytes());
        }
        for (_, data) in resources {
            out.extend_from_slice(data);
        }
        out
    }

    fn open(bytes: Vec<u8>) -> Result<PakExtractor<Cursor<Vec<u8>>>> {
        PakExtractor::new(Cursor::new(bytes), &ReadOptions::default())
    }

    #[test]
    fn test_resource_lengths_follow_offsets() {
        let payloads: [(u16, &[u8]); 3] = [(1, b"hello"), (7, b""), (300, b"twelve bytes")];
        let pak = open(build_pak(&payloads, &[])).unwrap();

        assert_eq!(pak.len(), 3);
        assert_eq!(pak.entries().len(), 4);
        for (i, (_, data)) in payloads.iter().enumerate() {
            let entries = pak.entries();
            assert_eq!(
                (entries[i + 1].offset - entries[i].offset) as usize,
                data.len()
            );
        }
        assert_eq!(pak.header().encoding, PakEncoding::Utf8);
    }

    #[test]
    fn test_extract_to_map() {
        let mut pak = open(build_pak(&[(1, b"plain text"), (2, PNG), (3, b"\x01\x02\x03\x04")], &[]))
            .unwrap();
        let map = pak.extract_to_map().unwrap();

        assert_eq!(map["000000001.txt"], b"plain text");
        assert_eq!(map["000000002.png"], PNG);
        assert_eq!(map["000000003.bin"], b"\x01\x02\x03\x04");
    }

    #[test]
    fn test_extract_to_map_without_extensions() {
        let options = ReadOptions::default().with_append_extension(false);
        let mut pak =
            PakExtractor::new(Cursor::new(build_pak(&[(42, b"data")], &[])), &options).unwrap();
        let map = pak.extract_to_map().unwrap();

        assert_eq!(map.keys().collect::<Vec<_>>(), ["000000042"]);
    }

    #[test]
    fn test_extract_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let resources: [(u16, &[u8]); 2] = [(5, b"first"), (65535, b"second resource")];
        let mut pak = open(build_pak(&resources, &[])).unwrap();

        let written = pak.extract_to_directory(&out).unwrap();
        assert_eq!(written.len(), 2);
        for (id, data) in resources {
            let contents = std::fs::read(out.join(resource_name(id))).unwrap();
            assert_eq!(contents, data);
        }
        assert!(out.join("000065535").exists());
    }

    #[test]
    fn test_find_through_alias() {
        let mut pak = open(build_pak(&[(10, b"ten"), (20, b"twenty")], &[(15, 1)])).unwrap();

        assert_eq!(pak.find(10).unwrap().as_deref(), Some(&b"ten"[..]));
        assert_eq!(pak.find(15).unwrap().as_deref(), Some(&b"twenty"[..]));
        assert!(pak.find(99).unwrap().is_none());
    }

    #[test]
    fn test_version_four_header() {
        let mut out = Vec::new();
        out.extend_from_slice(&4u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.push(0);
        let start = 9 + 2 * 6;
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&(start as u32).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(start as u32 + 2).to_le_bytes());
        out.extend_from_slice(b"ok");

        let mut pak = open(out).unwrap();
        assert_eq!(pak.header().version, 4);
        assert_eq!(pak.find(3).unwrap().as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn test_newer_version_uses_v5_layout() {
        let mut bytes = build_pak(&[(1, b"hello")], &[]);
        bytes[..4].copy_from_slice(&6u32.to_le_bytes());

        let mut pak = open(bytes).unwrap();
        assert_eq!(pak.header().version, 6);
        assert_eq!(pak.header().size(), 12);
        assert_eq!(pak.read_resource(0).unwrap(), b"hello");
        assert!(pak.read_resource(1).is_err());
    }

    #[test]
    fn test_decreasing_offsets_are_rejected() {
        let mut bytes = build_pak(&[(1, b"aaaa"), (2, b"bb")], &[]);
        // second entry offset
        let at = 12 + 6 + 2;
        let first = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
        bytes[at..at + 4].copy_from_slice(&(first - 1).to_le_bytes());

        assert!(matches!(open(bytes), Err(PackageError::InvalidFormat { .. })));
    }

    #[test]
    fn test_sentinel_past_end_is_rejected() {
        let mut bytes = build_pak(&[(1, b"abc")], &[]);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(open(bytes), Err(PackageError::InvalidFormat { .. })));
    }

    #[test]
    fn test_offset_inside_table_is_rejected() {
        let mut bytes = build_pak(&[(1, b"abc")], &[]);
        bytes[14..18].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(open(bytes), Err(PackageError::InvalidFormat { .. })));
    }

    #[test]
    fn test_alias_out_of_range_is_rejected() {
        let bytes = build_pak(&[(1, b"abc")], &[(2, 5)]);
        assert!(matches!(open(bytes), Err(PackageError::InvalidFormat { .. })));
    }

    #[test]
    fn test_truncated_table_is_rejected() {
        let bytes = build_pak(&[(1, b"abc"), (2, b"def")], &[])[..16].to_vec();
        assert!(matches!(open(bytes), Err(PackageError::InvalidFormat { .. })));
    }

    #[test]
    fn test_resource_over_limit() {
        let options = ReadOptions::default().with_max_entry_size(2);
        let mut pak =
            PakExtractor::new(Cursor::new(build_pak(&[(1, b"abc")], &[])), &options).unwrap();
        assert!(pak.read_resource(0).is_err());
    }

    #[test]
    fn test_resource_name_padding() {
        assert_eq!(resource_name(0), "000000000");
        assert_eq!(resource_name(1234), "000001234");
    }
}
