//! Read-only HFS+ access: the volume header, a walk over the catalog B-tree leaves, and
//! data-fork reads through extent records.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::{Read, Seek, SeekFrom},
};

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{partition::HFS_HEADER_OFFSET, FORMAT};
use crate::error::{ErrorContext, PackageError, Result};

const ROOT_PARENT_ID: u32 = 1;
const ROOT_FOLDER_ID: u32 = 2;
const NODE_DESCRIPTOR_SIZE: usize = 14;
const LEAF_NODE: i8 = -1;
const FOLDER_RECORD: i16 = 1;
const FILE_RECORD: i16 = 2;

fn be_u16(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes(data.get(at..at + 2)?.try_into().ok()?))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_be_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

fn be_u64(data: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_be_bytes(data.get(at..at + 8)?.try_into().ok()?))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Extent {
    pub start_block: u32,
    pub block_count: u32,
}

/// Size and the first eight extents of a fork.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForkData {
    pub logical_size: u64,
    pub total_blocks: u32,
    pub extents: [Extent; 8],
}

impl ForkData {
    pub const SIZE: usize = 80;

    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut extents = [Extent::default(); 8];
        for (i, extent) in extents.iter_mut().enumerate() {
            let at = 16 + i * 8;
            *extent = Extent {
                start_block: be_u32(data, at)?,
                block_count: be_u32(data, at + 4)?,
            };
        }
        Some(Self {
            logical_size: be_u64(data, 0)?,
            total_blocks: be_u32(data, 12)?,
            extents,
        })
    }
}

/// A file or folder found by [`HfsPlusVolume::walk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HfsEntry {
    pub id: u32,
    pub is_dir: bool,
    #[serde(skip)]
    pub fork: Option<ForkData>,
}

impl HfsEntry {
    pub fn size(&self) -> u64 {
        self.fork.map_or(0, |f| f.logical_size)
    }
}

/// Result of a catalog walk: paths are `/`-joined and relative to the volume root.
#[derive(Debug, Clone, Default)]
pub struct CatalogListing {
    pub label: Option<String>,
    pub entries: BTreeMap<String, HfsEntry>,
}

#[derive(Debug, Clone, Copy)]
struct BTreeHeader {
    first_leaf: u32,
    node_size: u16,
    total_nodes: u32,
}

struct CatalogRecord {
    parent: u32,
    name: String,
    id: u32,
    is_dir: bool,
    fork: Option<ForkData>,
}

/// An HFS+ or HFSX volume starting at `offset` on a disk.
pub struct HfsPlusVolume<R> {
    disk: R,
    offset: u64,
    block_size: u32,
    catalog: ForkData,
}

impl<R: Read + Seek> HfsPlusVolume<R> {
    pub fn open(mut disk: R, offset: u64) -> Result<Self> {
        let mut header = [0u8; 512];
        let header_at = offset
            .checked_add(HFS_HEADER_OFFSET)
            .ok_or_else(|| PackageError::invalid(FORMAT, "volume offset out of range"))?;
        disk.seek(SeekFrom::Start(header_at))
            .with_context(|| "seeking to HFS+ volume header".to_string())?;
        disk.read_exact(&mut header)
            .with_context(|| "reading HFS+ volume header".to_string())?;

        if !matches!(&header[..2], b"H+" | b"HX") {
            return Err(PackageError::invalid(FORMAT, "no HFS+ volume header"));
        }

        let block_size = be_u32(&header, 40).unwrap_or(0);
        if block_size < 512 || !block_size.is_power_of_two() {
            return Err(PackageError::invalid(
                FORMAT,
                format!("bad HFS+ block size {block_size}"),
            ));
        }

        let catalog = ForkData::parse(&header[272..272 + ForkData::SIZE])
            .ok_or_else(|| PackageError::invalid(FORMAT, "truncated catalog fork"))?;
        trace!(block_size, catalog_size = catalog.logical_size, "opened HFS+ volume");

        Ok(Self {
            disk,
            offset,
            block_size,
            catalog,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Reads `len` bytes at `start` within a fork, following its extents.
    fn read_fork_range(&mut self, fork: &ForkData, start: u64, len: usize) -> Result<Vec<u8>> {
        let block_size = self.block_size as u64;
        let mut out = Vec::with_capacity(len);
        let mut extent_start = 0u64;

        for extent in fork.extents.iter().filter(|e| e.block_count > 0) {
            let extent_len = extent.block_count as u64 * block_size;
            let extent_end = extent_start.saturating_add(extent_len);
            let wanted = start.saturating_add(out.len() as u64);

            if out.len() < len && wanted < extent_end {
                let within = wanted - extent_start;
                let take = ((extent_end - wanted) as usize).min(len - out.len());
                let physical = self
                    .offset
                    .checked_add(extent.start_block as u64 * block_size)
                    .and_then(|at| at.checked_add(within))
                    .ok_or_else(|| {
                        PackageError::invalid(
                            FORMAT,
                            format!("HFS+ block {} lies past the disk", extent.start_block),
                        )
                    })?;

                let mut chunk = vec![0u8; take];
                self.disk
                    .seek(SeekFrom::Start(physical))
                    .with_context(|| format!("seeking to HFS+ block {}", extent.start_block))?;
                self.disk
                    .read_exact(&mut chunk)
                    .with_context(|| format!("reading HFS+ block {}", extent.start_block))?;
                out.extend_from_slice(&chunk);
            }

            extent_start = extent_end;
            if out.len() == len {
                break;
            }
        }

        if out.len() < len {
            return Err(PackageError::Unsupported(
                "HFS+ fork continues in the extents overflow file".into(),
            ));
        }
        Ok(out)
    }

    /// Reads a whole data fork, refusing forks larger than `limit`.
    pub fn read_fork(&mut self, fork: &ForkData, limit: u64) -> Result<Vec<u8>> {
        if fork.logical_size > limit {
            return Err(PackageError::invalid(
                FORMAT,
                format!("file of {} bytes exceeds the {limit} byte limit", fork.logical_size),
            ));
        }
        self.read_fork_range(fork, 0, fork.logical_size as usize)
    }

    fn read_header_node(&mut self) -> Result<BTreeHeader> {
        let catalog = self.catalog;
        let node = self.read_fork_range(&catalog, 0, 512)?;
        let header = (|| {
            Some(BTreeHeader {
                first_leaf: be_u32(&node, NODE_DESCRIPTOR_SIZE + 10)?,
                node_size: be_u16(&node, NODE_DESCRIPTOR_SIZE + 18)?,
                total_nodes: be_u32(&node, NODE_DESCRIPTOR_SIZE + 22)?,
            })
        })()
        .ok_or_else(|| PackageError::invalid(FORMAT, "truncated catalog header node"))?;

        if header.node_size < 512 {
            return Err(PackageError::invalid(
                FORMAT,
                format!("bad catalog node size {}", header.node_size),
            ));
        }
        Ok(header)
    }

    fn leaf_records(node: &[u8], node_size: usize) -> Vec<CatalogRecord> {
        let count = be_u16(node, 10).unwrap_or(0) as usize;
        let mut records = Vec::with_capacity(count);

        for i in 0..count {
            let Some(start) = node_size
                .checked_sub(2 * (i + 1))
                .and_then(|at| be_u16(node, at))
            else {
                break;
            };
            if let Some(record) = parse_record(&node[(start as usize).min(node.len())..]) {
                records.push(record);
            }
        }

        records
    }

    /// Walks the catalog leaf chain and rebuilds every path.
    ///
    /// Read errors end the walk early and are logged; whatever was collected so far is
    /// returned.
    pub fn walk(&mut self) -> CatalogListing {
        let records = match self.collect_records() {
            Ok(records) => records,
            Err(err) => {
                warn!("failed to read HFS+ catalog: {err}");
                return CatalogListing::default();
            }
        };

        build_listing(records)
    }

    fn collect_records(&mut self) -> Result<Vec<CatalogRecord>> {
        let header = self.read_header_node()?;
        let node_size = header.node_size as usize;
        let catalog = self.catalog;

        let mut records = Vec::new();
        let mut visited = HashSet::new();
        let mut node_index = header.first_leaf;

        while node_index != 0 {
            if node_index >= header.total_nodes || !visited.insert(node_index) {
                warn!(node = node_index, "catalog leaf chain is broken, stopping walk");
                break;
            }

            let node = match self.read_fork_range(
                &catalog,
                node_index as u64 * node_size as u64,
                node_size,
            ) {
                Ok(node) => node,
                Err(err) => {
                    warn!(node = node_index, "failed to read catalog node: {err}");
                    break;
                }
            };

            if node[8] as i8 != LEAF_NODE {
                warn!(node = node_index, kind = node[8] as i8, "expected a catalog leaf node");
                break;
            }

            records.extend(Self::leaf_records(&node, node_size));
            node_index = be_u32(&node, 0).unwrap_or(0);
        }

        debug!(records = records.len(), "walked HFS+ catalog");
        Ok(records)
    }
}

fn parse_record(record: &[u8]) -> Option<CatalogRecord> {
    let key_length = be_u16(record, 0)? as usize;
    let parent = be_u32(record, 2)?;
    let name_length = be_u16(record, 6)? as usize;
    let name_units: Vec<u16> = record
        .get(8..8 + name_length * 2)?
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    let name = String::from_utf16_lossy(&name_units);

    let data = record.get(2 + key_length..)?;
    let kind = i16::from_be_bytes(data.get(..2)?.try_into().ok()?);

    match kind {
        FOLDER_RECORD => {
            Some(CatalogRecord {
                parent,
                name,
                id: be_u32(data, 8)?,
                is_dir: true,
                fork: None,
            })
        }
        FILE_RECORD => {
            Some(CatalogRecord {
                parent,
                name,
                id: be_u32(data, 8)?,
                is_dir: false,
                fork: Some(ForkData::parse(data.get(88..88 + ForkData::SIZE)?)?),
            })
        }
        _ => None,
    }
}

fn build_listing(records: Vec<CatalogRecord>) -> CatalogListing {
    let mut listing = CatalogListing::default();

    // folder id -> (parent id, name)
    let mut folders: HashMap<u32, (u32, String)> = HashMap::new();
    for record in records.iter().filter(|r| r.is_dir) {
        if record.id == ROOT_FOLDER_ID && record.parent == ROOT_PARENT_ID {
            listing.label = Some(record.name.clone());
        }
        folders.insert(record.id, (record.parent, record.name.clone()));
    }

    let mut paths: HashMap<u32, Option<String>> = HashMap::new();
    paths.insert(ROOT_FOLDER_ID, Some(String::new()));

    for record in &records {
        if record.id == ROOT_FOLDER_ID || record.name.starts_with('\0') {
            continue;
        }
        let Some(parent_path) = folder_path(record.parent, &folders, &mut paths) else {
            debug!(name = %record.name, parent = record.parent, "skipping orphan catalog record");
            continue;
        };

        let path = if parent_path.is_empty() {
            record.name.clone()
        } else {
            format!("{parent_path}/{}", record.name)
        };
        listing.entries.insert(
            path,
            HfsEntry {
                id: record.id,
                is_dir: record.is_dir,
                fork: record.fork,
            },
        );
    }

    listing
}

/// Resolves a folder id to its path, memoizing results. Hidden or unreachable folders
/// resolve to `None`.
fn folder_path(
    id: u32,
    folders: &HashMap<u32, (u32, String)>,
    paths: &mut HashMap<u32, Option<String>>,
) -> Option<String> {
    let mut chain = Vec::new();
    let mut current = id;

    let base = loop {
        if let Some(known) = paths.get(&current) {
            break known.clone();
        }
        if chain.len() > folders.len() {
            break None;
        }
        match folders.get(&current) {
            Some((_, name)) if name.starts_with('\0') => break None,
            Some((parent, _)) => {
                chain.push(current);
                current = *parent;
            }
            None => break None,
        }
    };

    let mut path = base;
    for folder in chain.into_iter().rev() {
        path = path.and_then(|prefix| {
            let (_, name) = folders.get(&folder)?;
            Some(if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            })
        });
        paths.insert(folder, path.clone());
    }
    path
}
