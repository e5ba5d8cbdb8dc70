//! Locating HFS+ volumes on a disk: GPT, Apple Partition Map, or the whole disk.

use std::io::{Read, Seek, SeekFrom};

use serde::Serialize;
use tracing::{debug, trace};

use super::udif::SECTOR_SIZE;

const MAX_GPT_ENTRIES: u32 = 1024;
const MAX_APM_ENTRIES: u32 = 256;
const MAX_GPT_ENTRY_SIZE: usize = 4096;

/// Offset of the volume header from the start of an HFS+ partition.
pub const HFS_HEADER_OFFSET: u64 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PartitionScheme {
    Gpt,
    Apm,
    WholeDisk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub scheme: PartitionScheme,
    /// Byte offset on the disk.
    pub offset: u64,
    pub length: u64,
    pub name: Option<String>,
}

fn read_at<R: Read + Seek>(disk: &mut R, offset: u64, buf: &mut [u8]) -> bool {
    disk.seek(SeekFrom::Start(offset)).is_ok() && disk.read_exact(buf).is_ok()
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn ascii_field(data: &[u8]) -> Option<String> {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    let text = String::from_utf8_lossy(&data[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Reads a GUID partition table. Empty when there is none.
pub fn gpt_partitions<R: Read + Seek>(disk: &mut R) -> Vec<Partition> {
    let mut header = [0u8; 92];
    if !read_at(disk, SECTOR_SIZE, &mut header) || &header[..8] != b"EFI PART" {
        return Vec::new();
    }

    let entries_lba = le_u64(&header, 72);
    let count = le_u32(&header, 80).min(MAX_GPT_ENTRIES);
    let entry_size = le_u32(&header, 84) as usize;
    if !(128..=MAX_GPT_ENTRY_SIZE).contains(&entry_size) {
        debug!(entry_size, "ignoring gpt with unusable entry size");
        return Vec::new();
    }
    let Some(table_offset) = entries_lba.checked_mul(SECTOR_SIZE) else {
        debug!(entries_lba, "gpt entry table lies past the addressable range");
        return Vec::new();
    };

    let mut partitions = Vec::new();
    let mut entry = vec![0u8; entry_size];
    for i in 0..count as u64 {
        let Some(offset) = table_offset.checked_add(i * entry_size as u64) else {
            break;
        };
        if !read_at(disk, offset, &mut entry) {
            break;
        }
        if entry[..16].iter().all(|&b| b == 0) {
            continue;
        }

        let first = le_u64(&entry, 32);
        let last = le_u64(&entry, 40);
        let extent = last
            .checked_sub(first)
            .and_then(|span| span.checked_add(1))
            .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE));
        let (Some(offset), Some(length)) = (first.checked_mul(SECTOR_SIZE), extent) else {
            debug!(index = i, first, last, "skipping gpt entry with unusable bounds");
            continue;
        };

        let name_units: Vec<u16> = entry[56..128]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        let name = String::from_utf16_lossy(&name_units);

        partitions.push(Partition {
            scheme: PartitionScheme::Gpt,
            offset,
            length,
            name: (!name.is_empty()).then_some(name),
        });
    }

    partitions
}

/// Reads an Apple Partition Map. Empty when there is none.
pub fn apm_partitions<R: Read + Seek>(disk: &mut R) -> Vec<Partition> {
    let mut block0 = [0u8; 4];
    let block_size = if read_at(disk, 0, &mut block0) && &block0[..2] == b"ER" {
        match u16::from_be_bytes([block0[2], block0[3]]) {
            0 => SECTOR_SIZE,
            size => size as u64,
        }
    } else {
        SECTOR_SIZE
    };

    let mut entry = [0u8; 80];
    if !read_at(disk, block_size, &mut entry) || &entry[..2] != b"PM" {
        return Vec::new();
    }

    let count = be_u32(&entry, 4).min(MAX_APM_ENTRIES);
    let mut partitions = Vec::new();
    for i in 1..=count as u64 {
        if !read_at(disk, i * block_size, &mut entry) || &entry[..2] != b"PM" {
            break;
        }

        let start = be_u32(&entry, 8) as u64;
        let blocks = be_u32(&entry, 12) as u64;
        let kind = ascii_field(&entry[48..80]);
        trace!(index = i, kind = ?kind, "apm entry");
        if kind.as_deref() == Some("Apple_partition_map") || blocks == 0 {
            continue;
        }

        partitions.push(Partition {
            scheme: PartitionScheme::Apm,
            offset: start * block_size,
            length: blocks * block_size,
            name: ascii_field(&entry[16..48]),
        });
    }

    partitions
}

/// Whether an HFS+ (`H+`) or HFSX (`HX`) volume header sits at `offset`.
pub fn has_hfs_plus<R: Read + Seek>(disk: &mut R, offset: u64) -> bool {
    let mut signature = [0u8; 2];
    offset
        .checked_add(HFS_HEADER_OFFSET)
        .is_some_and(|at| read_at(disk, at, &mut signature))
        && matches!(&signature, b"H+" | b"HX")
}

/// Partitions holding an HFS+ volume, in table order. The whole disk is tried last.
pub fn find_hfs_volumes<R: Read + Seek>(disk: &mut R, disk_size: u64) -> Vec<Partition> {
    let mut candidates = gpt_partitions(disk);
    if candidates.is_empty() {
        candidates = apm_partitions(disk);
    }
    candidates.push(Partition {
        scheme: PartitionScheme::WholeDisk,
        offset: 0,
        length: disk_size,
        name: None,
    });

    candidates
        .into_iter()
        .filter(|p| has_hfs_plus(disk, p.offset))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use super::*;

    fn volume_stub() -> Vec<u8> {
        let mut volume = vec![0u8; 4096];
        volume[1024..1026].copy_from_slice(b"H+");
        volume
    }

    /// Places `volume` at LBA 40 of a GPT disk.
    pub(crate) fn wrap_gpt(volume: &[u8]) -> Vec<u8> {
        let start_lba = 40u64;
        let sectors = (volume.len() as u64).div_ceil(SECTOR_SIZE);
        let mut disk = vec![0u8; (start_lba * SECTOR_SIZE) as usize];

        let header = &mut disk[512..604];
        header[..8].copy_from_slice(b"EFI PART");
        header[72..80].copy_from_slice(&2u64.to_le_bytes());
        header[80..84].copy_from_slice(&4u32.to_le_bytes());
        header[84..88].copy_from_slice(&128u32.to_le_bytes());

        let entry = &mut disk[1024..1152];
        entry[..16].copy_from_slice(&[0x48, 0x46, 0x53, 0x00, 0, 0, 0xAA, 0x11, 0, 0, 0, 0, 0, 0, 0, 1]);
        entry[32..40].copy_from_slice(&start_lba.to_le_bytes());
        entry[40..48].copy_from_slice(&(start_lba + sectors - 1).to_le_bytes());
        for (i, unit) in "disk image".encode_utf16().enumerate() {
            entry[56 + 2 * i..58 + 2 * i].copy_from_slice(&unit.to_le_bytes());
        }

        disk.extend_from_slice(volume);
        disk.resize(((start_lba + sectors) * SECTOR_SIZE) as usize, 0);
        disk
    }

    /// Places `volume` after a three-entry Apple Partition Map.
    pub(crate) fn wrap_apm(volume: &[u8]) -> Vec<u8> {
        let start = 64u32;
        let blocks = (volume.len() as u64).div_ceil(SECTOR_SIZE) as u32;
        let mut disk = vec![0u8; start as usize * 512];
        disk[..2].copy_from_slice(b"ER");
        disk[2..4].copy_from_slice(&512u16.to_be_bytes());

        let entries: [(&str, &str, u32, u32); 3] = [
            ("Apple", "Apple_partition_map", 1, 63),
            ("Extra", "Apple_Free", 0, 0),
            ("disk image", "Apple_HFS", start, blocks),
        ];
        for (i, (name, kind, first, count)) in entries.iter().enumerate() {
            let entry = &mut disk[(i + 1) * 512..(i + 2) * 512];
            entry[..2].copy_from_slice(b"PM");
            entry[4..8].copy_from_slice(&3u32.to_be_bytes());
            entry[8..12].copy_from_slice(&first.to_be_bytes());
            entry[12..16].copy_from_slice(&count.to_be_bytes());
            entry[16..16 + name.len()].copy_from_slice(name.as_bytes());
            entry[48..48 + kind.len()].copy_from_slice(kind.as_bytes());
        }

        disk.extend_from_slice(volume);
        disk
    }

    #[test]
    fn test_gpt_partition_found() {
        let disk = wrap_gpt(&volume_stub());
        let size = disk.len() as u64;
        let mut cursor = Cursor::new(disk);

        let parts = gpt_partitions(&mut cursor);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].offset, 40 * 512);
        assert_eq!(parts[0].name.as_deref(), Some("disk image"));

        let volumes = find_hfs_volumes(&mut cursor, size);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].scheme, PartitionScheme::Gpt);
    }

    #[test]
    fn test_apm_partition_found() {
        let disk = wrap_apm(&volume_stub());
        let size = disk.len() as u64;
        let mut cursor = Cursor::new(disk);

        let volumes = find_hfs_volumes(&mut cursor, size);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].scheme, PartitionScheme::Apm);
        assert_eq!(volumes[0].offset, 64 * 512);
        assert_eq!(volumes[0].name.as_deref(), Some("disk image"));
    }

    #[test]
    fn test_whole_disk_volume() {
        let mut cursor = Cursor::new(volume_stub());
        let volumes = find_hfs_volumes(&mut cursor, 4096);
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].scheme, PartitionScheme::WholeDisk);
    }

    #[test]
    fn test_hfsx_signature_and_no_volume() {
        let mut volume = volume_stub();
        volume[1024..1026].copy_from_slice(b"HX");
        assert!(has_hfs_plus(&mut Cursor::new(volume), 0));

        let mut blank = Cursor::new(vec![0u8; 8192]);
        assert!(find_hfs_volumes(&mut blank, 8192).is_empty());
    }

    #[test]
    fn test_gpt_entry_past_addressable_range_is_skipped() {
        let mut disk = wrap_gpt(&volume_stub());
        disk[1056..1064].copy_from_slice(&(1u64 << 60).to_le_bytes());
        disk[1064..1072].copy_from_slice(&((1u64 << 60) + 7).to_le_bytes());
        let size = disk.len() as u64;
        let mut cursor = Cursor::new(disk);

        assert!(gpt_partitions(&mut cursor).is_empty());
        assert!(find_hfs_volumes(&mut cursor, size).is_empty());
    }

    #[test]
    fn test_gpt_table_offset_overflow_is_ignored() {
        let mut disk = wrap_gpt(&volume_stub());
        disk[584..592].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(gpt_partitions(&mut Cursor::new(disk)).is_empty());
    }

    #[test]
    fn test_gpt_oversized_entries_are_ignored() {
        let mut disk = wrap_gpt(&volume_stub());
        disk[596..600].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(gpt_partitions(&mut Cursor::new(disk)).is_empty());
    }
}
