//! UDIF disk images: the `koly` trailer, the `blkx` chunk tables of the XML resource fork,
//! and a lazily decoding `Read + Seek` view of the disk they describe.

use std::io::{self, Read, Seek, SeekFrom};

use bzip2::read::BzDecoder;
use flate2::read::ZlibDecoder;
use tracing::{debug, trace};
use xz2::{read::XzDecoder, stream::Stream};

use super::FORMAT;
use crate::{
    error::{ErrorContext, PackageError, Result},
    formats::apple::PlistValue,
};

pub const SECTOR_SIZE: u64 = 512;

const KOLY_SIZE: u64 = 512;
const MISH_HEADER_SIZE: usize = 204;
const CHUNK_SIZE: usize = 40;

/// The fields of the 512-byte trailer this reader uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KolyTrailer {
    pub data_fork_offset: u64,
    pub data_fork_length: u64,
    pub xml_offset: u64,
    pub xml_length: u64,
    pub sector_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Zero,
    Raw,
    Ignore,
    Adc,
    Zlib,
    Bzip2,
    Lzfse,
    Lzma,
    Comment,
    End,
    Unknown(u32),
}

impl From<u32> for ChunkKind {
    fn from(value: u32) -> Self {
        match value {
            0x0000_0000 => Self::Zero,
            0x0000_0001 => Self::Raw,
            0x0000_0002 => Self::Ignore,
            0x8000_0004 => Self::Adc,
            0x8000_0005 => Self::Zlib,
            0x8000_0006 => Self::Bzip2,
            0x8000_0007 => Self::Lzfse,
            0x8000_0008 => Self::Lzma,
            0x7FFF_FFFE => Self::Comment,
            0xFFFF_FFFF => Self::End,
            other => Self::Unknown(other),
        }
    }
}

/// A run of sectors and where its encoded bytes live in the image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub kind: ChunkKind,
    pub sector: u64,
    pub sector_count: u64,
    pub data_offset: u64,
    pub data_length: u64,
}

impl Chunk {
    fn end_sector(&self) -> u64 {
        self.sector.saturating_add(self.sector_count)
    }

    /// First byte past the chunk on the logical disk, `None` when not addressable.
    fn byte_end(&self) -> Option<u64> {
        self.sector.checked_add(self.sector_count)?.checked_mul(SECTOR_SIZE)
    }
}

fn be_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn be_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_be_bytes(bytes)
}

/// Reads the trailer from the last 512 bytes. Returns `None` when there is none.
pub fn read_koly<R: Read + Seek>(reader: &mut R) -> Result<Option<KolyTrailer>> {
    let len = reader
        .seek(SeekFrom::End(0))
        .with_context(|| "measuring disk image".to_string())?;
    if len < KOLY_SIZE {
        return Ok(None);
    }

    let mut block = [0u8; KOLY_SIZE as usize];
    reader
        .seek(SeekFrom::Start(len - KOLY_SIZE))
        .with_context(|| "seeking to koly trailer".to_string())?;
    reader
        .read_exact(&mut block)
        .with_context(|| "reading koly trailer".to_string())?;

    if &block[..4] != b"koly" {
        return Ok(None);
    }

    Ok(Some(KolyTrailer {
        data_fork_offset: be_u64(&block, 24),
        data_fork_length: be_u64(&block, 32),
        xml_offset: be_u64(&block, 216),
        xml_length: be_u64(&block, 224),
        sector_count: be_u64(&block, 492),
    }))
}

/// Decodes one `mish` block table into absolute chunks.
pub fn parse_mish(data: &[u8], data_fork_offset: u64) -> Result<Vec<Chunk>> {
    if data.len() < MISH_HEADER_SIZE || &data[..4] != b"mish" {
        return Err(PackageError::invalid(FORMAT, "blkx entry without mish header"));
    }

    let first_sector = be_u64(data, 8);
    let base = data_fork_offset.saturating_add(be_u64(data, 24));
    let count = be_u32(data, 200) as usize;

    let table = &data[MISH_HEADER_SIZE..];
    if table.len() / CHUNK_SIZE < count {
        return Err(PackageError::invalid(
            FORMAT,
            format!("mish declares {count} chunks but holds {}", table.len() / CHUNK_SIZE),
        ));
    }

    Ok(table
        .chunks_exact(CHUNK_SIZE)
        .take(count)
        .map(|raw| {
            Chunk {
                kind: be_u32(raw, 0).into(),
                sector: first_sector.saturating_add(be_u64(raw, 8)),
                sector_count: be_u64(raw, 16),
                data_offset: base.saturating_add(be_u64(raw, 24)),
                data_length: be_u64(raw, 32),
            }
        })
        .collect())
}

/// Pulls every chunk out of the XML resource fork.
pub fn parse_resource_fork(xml: &[u8], data_fork_offset: u64) -> Result<Vec<Chunk>> {
    let plist = PlistValue::from_bytes(xml)?;
    let blkx = plist
        .get("resource-fork")
        .and_then(|fork| fork.get("blkx"))
        .and_then(PlistValue::as_array)
        .ok_or_else(|| PackageError::invalid(FORMAT, "resource fork has no blkx table"))?;

    let mut chunks = Vec::new();
    for entry in blkx {
        let Some(PlistValue::Data(data)) = entry.get("Data") else {
            continue;
        };
        chunks.extend(parse_mish(data, data_fork_offset)?);
    }

    chunks.retain(|c| !matches!(c.kind, ChunkKind::Comment | ChunkKind::End) && c.sector_count > 0);
    chunks.retain(|c| {
        let addressable = c.byte_end().is_some();
        if !addressable {
            debug!(
                sector = c.sector,
                sector_count = c.sector_count,
                "skipping unaddressable udif chunk"
            );
        }
        addressable
    });
    chunks.sort_by_key(|c| c.sector);
    Ok(chunks)
}

/// Apple Data Compression, an LZ77 variant used by old images.
pub fn decode_adc(input: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;
    let truncated = || PackageError::invalid(FORMAT, "ADC stream ends inside a token");

    while pos < input.len() && out.len() < expected {
        let token = input[pos];

        let (count, distance) = if token & 0x80 != 0 {
            let count = (token & 0x7F) as usize + 1;
            let literal = input.get(pos + 1..pos + 1 + count).ok_or_else(truncated)?;
            out.extend_from_slice(literal);
            pos += 1 + count;
            continue;
        } else if token & 0x40 != 0 {
            let bytes = input.get(pos + 1..pos + 3).ok_or_else(truncated)?;
            pos += 3;
            (
                (token & 0x3F) as usize + 4,
                u16::from_be_bytes([bytes[0], bytes[1]]) as usize,
            )
        } else {
            let low = *input.get(pos + 1).ok_or_else(truncated)?;
            pos += 2;
            (
                ((token & 0x3F) >> 2) as usize + 3,
                (((token & 0x03) as usize) << 8) | low as usize,
            )
        };

        if distance + 1 > out.len() {
            return Err(PackageError::invalid(FORMAT, "ADC back-reference before start"));
        }
        let from = out.len() - distance - 1;
        for i in 0..count {
            let byte = out[from + i];
            out.push(byte);
        }
    }

    out.truncate(expected);
    Ok(out)
}

/// The logical disk behind a UDIF image.
pub struct UdifImage<R> {
    reader: R,
    chunks: Vec<Chunk>,
    size: u64,
    pos: u64,
    max_chunk_size: u64,
    cache: Option<(usize, Vec<u8>)>,
}

impl<R: Read + Seek> UdifImage<R> {
    /// Builds the view from a trailer already read with [`read_koly`].
    pub fn new(mut reader: R, koly: &KolyTrailer, max_chunk_size: u64) -> Result<Self> {
        if koly.xml_length == 0 || koly.xml_length > max_chunk_size {
            return Err(PackageError::invalid(
                FORMAT,
                format!("unusable XML resource fork length {}", koly.xml_length),
            ));
        }

        let mut xml = vec![0u8; koly.xml_length as usize];
        reader
            .seek(SeekFrom::Start(koly.xml_offset))
            .with_context(|| "seeking to resource fork".to_string())?;
        reader
            .read_exact(&mut xml)
            .with_context(|| "reading resource fork".to_string())?;

        let chunks = parse_resource_fork(&xml, koly.data_fork_offset)?;
        let chunk_end = chunks.iter().map(Chunk::end_sector).max().unwrap_or(0);
        let size = koly
            .sector_count
            .max(chunk_end)
            .checked_mul(SECTOR_SIZE)
            .ok_or_else(|| {
                PackageError::invalid(
                    FORMAT,
                    format!("sector count {} exceeds addressable size", koly.sector_count),
                )
            })?;
        debug!(chunks = chunks.len(), size, "parsed udif block tables");

        Ok(Self {
            reader,
            chunks,
            size,
            pos: 0,
            max_chunk_size,
            cache: None,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Logical disk size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    fn chunk_at(&self, sector: u64) -> Option<usize> {
        let idx = self.chunks.partition_point(|c| c.sector <= sector);
        let idx = idx.checked_sub(1)?;
        (sector < self.chunks[idx].end_sector()).then_some(idx)
    }

    fn load(&mut self, index: usize) -> Result<&[u8]> {
        if !matches!(&self.cache, Some((cached, _)) if *cached == index) {
            let data = self.decode(self.chunks[index])?;
            self.cache = Some((index, data));
        }
        match &self.cache {
            Some((_, data)) => Ok(data),
            None => Err(PackageError::invalid(FORMAT, "chunk cache is empty")),
        }
    }

    fn decode(&mut self, chunk: Chunk) -> Result<Vec<u8>> {
        let expected = chunk.sector_count.saturating_mul(SECTOR_SIZE);
        if expected > self.max_chunk_size || chunk.data_length > self.max_chunk_size {
            return Err(PackageError::invalid(
                FORMAT,
                format!("chunk at sector {} is too large", chunk.sector),
            ));
        }
        let expected = expected as usize;
        trace!(kind = ?chunk.kind, sector = chunk.sector, "decoding udif chunk");

        let mut out = match chunk.kind {
            ChunkKind::Zero | ChunkKind::Ignore => return Ok(vec![0u8; expected]),
            ChunkKind::Lzfse => return Err(PackageError::Unsupported("LZFSE compressed chunk".into())),
            ChunkKind::Unknown(kind) => {
                return Err(PackageError::Unsupported(format!("UDIF chunk type {kind:#010x}")))
            }
            ChunkKind::Comment | ChunkKind::End => return Ok(Vec::new()),
            kind => {
                let mut raw = vec![0u8; chunk.data_length as usize];
                self.reader
                    .seek(SeekFrom::Start(chunk.data_offset))
                    .with_context(|| format!("seeking to chunk at sector {}", chunk.sector))?;
                self.reader
                    .read_exact(&mut raw)
                    .with_context(|| format!("reading chunk at sector {}", chunk.sector))?;

                match kind {
                    ChunkKind::Raw => raw,
                    ChunkKind::Adc => decode_adc(&raw, expected)?,
                    ChunkKind::Zlib => inflate(ZlibDecoder::new(raw.as_slice()), expected)?,
                    ChunkKind::Bzip2 => inflate(BzDecoder::new(raw.as_slice()), expected)?,
                    _ => {
                        let stream = Stream::new_auto_decoder(u64::MAX, 0).map_err(|err| {
                            PackageError::invalid(FORMAT, format!("LZMA decoder: {err}"))
                        })?;
                        inflate(XzDecoder::new_stream(raw.as_slice(), stream), expected)?
                    }
                }
            }
        };

        out.resize(expected, 0);
        Ok(out)
    }
}

fn inflate<D: Read>(decoder: D, expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    decoder
        .take(expected as u64)
        .read_to_end(&mut out)
        .with_context(|| "decompressing udif chunk".to_string())?;
    Ok(out)
}

impl<R: Read + Seek> Read for UdifImage<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }

        let pos = self.pos;
        let sector = pos / SECTOR_SIZE;
        let n = match self.chunk_at(sector) {
            Some(index) => {
                let start = self.chunks[index].sector * SECTOR_SIZE;
                let data = self
                    .load(index)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
                let offset = (pos - start) as usize;
                let n = buf.len().min(data.len().saturating_sub(offset));
                buf[..n].copy_from_slice(&data[offset..offset + n]);
                n
            }
            None => {
                let next = self
                    .chunks
                    .iter()
                    .map(|c| c.sector * SECTOR_SIZE)
                    .find(|&start| start > pos)
                    .unwrap_or(self.size);
                let n = buf.len().min((next - pos) as usize);
                buf[..n].fill(0);
                n
            }
        };

        let n = n.min((self.size - pos) as usize);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for UdifImage<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of disk image")
        })?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::{Cursor, Write};

    use flate2::{write::ZlibEncoder, Compression};

    use super::*;

    pub(crate) enum TestChunk {
        Raw(Vec<u8>),
        Zlib(Vec<u8>),
        Zero(u64),
    }

    fn mish(first_sector: u64, chunks: &[(u32, u64, u64, u64, u64)]) -> Vec<u8> {
        let mut out = vec![0u8; MISH_HEADER_SIZE];
        out[..4].copy_from_slice(b"mish");
        out[4..8].copy_from_slice(&1u32.to_be_bytes());
        out[8..16].copy_from_slice(&first_sector.to_be_bytes());
        let total: u64 = chunks.iter().map(|c| c.2).sum();
        out[16..24].copy_from_slice(&total.to_be_bytes());
        out[200..204].copy_from_slice(&(chunks.len() as u32 + 1).to_be_bytes());

        for &(kind, sector, count, offset, length) in chunks {
            let mut raw = [0u8; CHUNK_SIZE];
            raw[..4].copy_from_slice(&kind.to_be_bytes());
            raw[8..16].copy_from_slice(&sector.to_be_bytes());
            raw[16..24].copy_from_slice(&count.to_be_bytes());
            raw[24..32].copy_from_slice(&offset.to_be_bytes());
            raw[32..40].copy_from_slice(&length.to_be_bytes());
            out.extend_from_slice(&raw);
        }

        let mut end = [0u8; CHUNK_SIZE];
        end[..4].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        out.extend_from_slice(&end);
        out
    }

    fn resource_fork(mish: Vec<u8>) -> Vec<u8> {
        let mut blkx = plist::Dictionary::new();
        blkx.insert("Name".into(), plist::Value::String("disk image (Apple_HFS : 1)".into()));
        blkx.insert("Data".into(), plist::Value::Data(mish));
        let mut fork = plist::Dictionary::new();
        fork.insert(
            "blkx".into(),
            plist::Value::Array(vec![plist::Value::Dictionary(blkx)]),
        );
        let mut root = plist::Dictionary::new();
        root.insert("resource-fork".into(), plist::Value::Dictionary(fork));
        let mut xml = Vec::new();
        plist::Value::Dictionary(root).to_writer_xml(&mut xml).unwrap();
        xml
    }

    /// Wraps the chunks into a complete image: data fork, XML plist and koly trailer.
    /// Every chunk payload length must be a multiple of the sector size.
    pub(crate) fn build_udif(chunks: &[TestChunk]) -> Vec<u8> {
        let mut data_fork = Vec::new();
        let mut table = Vec::new();
        let mut sector = 0u64;

        for chunk in chunks {
            let offset = data_fork.len() as u64;
            let (kind, sectors, payload) = match chunk {
                TestChunk::Raw(bytes) => (1u32, bytes.len() as u64 / SECTOR_SIZE, bytes.clone()),
                TestChunk::Zlib(bytes) => {
                    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                    encoder.write_all(bytes).unwrap();
                    (
                        0x8000_0005,
                        bytes.len() as u64 / SECTOR_SIZE,
                        encoder.finish().unwrap(),
                    )
                }
                TestChunk::Zero(sectors) => (0, *sectors, Vec::new()),
            };
            table.push((kind, sector, sectors, offset, payload.len() as u64));
            data_fork.extend_from_slice(&payload);
            sector += sectors;
        }

        let xml = resource_fork(mish(0, &table));

        let mut image = data_fork;
        let data_len = image.len() as u64;
        let xml_offset = image.len() as u64;
        image.extend_from_slice(&xml);

        let mut koly = [0u8; KOLY_SIZE as usize];
        koly[..4].copy_from_slice(b"koly");
        koly[4..8].copy_from_slice(&4u32.to_be_bytes());
        koly[8..12].copy_from_slice(&512u32.to_be_bytes());
        koly[32..40].copy_from_slice(&data_len.to_be_bytes());
        koly[216..224].copy_from_slice(&xml_offset.to_be_bytes());
        koly[224..232].copy_from_slice(&(xml.len() as u64).to_be_bytes());
        koly[492..500].copy_from_slice(&sector.to_be_bytes());
        image.extend_from_slice(&koly);
        image
    }

    fn open(image: Vec<u8>) -> UdifImage<Cursor<Vec<u8>>> {
        let mut cursor = Cursor::new(image);
        let koly = read_koly(&mut cursor).unwrap().unwrap();
        UdifImage::new(cursor, &koly, 1 << 20).unwrap()
    }

    #[test]
    fn test_reads_mixed_chunks() {
        let raw: Vec<u8> = (0..1024u32).map(|i| i as u8).collect();
        let text = b"compressed sector ".repeat(57)[..1024].to_vec();
        let image = build_udif(&[
            TestChunk::Raw(raw.clone()),
            TestChunk::Zero(2),
            TestChunk::Zlib(text.clone()),
        ]);

        let mut disk = open(image);
        assert_eq!(disk.size(), 6 * SECTOR_SIZE);
        assert_eq!(disk.chunks().len(), 3);

        let mut all = Vec::new();
        disk.read_to_end(&mut all).unwrap();
        assert_eq!(all.len(), 3072);
        assert_eq!(&all[..1024], raw.as_slice());
        assert!(all[1024..2048].iter().all(|&b| b == 0));
        assert_eq!(&all[2048..], text.as_slice());
    }

    #[test]
    fn test_seek_into_compressed_chunk() {
        let text: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let mut disk = open(build_udif(&[TestChunk::Zlib(text.clone())]));

        disk.seek(SeekFrom::Start(1500)).unwrap();
        let mut buf = [0u8; 10];
        disk.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &text[1500..1510]);

        disk.seek(SeekFrom::End(-2)).unwrap();
        let mut tail = Vec::new();
        disk.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &text[2046..]);
    }

    #[test]
    fn test_plain_file_has_no_koly() {
        let mut cursor = Cursor::new(vec![0u8; 4096]);
        assert!(read_koly(&mut cursor).unwrap().is_none());
        let mut tiny = Cursor::new(vec![0u8; 10]);
        assert!(read_koly(&mut tiny).unwrap().is_none());
    }

    #[test]
    fn test_chunk_kinds() {
        assert_eq!(ChunkKind::from(0x8000_0005), ChunkKind::Zlib);
        assert_eq!(ChunkKind::from(0x8000_0007), ChunkKind::Lzfse);
        assert_eq!(ChunkKind::from(2), ChunkKind::Ignore);
        assert_eq!(ChunkKind::from(0x1234), ChunkKind::Unknown(0x1234));
    }

    #[test]
    fn test_lzfse_chunk_is_unsupported() {
        let table = mish(0, &[(0x8000_0007, 0, 1, 0, 4)]);
        let chunks = parse_mish(&table, 0).unwrap();
        let mut disk = UdifImage {
            reader: Cursor::new(vec![0u8; 16]),
            chunks: chunks[..1].to_vec(),
            size: SECTOR_SIZE,
            pos: 0,
            max_chunk_size: 1 << 20,
            cache: None,
        };
        assert!(matches!(
            disk.decode(chunks[0]),
            Err(PackageError::Unsupported(_))
        ));
        let mut buf = [0u8; 4];
        assert!(disk.read(&mut buf).is_err());
    }

    #[test]
    fn test_decode_adc() {
        // literal "abc", then copy 4 bytes from distance 3 (offset 2), then 3 from offset 0
        let input = [0x82, b'a', b'b', b'c', 0x40, 0x00, 0x02, 0x00, 0x00];
        assert_eq!(decode_adc(&input, 10).unwrap(), b"abcabcaaaa");

        assert!(decode_adc(&[0x40, 0x00, 0x05], 8).is_err());
    }

    #[test]
    fn test_mish_rejects_short_table() {
        let mut table = mish(0, &[(1, 0, 1, 0, 512)]);
        table[200..204].copy_from_slice(&10u32.to_be_bytes());
        assert!(parse_mish(&table, 0).is_err());
        assert!(parse_mish(b"nope", 0).is_err());
    }

    #[test]
    fn test_unaddressable_chunks_are_skipped() {
        let table = mish(
            0,
            &[(1, 0, 1, 0, 512), (1, 1 << 60, 8, 512, 512), (0, u64::MAX, 2, 0, 0)],
        );
        let chunks = parse_resource_fork(&resource_fork(table), 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sector, 0);
    }

    #[test]
    fn test_oversized_sector_count_is_rejected() {
        let mut image = build_udif(&[TestChunk::Zero(1)]);
        let trailer = image.len() - KOLY_SIZE as usize;
        image[trailer + 492..trailer + 500].copy_from_slice(&u64::MAX.to_be_bytes());

        let mut cursor = Cursor::new(image);
        let koly = read_koly(&mut cursor).unwrap().unwrap();
        assert!(matches!(
            UdifImage::new(cursor, &koly, 1 << 20),
            Err(PackageError::InvalidFormat { .. })
        ));
    }
}
