//! Unix `ar` archives, the outer container of Debian packages.
//!
//! Layout: the global magic `!<arch>\n`, then for every member a 60-byte header followed
//! by the payload, padded to an even length.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use tracing::{debug, trace};

use crate::{
    error::{ErrorContext, PackageError, Result},
    options::ReadOptions,
};

/// Global archive magic.
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

/// Size of a member header.
pub const AR_HEADER_SIZE: usize = 60;

const AR_FMAG: &[u8; 2] = b"`\n";
const FORMAT: &str = "ar";

/// A single archive member with its payload loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArEntry {
    pub name: String,
    pub size: u64,
    pub data: Vec<u8>,
}

impl ArEntry {
    /// Bytes this member occupies in the archive: header, payload and the alignment pad.
    pub fn stored_len(&self) -> u64 {
        AR_HEADER_SIZE as u64 + self.size + (self.size & 1)
    }
}

/// Reads every member of an `ar` archive into memory.
pub struct ArReader;

impl ArReader {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<ArEntry>> {
        Self::read_with_options(path, &ReadOptions::default())
    }

    pub fn read_with_options<P: AsRef<Path>>(
        path: P,
        options: &ReadOptions,
    ) -> Result<Vec<ArEntry>> {
        let path = path.as_ref();
        trace!(path = %path.display(), "reading ar archive");
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Self::read_from(BufReader::new(file), options)
    }

    /// Reads members until the stream ends or a header is cut short.
    ///
    /// A header whose end marker is not `` `\n `` aborts the whole read.
    pub fn read_from<R: Read>(mut reader: R, options: &ReadOptions) -> Result<Vec<ArEntry>> {
        let mut magic = [0u8; 8];
        let got = read_full(&mut reader, &mut magic)?;
        if got < magic.len() || &magic != AR_MAGIC {
            return Err(PackageError::invalid(FORMAT, "missing !<arch> magic"));
        }

        let mut entries = Vec::new();
        let mut header = [0u8; AR_HEADER_SIZE];

        loop {
            let got = read_full(&mut reader, &mut header)?;
            if got < AR_HEADER_SIZE {
                if got > 0 {
                    debug!(trailing = got, "ignoring incomplete ar header at end of archive");
                }
                break;
            }

            if &header[58..60] != AR_FMAG {
                return Err(PackageError::invalid(
                    FORMAT,
                    format!("bad header end marker after member {}", entries.len()),
                ));
            }

            let name = parse_name(&header[..16]);
            let size = parse_size(&header[48..58])?;
            if size > options.max_entry_size {
                return Err(PackageError::invalid(
                    FORMAT,
                    format!(
                        "member '{name}' is {size} bytes, above the {} byte limit",
                        options.max_entry_size
                    ),
                ));
            }

            let mut data = vec![0u8; size as usize];
            reader
                .read_exact(&mut data)
                .with_context(|| format!("reading ar member '{name}'"))?;

            if size % 2 == 1 {
                let mut pad = [0u8; 1];
                read_full(&mut reader, &mut pad)?;
            }

            trace!(member = %name, size, "read ar member");
            entries.push(ArEntry { name, size, data });
        }

        Ok(entries)
    }
}

fn parse_name(field: &[u8]) -> String {
    let name = String::from_utf8_lossy(field);
    let name = name.trim_end();
    // GNU ar terminates names with '/'
    match name.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() && !stripped.ends_with('/') => {
            stripped.to_string()
        }
        _ => name.to_string(),
    }
}

fn parse_size(field: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(field)
        .map_err(|_| PackageError::invalid(FORMAT, "member size is not ASCII"))?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| PackageError::invalid(FORMAT, format!("bad member size '{}'", text.trim())))
}

/// Fills `buf` as far as the stream allows and returns how many bytes were read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(PackageError::IoError {
                    action: "reading ar archive".into(),
                    source: err,
                })
            }
        }
    }
    Ok(filled)
}
