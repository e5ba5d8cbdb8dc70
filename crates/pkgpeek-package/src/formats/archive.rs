//! Helpers for ZIP based packages (appx, msix, ipa).

use std::io::{Read, Seek};

use pkgpeek_utils::string::decode_uri;
use zip::{result::ZipError, ZipArchive};

use crate::error::{ErrorContext, PackageError, Result};

/// Reads a whole member into memory.
///
/// # Errors
///
/// * [`PackageError::MissingMember`] if there is no member with that name
/// * [`PackageError::InvalidFormat`] if the member is larger than `limit`
pub(crate) fn read_zip_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    format: &'static str,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Err(PackageError::missing(format, name)),
        Err(err) => return Err(err.into()),
    };

    if file.size() > limit {
        return Err(PackageError::invalid(
            format,
            format!("'{name}' is {} bytes, above the {limit} byte limit", file.size()),
        ));
    }

    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)
        .with_context(|| format!("reading '{name}'"))?;
    Ok(data)
}

/// Reads a member as UTF-8 text, dropping a leading byte order mark.
pub(crate) fn read_zip_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    format: &'static str,
    name: &str,
    limit: u64,
) -> Result<String> {
    let data = read_zip_entry(archive, format, name, limit)?;
    let text = String::from_utf8(data)
        .map_err(|_| PackageError::invalid(format, format!("'{name}' is not UTF-8")))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Member names paired with their percent-decoded form, sorted by stored name.
pub(crate) fn decoded_names<R: Read + Seek>(archive: &ZipArchive<R>) -> Vec<(String, String)> {
    let mut names: Vec<_> = archive
        .file_names()
        .map(|name| (name.to_string(), decode_uri(name)))
        .collect();
    names.sort();
    names
}
