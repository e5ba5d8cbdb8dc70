//! Guesses a file extension from the leading bytes of a buffer.

/// Returns an extension (with the leading dot) for `data`.
///
/// Known magic numbers are checked first. Otherwise the first 64 bytes are scanned: if none
/// is NUL, below `0x09`, or in `0x0E..=0x1F`, the buffer is taken as text. Anything else is
/// `.bin`.
pub fn guess_file_extension(data: &[u8]) -> &'static str {
    if data.len() < 4 {
        return ".bin";
    }

    match data {
        [0x89, 0x50, 0x4E, 0x47, ..] if data.len() > 8 => return ".png",
        [0xFF, 0xD8, ..] => return ".jpg",
        [0x47, 0x49, 0x46, ..] => return ".gif",
        [0x42, 0x4D, ..] => return ".bmp",
        [0x25, 0x50, 0x44, 0x46, ..] => return ".pdf",
        [0x50, 0x4B, 0x03 | 0x05 | 0x07, 0x04 | 0x06 | 0x08, ..] => return ".zip",
        [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00 | 0x01, ..] if data.len() > 7 => return ".rar",
        [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, ..] => return ".7z",
        [0x49, 0x44, 0x33, ..] => return ".mp3",
        _ => {}
    }

    if data.len() > 11 {
        if &data[4..8] == b"ftyp" {
            return ".mp4";
        }
        if &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return ".webp";
        }
    }

    if looks_like_text(data) {
        ".txt"
    } else {
        ".bin"
    }
}

fn looks_like_text(data: &[u8]) -> bool {
    data.iter()
        .take(64)
        .all(|&b| b >= 0x09 && !(0x0E..=0x1F).contains(&b))
}
