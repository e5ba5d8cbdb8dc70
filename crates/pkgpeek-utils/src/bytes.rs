use crate::error::{BytesError, BytesResult};

const BINARY_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Formats a byte count using binary units.
///
/// # Example
///
/// ```
/// use pkgpeek_utils::bytes::format_bytes;
///
/// assert_eq!(format_bytes(1536, 2), "1.50 KiB");
/// ```
pub fn format_bytes(bytes: u64, precision: usize) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;

    while value >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{value:.precision$} {}", BINARY_UNITS[unit])
}

/// Parses a human-readable size such as `256 MiB`, `1.5KB` or `4096` into bytes.
///
/// Binary suffixes (`KiB`, `MiB`, ...) scale by 1024, decimal suffixes (`KB`, `MB`, ...) by
/// 1000. A bare number is taken as a byte count.
///
/// # Errors
///
/// * [`BytesError::ParseFailed`] if the number or the unit cannot be understood.
///
/// # Example
///
/// ```
/// use pkgpeek_utils::bytes::parse_bytes;
///
/// assert_eq!(parse_bytes("256 MiB").unwrap(), 256 * 1024 * 1024);
/// ```
pub fn parse_bytes(s: &str) -> BytesResult<u64> {
    let input = s.trim();
    let fail = |reason: &str| {
        BytesError::ParseFailed {
            input: s.to_string(),
            reason: reason.to_string(),
        }
    };

    if let Ok(v) = input.parse::<u64>() {
        return Ok(v);
    }

    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| fail("Missing unit"))?;
    let (number, unit) = input.split_at(split);

    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| fail("Invalid number"))?;
    if number.is_sign_negative() {
        return Err(fail("Negative size"));
    }

    let unit = unit.trim().to_ascii_uppercase();
    let (prefix, base) = if let Some(prefix) = unit.strip_suffix("IB") {
        (prefix, 1024f64)
    } else if let Some(prefix) = unit.strip_suffix('B') {
        (prefix, 1000f64)
    } else {
        return Err(fail("Invalid suffix"));
    };

    let exponent = match prefix {
        "" => 0,
        p if p.len() == 1 => {
            let c = p.chars().next().unwrap_or_default();
            match PREFIXES.iter().position(|&x| x == c) {
                Some(idx) => idx as i32 + 1,
                None => return Err(fail("Unrecognized size format")),
            }
        }
        _ => return Err(fail("Unrecognized size format")),
    };

    Ok((number * base.powi(exponent)).round() as u64)
}
