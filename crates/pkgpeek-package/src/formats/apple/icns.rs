//! Apple icon containers (`.icns`).
//!
//! A file is `"icns"` + a big-endian length, followed by elements of
//! `OSType | u32 length (header included) | payload`. Modern elements carry PNG (or JPEG
//! 2000, which is skipped); older ones use a per-channel run-length encoding with a separate
//! 8-bit alpha mask.

use image::{ImageFormat, RgbaImage};
use tracing::{debug, trace};

use crate::error::{PackageError, Result};

const FORMAT: &str = "icns";
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A raw element of an icon family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcnsElement<'a> {
    pub os_type: [u8; 4],
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// PNG or JPEG 2000 payload.
    Compressed,
    /// RLE RGB planes, optionally after a few bytes of padding.
    Rgb { skip: usize, mask: [u8; 4] },
    /// `ARGB` followed by RLE A, R, G and B planes.
    Argb,
}

fn describe(os_type: &[u8; 4]) -> Option<(u32, Encoding)> {
    let rgb = |mask: &[u8; 4], skip| Encoding::Rgb { skip, mask: *mask };
    Some(match os_type {
        b"icp4" => (16, Encoding::Compressed),
        b"icp5" | b"ic11" => (32, Encoding::Compressed),
        b"icp6" | b"ic12" => (64, Encoding::Compressed),
        b"ic07" => (128, Encoding::Compressed),
        b"ic08" | b"ic13" => (256, Encoding::Compressed),
        b"ic09" | b"ic14" => (512, Encoding::Compressed),
        b"ic10" => (1024, Encoding::Compressed),
        b"is32" => (16, rgb(b"s8mk", 0)),
        b"il32" => (32, rgb(b"l8mk", 0)),
        b"ih32" => (48, rgb(b"h8mk", 0)),
        b"it32" => (128, rgb(b"t8mk", 4)),
        b"ic04" => (16, Encoding::Argb),
        b"ic05" => (32, Encoding::Argb),
        _ => return None,
    })
}

/// Splits an icon family into its elements.
///
/// Iteration stops at the first element whose length is impossible.
pub fn icns_elements(data: &[u8]) -> Result<Vec<IcnsElement<'_>>> {
    if data.len() < 8 || &data[..4] != b"icns" {
        return Err(PackageError::invalid(FORMAT, "missing icns header"));
    }

    let declared = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let end = declared.min(data.len());

    let mut elements = Vec::new();
    let mut pos = 8;
    while pos + 8 <= end {
        let os_type = [data[pos], data[pos + 1], data[pos + 2], data[pos + 3]];
        let len = u32::from_be_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        if len < 8 || pos + len > end {
            debug!(
                os_type = %String::from_utf8_lossy(&os_type),
                len,
                "stopping at malformed icns element"
            );
            break;
        }

        elements.push(IcnsElement {
            os_type,
            data: &data[pos + 8..pos + len],
        });
        pos += len;
    }

    Ok(elements)
}

/// Decodes the widest bitmap an icon family holds.
///
/// Elements are ranked by the width they decode to, since a slot's payload need not match
/// the size its type nominally holds.
///
/// # Errors
///
/// * [`PackageError::InvalidFormat`] when the header is wrong or no element decodes
pub fn decode_icns(data: &[u8]) -> Result<RgbaImage> {
    let elements = icns_elements(data)?;

    let mut best: Option<RgbaImage> = None;
    for element in &elements {
        let Some((width, encoding)) = describe(&element.os_type) else {
            continue;
        };
        let decoded = match encoding {
            Encoding::Compressed => decode_compressed(element.data),
            Encoding::Rgb { skip, mask } => {
                let mask = elements
                    .iter()
                    .find(|e| e.os_type == mask)
                    .map(|e| e.data);
                decode_rgb(element.data.get(skip..).unwrap_or_default(), mask, width)
            }
            Encoding::Argb => decode_argb(element.data, width),
        };

        match decoded {
            Ok(image) => {
                trace!(
                    os_type = %String::from_utf8_lossy(&element.os_type),
                    width = image.width(),
                    "decoded icns element"
                );
                if best.as_ref().map_or(true, |b| image.width() > b.width()) {
                    best = Some(image);
                }
            }
            Err(err) => {
                debug!(
                    os_type = %String::from_utf8_lossy(&element.os_type),
                    "skipping icns element: {err}"
                );
            }
        }
    }

    best.ok_or_else(|| PackageError::invalid(FORMAT, "no decodable image element"))
}

fn decode_compressed(data: &[u8]) -> Result<RgbaImage> {
    if data.starts_with(PNG_SIGNATURE) {
        return Ok(image::load_from_memory_with_format(data, ImageFormat::Png)?.to_rgba8());
    }
    if data.starts_with(b"ARGB") {
        return Err(PackageError::Unsupported(
            "ARGB payload in a PNG slot".into(),
        ));
    }
    Err(PackageError::Unsupported("JPEG 2000 icon payload".into()))
}

/// Expands the icon RLE until `expected` bytes have been produced.
///
/// A control byte below `0x80` copies the next `n + 1` bytes; otherwise the next byte is
/// repeated `n - 125` times.
pub fn unpack_rle(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;

    while out.len() < expected {
        let Some(&control) = data.get(pos) else {
            return Err(PackageError::invalid(FORMAT, "run-length data ends early"));
        };
        pos += 1;

        if control < 0x80 {
            let count = control as usize + 1;
            let literal = data
                .get(pos..pos + count)
                .ok_or_else(|| PackageError::invalid(FORMAT, "literal run past end"))?;
            out.extend_from_slice(literal);
            pos += count;
        } else {
            let count = control as usize - 125;
            let value = *data
                .get(pos)
                .ok_or_else(|| PackageError::invalid(FORMAT, "repeat run past end"))?;
            out.resize(out.len() + count, value);
            pos += 1;
        }
    }

    out.truncate(expected);
    Ok(out)
}

fn interleave(width: u32, planes: &[&[u8]; 4]) -> Result<RgbaImage> {
    let pixels = (width * width) as usize;
    let mut rgba = Vec::with_capacity(pixels * 4);
    for i in 0..pixels {
        rgba.extend([planes[0][i], planes[1][i], planes[2][i], planes[3][i]]);
    }
    RgbaImage::from_raw(width, width, rgba)
        .ok_or_else(|| PackageError::invalid(FORMAT, "pixel buffer size mismatch"))
}

fn decode_rgb(data: &[u8], mask: Option<&[u8]>, width: u32) -> Result<RgbaImage> {
    let pixels = (width * width) as usize;
    let rgb = if data.len() == pixels * 4 {
        // uncompressed 0RGB
        let mut planes = vec![0u8; pixels * 3];
        for (i, px) in data.chunks_exact(4).enumerate() {
            planes[i] = px[1];
            planes[pixels + i] = px[2];
            planes[2 * pixels + i] = px[3];
        }
        planes
    } else {
        unpack_rle(data, pixels * 3)?
    };

    let opaque = vec![0xFF; pixels];
    let alpha = match mask {
        Some(mask) if mask.len() >= pixels => &mask[..pixels],
        _ => opaque.as_slice(),
    };

    interleave(
        width,
        &[
            &rgb[..pixels],
            &rgb[pixels..2 * pixels],
            &rgb[2 * pixels..],
            alpha,
        ],
    )
}

fn decode_argb(data: &[u8], width: u32) -> Result<RgbaImage> {
    let payload = data
        .strip_prefix(b"ARGB")
        .ok_or_else(|| PackageError::invalid(FORMAT, "ARGB element without ARGB tag"))?;
    let pixels = (width * width) as usize;
    let argb = unpack_rle(payload, pixels * 4)?;

    interleave(
        width,
        &[
            &argb[pixels..2 * pixels],
            &argb[2 * pixels..3 * pixels],
            &argb[3 * pixels..],
            &argb[..pixels],
        ],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Cursor;

    use image::Rgba;

    use super::*;

    pub(crate) fn png_bytes(width: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, width, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Encodes `value` repeated `count` times as repeat runs.
    fn rle_fill(value: u8, mut count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while count > 0 {
            let run = count.min(130);
            if run >= 3 {
                out.extend([(run + 125) as u8, value]);
            } else {
                out.push(run as u8 - 1);
                out.extend(std::iter::repeat(value).take(run));
            }
            count -= run;
        }
        out
    }

    pub(crate) fn build_icns(elements: &[(&[u8; 4], Vec<u8>)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (os_type, data) in elements {
            body.extend_from_slice(*os_type);
            body.extend_from_slice(&(data.len() as u32 + 8).to_be_bytes());
            body.extend_from_slice(data);
        }
        let mut out = b"icns".to_vec();
        out.extend_from_slice(&(body.len() as u32 + 8).to_be_bytes());
        out.extend(body);
        out
    }

    fn rgb_element(width: usize, rgb: [u8; 3]) -> Vec<u8> {
        let pixels = width * width;
        let mut data = Vec::new();
        for channel in rgb {
            data.extend(rle_fill(channel, pixels));
        }
        data
    }

    #[test]
    fn test_unpack_rle() {
        // literal "abc", then 'z' four times
        let data = [0x02, b'a', b'b', b'c', 0x81, b'z'];
        assert_eq!(unpack_rle(&data, 7).unwrap(), b"abczzzz");
        assert!(unpack_rle(&data, 8).is_err());
    }

    #[test]
    fn test_picks_widest_element() {
        let icns = build_icns(&[
            (b"is32", rgb_element(16, [1, 2, 3])),
            (b"s8mk", vec![0x80; 256]),
            (b"ic07", png_bytes(128, [9, 9, 9, 255])),
            (b"il32", rgb_element(32, [4, 5, 6])),
        ]);

        let image = decode_icns(&icns).unwrap();
        assert_eq!(image.width(), 128);
        assert_eq!(image.get_pixel(0, 0), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn test_ranks_by_decoded_width() {
        let icns = build_icns(&[
            (b"ic07", png_bytes(16, [1, 1, 1, 255])),
            (b"icp4", png_bytes(32, [2, 2, 2, 255])),
        ]);

        let image = decode_icns(&icns).unwrap();
        assert_eq!(image.width(), 32);
        assert_eq!(image.get_pixel(0, 0), &Rgba([2, 2, 2, 255]));
    }

    #[test]
    fn test_rle_with_mask() {
        let icns = build_icns(&[
            (b"is32", rgb_element(16, [10, 20, 30])),
            (b"s8mk", vec![0x40; 256]),
        ]);

        let image = decode_icns(&icns).unwrap();
        assert_eq!(image.dimensions(), (16, 16));
        assert_eq!(image.get_pixel(15, 15), &Rgba([10, 20, 30, 0x40]));
    }

    #[test]
    fn test_rle_without_mask_is_opaque() {
        let mut it32 = vec![0, 0, 0, 0];
        it32.extend(rgb_element(128, [7, 8, 9]));
        let icns = build_icns(&[(b"it32", it32)]);

        let image = decode_icns(&icns).unwrap();
        assert_eq!(image.width(), 128);
        assert_eq!(image.get_pixel(3, 100), &Rgba([7, 8, 9, 255]));
    }

    #[test]
    fn test_argb_element() {
        let mut data = b"ARGB".to_vec();
        for channel in [200u8, 1, 2, 3] {
            data.extend(rle_fill(channel, 256));
        }
        let image = decode_icns(&build_icns(&[(b"ic04", data)])).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgba([1, 2, 3, 200]));
    }

    #[test]
    fn test_broken_wide_element_falls_back() {
        let icns = build_icns(&[
            (b"ic08", vec![0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ']),
            (b"icp4", png_bytes(16, [1, 1, 1, 255])),
        ]);
        assert_eq!(decode_icns(&icns).unwrap().width(), 16);
    }

    #[test]
    fn test_rejects_non_icns() {
        assert!(decode_icns(b"not an icon").is_err());
        assert!(decode_icns(&build_icns(&[(b"TOC ", vec![1, 2, 3])])).is_err());
    }

    #[test]
    fn test_truncated_element_stops_listing() {
        let mut icns = build_icns(&[(b"icp4", png_bytes(16, [0, 0, 0, 255]))]);
        icns.extend_from_slice(b"ic07\x00\x00\xFF\xFF");
        let len = icns.len() as u32;
        icns[4..8].copy_from_slice(&len.to_be_bytes());

        assert_eq!(icns_elements(&icns).unwrap().len(), 1);
    }
}
