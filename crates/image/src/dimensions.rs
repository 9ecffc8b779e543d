//! Width/height extraction from format headers.
//!
//! Only reads the fixed-offset header fields of each container; nothing here
//! decompresses pixel data. All reads are bounds-checked and simply yield
//! `None` on truncated or malformed input.

use crate::ImageFormat;

const JPEG_SOF_MARKERS: std::ops::RangeInclusive<u8> = 0xC0..=0xCF;
// DHT, JPG and DAC share the SOF marker range but carry no frame header.
const JPEG_NON_SOF: [u8; 3] = [0xC4, 0xC8, 0xCC];
const VP8_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];
const VP8L_SIGNATURE: u8 = 0x2F;

fn array<const N: usize>(bytes: &[u8], at: usize) -> Option<[u8; N]> {
    bytes.get(at..at.checked_add(N)?)?.try_into().ok()
}
fn be_u16(bytes: &[u8], at: usize) -> Option<u16> {
    array(bytes, at).map(u16::from_be_bytes)
}
fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    array(bytes, at).map(u16::from_le_bytes)
}
fn be_u32(bytes: &[u8], at: usize) -> Option<u32> {
    array(bytes, at).map(u32::from_be_bytes)
}
fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    array(bytes, at).map(u32::from_le_bytes)
}
fn le_i32(bytes: &[u8], at: usize) -> Option<i32> {
    array(bytes, at).map(i32::from_le_bytes)
}
fn le_u24(bytes: &[u8], at: usize) -> Option<u32> {
    let [a, b, c] = array::<3>(bytes, at)?;
    Some(u32::from_le_bytes([a, b, c, 0]))
}

impl ImageFormat {
    /// Parse `(width, height)` from the header of an encoded image.
    ///
    /// PNG, GIF, BMP and WebP only need their first 30 bytes; JPEG walks the
    /// marker segments until it finds a start-of-frame, so pass the whole
    /// file. HEIF/AVIF are located via their `ispe` property box. Returns
    /// `None` for SVG (which has no intrinsic pixel size) and for anything
    /// truncated or malformed.
    #[must_use]
    pub fn dimensions(&self, bytes: &[u8]) -> Option<(u32, u32)> {
        let (width, height) = match self {
            ImageFormat::Png => png(bytes)?,
            ImageFormat::Gif => (le_u16(bytes, 6)?.into(), le_u16(bytes, 8)?.into()),
            ImageFormat::Bmp => bmp(bytes)?,
            ImageFormat::WebP => webp(bytes)?,
            ImageFormat::Jpeg => jpeg(bytes)?,
            ImageFormat::Heif | ImageFormat::Avif => ispe(bytes)?,
            ImageFormat::Svg | ImageFormat::Unknown => return None,
        };
        (width > 0 && height > 0).then_some((width, height))
    }
}

fn png(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.get(12..16)? != b"IHDR" {
        return None;
    }
    Some((be_u32(bytes, 16)?, be_u32(bytes, 20)?))
}

fn bmp(bytes: &[u8]) -> Option<(u32, u32)> {
    match le_u32(bytes, 14)? {
        // OS/2 BITMAPCOREHEADER uses unsigned 16-bit dimensions.
        12 => Some((le_u16(bytes, 18)?.into(), le_u16(bytes, 20)?.into())),
        // Negative height means top-down row order, not a negative size.
        _ => Some((le_i32(bytes, 18)?.unsigned_abs(), le_i32(bytes, 22)?.unsigned_abs())),
    }
}

fn webp(bytes: &[u8]) -> Option<(u32, u32)> {
    match bytes.get(12..16)? {
        b"VP8 " => {
            if array::<3>(bytes, 23)? != VP8_START_CODE {
                return None;
            }
            Some(((le_u16(bytes, 26)? & 0x3FFF).into(), (le_u16(bytes, 28)? & 0x3FFF).into()))
        },
        b"VP8L" => {
            if *bytes.get(20)? != VP8L_SIGNATURE {
                return None;
            }
            let bits = le_u32(bytes, 21)?;
            Some(((bits & 0x3FFF) + 1, ((bits >> 14) & 0x3FFF) + 1))
        },
        b"VP8X" => Some((le_u24(bytes, 24)? + 1, le_u24(bytes, 27)? + 1)),
        _ => None,
    }
}

fn jpeg(bytes: &[u8]) -> Option<(u32, u32)> {
    let mut at = 2;
    loop {
        if *bytes.get(at)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(at + 1)?;
        match marker {
            // Fill byte before a marker.
            0xFF => at += 1,
            // Standalone markers without a length field.
            0x01 | 0xD0..=0xD9 => at += 2,
            m if JPEG_SOF_MARKERS.contains(&m) && !JPEG_NON_SOF.contains(&m) => {
                let height = be_u16(bytes, at + 5)?;
                let width = be_u16(bytes, at + 7)?;
                return Some((width.into(), height.into()));
            },
            _ => at += 2 + usize::from(be_u16(bytes, at + 2)?),
        }
    }
}

fn ispe(bytes: &[u8]) -> Option<(u32, u32)> {
    let at = bytes.windows(4).position(|w| w == b"ispe")?;
    // Box type, then a full-box version/flags word, then width and height.
    Some((be_u32(bytes, at + 8)?, be_u32(bytes, at + 12)?))
}

#[cfg(test)]
mod tests {
    use crate::ImageFormat;
    use rstest::rstest;

    fn png_header(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0]);
        bytes
    }

    fn jpeg_with_sof(width: u16, height: u16) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0 segment of length 16 that must be skipped.
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(&[0u8; 14]);
        // DHT shares the SOF range but must not be mistaken for it.
        bytes.extend_from_slice(&[0xFF, 0xC4, 0x00, 0x04, 0x00, 0x00]);
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&[0x03; 10]);
        bytes
    }

    #[test]
    fn test_png_dimensions() {
        assert_eq!(ImageFormat::Png.dimensions(&png_header(640, 480)), Some((640, 480)));
        assert_eq!(ImageFormat::Png.dimensions(&png_header(640, 480)[..20]), None);
    }

    #[test]
    fn test_jpeg_dimensions() {
        assert_eq!(ImageFormat::Jpeg.dimensions(&jpeg_with_sof(1920, 1080)), Some((1920, 1080)));
        // Truncated before the frame header.
        assert_eq!(ImageFormat::Jpeg.dimensions(&jpeg_with_sof(1920, 1080)[..22]), None);
    }

    #[rstest]
    #[case(ImageFormat::Gif, b"GIF89a\x20\x00\x10\x00\x00\x00\x00".to_vec(), Some((32, 16)))]
    #[case(ImageFormat::Gif, b"GIF89a\x00\x00\x10\x00".to_vec(), None)]
    #[case(ImageFormat::Svg, b"<svg width=\"10\" height=\"10\"/>".to_vec(), None)]
    #[case(ImageFormat::Unknown, vec![0; 64], None)]
    fn test_simple_dimensions(#[case] format: ImageFormat, #[case] bytes: Vec<u8>, #[case] expected: Option<(u32, u32)>) {
        assert_eq!(format.dimensions(&bytes), expected);
    }

    #[test]
    fn test_bmp_dimensions_top_down() {
        let mut bytes = b"BM".to_vec();
        bytes.extend_from_slice(&[0; 12]);
        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(&(-2i32).to_le_bytes());
        assert_eq!(ImageFormat::Bmp.dimensions(&bytes), Some((3, 2)));
    }

    #[test]
    fn test_webp_dimensions() {
        let mut lossy = b"RIFF\x00\x00\x00\x00WEBPVP8 \x00\x00\x00\x00".to_vec();
        lossy.extend_from_slice(&[0x00, 0x00, 0x00, 0x9D, 0x01, 0x2A]);
        lossy.extend_from_slice(&100u16.to_le_bytes());
        lossy.extend_from_slice(&50u16.to_le_bytes());
        assert_eq!(ImageFormat::WebP.dimensions(&lossy), Some((100, 50)));

        let mut extended = b"RIFF\x00\x00\x00\x00WEBPVP8X\x0A\x00\x00\x00".to_vec();
        extended.extend_from_slice(&[0x10, 0x00, 0x00, 0x00]);
        extended.extend_from_slice(&[0xFF, 0x01, 0x00]);
        extended.extend_from_slice(&[0x7F, 0x00, 0x00]);
        assert_eq!(ImageFormat::WebP.dimensions(&extended), Some((512, 128)));
    }

    #[test]
    fn test_avif_dimensions() {
        let mut bytes = b"\x00\x00\x00\x1cftypavif".to_vec();
        bytes.extend_from_slice(&[0; 16]);
        bytes.extend_from_slice(b"\x00\x00\x00\x14ispe\x00\x00\x00\x00");
        bytes.extend_from_slice(&300u32.to_be_bytes());
        bytes.extend_from_slice(&200u32.to_be_bytes());
        assert_eq!(ImageFormat::Avif.dimensions(&bytes), Some((300, 200)));
    }
}
