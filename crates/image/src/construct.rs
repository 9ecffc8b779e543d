use crate::ImageFormat;
use crate::error::{Error, ErrorKind};
use std::{path::Path, str::FromStr};

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87A_MAGIC: [u8; 6] = *b"GIF87a";
const GIF89A_MAGIC: [u8; 6] = *b"GIF89a";
const RIFF_MAGIC: [u8; 4] = *b"RIFF";
const WEBP_MAGIC: [u8; 4] = *b"WEBP";
const BMP_MAGIC: [u8; 2] = *b"BM";
const FTYP_MAGIC: [u8; 4] = *b"ftyp";
const HEIF_BRANDS: [[u8; 4]; 6] = [*b"heic", *b"heix", *b"hevc", *b"hevx", *b"mif1", *b"msf1"];
const AVIF_BRANDS: [[u8; 4]; 2] = [*b"avif", *b"avis"];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

impl FromStr for ImageFormat {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains('/') {
            return match ImageFormat::from_mime_type(s) {
                ImageFormat::Unknown => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
                format => Ok(format),
            };
        }
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "png" => Ok(ImageFormat::Png),
            "gif" => Ok(ImageFormat::Gif),
            "webp" => Ok(ImageFormat::WebP),
            "bmp" => Ok(ImageFormat::Bmp),
            "heic" | "heif" => Ok(ImageFormat::Heif),
            "avif" => Ok(ImageFormat::Avif),
            "svg" => Ok(ImageFormat::Svg),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}
impl From<&[u8]> for ImageFormat {
    fn from(value: &[u8]) -> Self {
        ImageFormat::from_magic_bytes(value)
    }
}
impl ImageFormat {
    /// Detect the format from a file extension.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or(ImageFormat::Unknown)
    }

    /// Detect the format from a declared MIME type. Parameters after `;` are
    /// ignored.
    ///
    /// Transports mislabel content often enough that this should only ever be
    /// a hint; prefer [`from_magic_bytes`](Self::from_magic_bytes).
    #[must_use]
    pub fn from_mime_type(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => ImageFormat::Jpeg,
            "image/png" | "image/x-png" => ImageFormat::Png,
            "image/gif" => ImageFormat::Gif,
            "image/webp" => ImageFormat::WebP,
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => ImageFormat::Bmp,
            "image/heic" | "image/heif" => ImageFormat::Heif,
            "image/avif" => ImageFormat::Avif,
            "image/svg+xml" => ImageFormat::Svg,
            _ => ImageFormat::Unknown,
        }
    }

    /// Detect the format from magic bytes.
    ///
    /// Returns [`Unknown`](Self::Unknown) if no signature matches or if the
    /// input is too short to detect any format. Pass at least
    /// [`SNIFF_LEN`](crate::SNIFF_LEN) bytes when available so that SVG
    /// documents with a long prolog are still recognised.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&JPEG_MAGIC) {
            return ImageFormat::Jpeg;
        }
        if bytes.starts_with(&PNG_MAGIC) {
            return ImageFormat::Png;
        }
        if bytes.starts_with(&GIF87A_MAGIC) || bytes.starts_with(&GIF89A_MAGIC) {
            return ImageFormat::Gif;
        }
        if bytes.starts_with(&RIFF_MAGIC) && bytes.get(8..12) == Some(&WEBP_MAGIC[..]) {
            return ImageFormat::WebP;
        }
        if bytes.starts_with(&BMP_MAGIC) && bytes.len() >= 14 {
            return ImageFormat::Bmp;
        }
        // ISO base media files: a box size, then `ftyp`, then the major brand.
        if bytes.get(4..8) == Some(&FTYP_MAGIC[..])
            && let Some(brand) = bytes.get(8..12)
        {
            if AVIF_BRANDS.iter().any(|b| b[..] == *brand) {
                return ImageFormat::Avif;
            }
            if HEIF_BRANDS.iter().any(|b| b[..] == *brand) {
                return ImageFormat::Heif;
            }
        }
        if Self::looks_like_svg(bytes) {
            return ImageFormat::Svg;
        }
        ImageFormat::Unknown
    }

    fn looks_like_svg(bytes: &[u8]) -> bool {
        let bytes = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
        let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
        let bytes = &bytes[start..];
        if bytes.starts_with(b"<svg") {
            return true;
        }
        // An XML prolog, DOCTYPE or leading comment: the root element has to
        // turn up somewhere within the sniffed window.
        (bytes.starts_with(b"<?xml") || bytes.starts_with(b"<!")) && bytes.windows(4).any(|w| w == b"<svg")
    }
}

#[cfg(test)]
mod tests {
    use crate::ImageFormat;
    use rstest::rstest;

    #[rstest]
    #[case("jpg", ImageFormat::Jpeg)]
    #[case("JPEG", ImageFormat::Jpeg)]
    #[case(".png", ImageFormat::Png)]
    #[case("gif", ImageFormat::Gif)]
    #[case("webp", ImageFormat::WebP)]
    #[case("bmp", ImageFormat::Bmp)]
    #[case("heic", ImageFormat::Heif)]
    #[case("avif", ImageFormat::Avif)]
    #[case("svg", ImageFormat::Svg)]
    #[case("image/png", ImageFormat::Png)]
    #[case("image/svg+xml; charset=utf-8", ImageFormat::Svg)]
    fn test_from_str(#[case] test: &str, #[case] expected: ImageFormat) {
        assert_eq!(test.parse::<ImageFormat>().unwrap(), expected);
    }

    #[rstest]
    #[case("tiff")]
    #[case("text/html")]
    #[case(" ")]
    fn test_from_str_invalid(#[case] test: &str) {
        assert!(test.parse::<ImageFormat>().is_err());
    }

    #[rstest]
    #[case("photo.jpg", ImageFormat::Jpeg)]
    #[case("photo.JPG", ImageFormat::Jpeg)]
    #[case("/a/b/icon.png", ImageFormat::Png)]
    #[case("notes.txt", ImageFormat::Unknown)]
    // Dotfiles have no extension.
    #[case(".png", ImageFormat::Unknown)]
    #[case("no-extension", ImageFormat::Unknown)]
    fn test_from_path(#[case] test: &str, #[case] expected: ImageFormat) {
        assert_eq!(ImageFormat::from_path(test), expected);
    }

    #[rstest]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0], ImageFormat::Jpeg)]
    #[case(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], ImageFormat::Png)]
    #[case(b"GIF89a\x01\x00\x01\x00", ImageFormat::Gif)]
    #[case(b"GIF87a\x01\x00\x01\x00", ImageFormat::Gif)]
    #[case(b"RIFF\x24\x00\x00\x00WEBPVP8 ", ImageFormat::WebP)]
    #[case(b"RIFF\x24\x00\x00\x00WAVEfmt ", ImageFormat::Unknown)]
    #[case(b"BM\x00\x00\x00\x00\x00\x00\x00\x00\x36\x00\x00\x00", ImageFormat::Bmp)]
    #[case(b"BM", ImageFormat::Unknown)]
    #[case(b"\x00\x00\x00\x1cftypavif\x00\x00\x00\x00", ImageFormat::Avif)]
    #[case(b"\x00\x00\x00\x18ftypheic\x00\x00\x00\x00", ImageFormat::Heif)]
    #[case(b"\x00\x00\x00\x18ftypisom\x00\x00\x00\x00", ImageFormat::Unknown)]
    #[case(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>", ImageFormat::Svg)]
    #[case(b"\xEF\xBB\xBF  <?xml version=\"1.0\"?>\n<!-- hi -->\n<svg/>", ImageFormat::Svg)]
    #[case(b"<?xml version=\"1.0\"?><rss/>", ImageFormat::Unknown)]
    #[case(b"<!DOCTYPE html>", ImageFormat::Unknown)]
    #[case(b"", ImageFormat::Unknown)]
    fn test_from_magic_bytes(#[case] bytes: &[u8], #[case] expected: ImageFormat) {
        assert_eq!(ImageFormat::from_magic_bytes(bytes), expected);
        assert_eq!(<&[u8] as Into<ImageFormat>>::into(bytes), expected);
    }
}
