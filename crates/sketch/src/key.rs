//! Cache key derivation.
//!
//! A cache key is a pure function of the normalized URI and every request
//! parameter that changes the decoded pixels. Parameters that only affect
//! presentation (crossfade, listeners, lifecycle) never take part.

use crate::request::{Request, Size};

/// The lowercased scheme of `uri`, if it has one.
///
/// Single letter schemes are treated as Windows drive letters, not schemes.
pub(crate) fn scheme(uri: &str) -> Option<String> {
    let (scheme, _) = uri.trim().split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && scheme.len() > 1;
    valid.then(|| scheme.to_ascii_lowercase())
}

/// Trim surrounding whitespace and lowercase the scheme.
pub fn normalize_uri(uri: &str) -> String {
    let uri = uri.trim();
    match scheme(uri) {
        Some(scheme) => format!("{scheme}{}", &uri[scheme.len()..]),
        None => uri.to_string(),
    }
}

/// Key under which raw downloaded bytes are stored.
pub fn download_cache_key(request: &Request) -> String {
    normalize_uri(request.uri())
}

/// Key for the decoded (and transformed) result of `request` at the resolved
/// `size`, where `None` means original size. Used for the memory cache, the
/// result cache and in-flight deduplication.
///
/// ```
/// use sketch::key::cache_key;
/// use sketch::request::{Request, Size};
///
/// let request = Request::new(" HTTPS://example.com/a.jpg");
/// assert_eq!(
///     cache_key(&request, Some(Size::new(100, 100))),
///     "https://example.com/a.jpg?_size=100x100&_precision=LESS_PIXELS&_scale=CENTER",
/// );
/// ```
pub fn cache_key(request: &Request, size: Option<Size>) -> String {
    let mut key = normalize_uri(request.uri());
    let mut separator = if key.contains('?') { '&' } else { '?' };
    let mut push = |name: &str, value: &str| {
        key.push(separator);
        key.push_str(name);
        key.push('=');
        key.push_str(value);
        separator = '&';
    };
    match size {
        Some(size) => {
            push("_size", &size.to_string());
            push("_precision", request.precision().as_str());
            push("_scale", request.scale().as_str());
        },
        None => push("_size", "Original"),
    }
    if !request.transformations().is_empty() {
        let keys: Vec<String> = request.transformations().iter().map(|t| t.key()).collect();
        push("_transformations", &format!("[{}]", keys.join(",")));
    }
    if let Some(config) = request.bitmap_config() {
        push("_bitmapConfig", config.as_str());
    }
    if let Some(color_space) = request.color_space() {
        push("_colorSpace", color_space.as_str());
    }
    key
}

/// Key for in-flight deduplication: the cache key plus the request
/// parameters that change how an execution runs without changing its
/// pixels. Callers only share an execution whose outcome would have been
/// theirs had they run alone.
pub(crate) fn execution_key(request: &Request, cache_key: &str) -> String {
    let timeout = request.timeout().map_or_else(|| "default".to_string(), |t| t.as_millis().to_string());
    format!(
        "{cache_key}#depth={}&memory={:?}&result={:?}&download={:?}&timeout={timeout}&pause={}",
        request.depth(),
        request.memory_cache_policy(),
        request.result_cache_policy(),
        request.download_cache_policy(),
        request.pause_when_paused(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{CachePolicy, Depth, Precision, Scale};
    use crate::transform::RotateTransformation;
    use rstest::rstest;
    use sketch_image::{BitmapConfig, ColorSpace};
    use std::time::Duration;

    #[rstest]
    #[case("  HTTPS://Example.com/A.jpg ", "https://Example.com/A.jpg")]
    #[case("File:///tmp/a.png", "file:///tmp/a.png")]
    #[case("/tmp/a.png", "/tmp/a.png")]
    #[case("C:/images/a.png", "C:/images/a.png")]
    fn test_normalize(#[case] uri: &str, #[case] expected: &str) {
        assert_eq!(normalize_uri(uri), expected);
    }

    #[test]
    fn test_independent_requests_share_key() {
        let a = Request::builder("https://x/img.jpg")
            .transformation(RotateTransformation::new(90).unwrap())
            .bitmap_config(BitmapConfig::Rgb565)
            .crossfade(Duration::from_millis(200))
            .build();
        let b = Request::builder("https://x/img.jpg ")
            .bitmap_config(BitmapConfig::Rgb565)
            .transformation(RotateTransformation::new(-270).unwrap())
            .build();
        let size = Some(Size::new(100, 100));
        assert_eq!(cache_key(&a, size), cache_key(&b, size));
    }

    #[test]
    fn test_full_key() {
        let request = Request::builder("https://x/img.jpg?w=1")
            .precision(Precision::Exactly)
            .scale(Scale::Fill)
            .transformation(RotateTransformation::new(180).unwrap())
            .bitmap_config(BitmapConfig::Rgb565)
            .color_space(ColorSpace::DisplayP3)
            .build();
        assert_eq!(
            cache_key(&request, Some(Size::new(20, 10))),
            "https://x/img.jpg?w=1&_size=20x10&_precision=EXACTLY&_scale=FILL\
             &_transformations=[Rotate(180)]&_bitmapConfig=RGB_565&_colorSpace=DISPLAY_P3",
        );
        assert_eq!(
            cache_key(&request, None),
            "https://x/img.jpg?w=1&_size=Original&_transformations=[Rotate(180)]\
             &_bitmapConfig=RGB_565&_colorSpace=DISPLAY_P3",
        );
    }

    #[rstest]
    #[case(Request::builder("https://x/a.jpg").precision(Precision::Exactly).build())]
    #[case(Request::builder("https://x/a.jpg").scale(Scale::Start).build())]
    #[case(Request::builder("https://x/a.jpg").bitmap_config(BitmapConfig::Rgba8888).build())]
    #[case(Request::builder("https://x/b.jpg").build())]
    fn test_pixel_affecting_parameters_change_key(#[case] other: Request) {
        let base = Request::new("https://x/a.jpg");
        let size = Some(Size::new(50, 50));
        assert_ne!(cache_key(&base, size), cache_key(&other, size));
    }

    #[rstest]
    #[case(Request::builder("https://x/a.jpg").depth(Depth::Local).build())]
    #[case(Request::builder("https://x/a.jpg").timeout(Duration::from_secs(1)).build())]
    #[case(Request::builder("https://x/a.jpg").download_cache_policy(CachePolicy::ReadOnly).build())]
    #[case(Request::builder("https://x/a.jpg").result_cache_policy(CachePolicy::Disabled).build())]
    #[case(Request::builder("https://x/a.jpg").memory_cache_policy(CachePolicy::WriteOnly).build())]
    #[case(Request::builder("https://x/a.jpg").pause_when_paused(true).build())]
    fn test_execution_parameters_split_executions(#[case] other: Request) {
        let base = Request::new("https://x/a.jpg");
        let size = Some(Size::new(50, 50));
        assert_eq!(cache_key(&base, size), cache_key(&other, size));
        assert_ne!(
            execution_key(&base, &cache_key(&base, size)),
            execution_key(&other, &cache_key(&other, size)),
        );
    }

    #[test]
    fn test_listeners_share_execution() {
        let base = Request::new("https://x/a.jpg");
        let other = Request::builder("https://x/a.jpg").crossfade(Duration::from_millis(100)).build();
        assert_eq!(execution_key(&base, &cache_key(&base, None)), execution_key(&other, &cache_key(&other, None)));
    }

    #[test]
    fn test_download_key_ignores_options() {
        let request = Request::builder(" HTTP://x/a.jpg").size(Size::new(1, 1)).build();
        assert_eq!(download_cache_key(&request), "http://x/a.jpg");
    }
}
