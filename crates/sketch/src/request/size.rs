use async_trait::async_trait;
use derive_more::Display;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

/// Target dimensions in pixels.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("{width}x{height}")]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl FromStr for Size {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `300x200`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(|| format!("expected WxH, got {s:?}"))?;
        let width = width.parse().map_err(|_| format!("invalid width in {s:?}"))?;
        let height = height.parse().map_err(|_| format!("invalid height in {s:?}"))?;
        let size = Size::new(width, height);
        if size.is_empty() {
            return Err(format!("size must not be empty, got {s:?}"));
        }
        Ok(size)
    }
}

/// Supplies the target size once the caller knows it, e.g. after a view has
/// been measured.
#[async_trait]
pub trait SizeResolver: Send + Sync {
    async fn size(&self) -> Size;
}

/// How the target size of a request is determined.
#[derive(Clone, Default)]
pub enum SizeSpec {
    /// Decode at the image's own dimensions.
    #[default]
    Original,
    Fixed(Size),
    /// Resolved asynchronously, once per execution.
    Resolver(Arc<dyn SizeResolver>),
}

impl SizeSpec {
    /// `None` means original size.
    pub async fn resolve(&self) -> Option<Size> {
        match self {
            SizeSpec::Original => None,
            SizeSpec::Fixed(size) => Some(*size),
            SizeSpec::Resolver(resolver) => {
                let size = resolver.size().await;
                (!size.is_empty()).then_some(size)
            },
        }
    }
}

impl Debug for SizeSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SizeSpec::Original => f.write_str("Original"),
            SizeSpec::Fixed(size) => write!(f, "Fixed({size})"),
            SizeSpec::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<Size> for SizeSpec {
    fn from(size: Size) -> Self {
        SizeSpec::Fixed(size)
    }
}

/// How closely the decoded dimensions must follow the target size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Use as few pixels as possible without going above the target pixel
    /// count.
    #[default]
    LessPixels,
    /// Keep the aspect ratio of the target size; never sample below it.
    SameAspectRatio,
    /// Never sample below the target size on either axis.
    Exactly,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::LessPixels => "LESS_PIXELS",
            Precision::SameAspectRatio => "SAME_ASPECT_RATIO",
            Precision::Exactly => "EXACTLY",
        }
    }
}

/// Which part of the image to keep when the target crops it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scale {
    Start,
    #[default]
    Center,
    End,
    Fill,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::Start => "START",
            Scale::Center => "CENTER",
            Scale::End => "END",
            Scale::Fill => "FILL",
        }
    }
}
