//! Core types for Pokecast

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest image the social protocol accepts, in bytes
pub const MAX_BLOB_SIZE: usize = 1_000_000;

/// Identifier of one publishable species, drawn from `[1, N]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(u32);

impl CandidateId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CandidateId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

/// One base stat as reported by the data API (e.g. `special-attack`, 65)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStat {
    pub name: String,
    pub value: u32,
}

/// Species metadata needed to compose a post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub name: String,
    /// Type names in slot order
    pub types: Vec<String>,
    /// Base stats in response order
    pub stats: Vec<BaseStat>,
    pub sprite_url: Option<String>,
}

impl SpeciesRecord {
    /// True when nothing at all was populated from the response
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.types.is_empty()
            && self.stats.is_empty()
            && self.sprite_url.is_none()
    }

    /// Sum of all base stats ("base stat total")
    pub fn base_stat_total(&self) -> u32 {
        self.stats.iter().map(|s| s.value).sum()
    }
}

/// Supported image MIME types for uploaded blobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg"), ignoring parameters
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from the extension of the last URL path segment
    ///
    /// Query and fragment are ignored; unparsable URLs yield `None`.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        let file = url.path_segments()?.last()?;
        let (_, ext) = file.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw image bytes ready for upload
#[derive(Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub bytes: Vec<u8>,
    pub mime_type: ImageMimeType,
}

impl MediaBlob {
    pub fn new(bytes: Vec<u8>, mime_type: ImageMimeType) -> Self {
        Self { bytes, mime_type }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Reject blobs over [`MAX_BLOB_SIZE`]; exactly the limit is accepted
    pub fn ensure_within_limit(&self) -> Result<(), crate::error::ContentError> {
        if self.size() > MAX_BLOB_SIZE {
            return Err(crate::error::ContentError::ImageTooLarge {
                size: self.size(),
                limit: MAX_BLOB_SIZE,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MediaBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaBlob")
            .field("mime_type", &self.mime_type)
            .field("size", &self.size())
            .finish()
    }
}
