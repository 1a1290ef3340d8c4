//! Sprite download

use tracing::debug;

use crate::error::{ContentError, Result};
use crate::types::{ImageMimeType, MediaBlob};

/// Fetches images by URL
///
/// No size limit is applied here: the body is read in full and the
/// uploader rejects anything over [`MAX_BLOB_SIZE`](crate::types::MAX_BLOB_SIZE).
#[derive(Debug, Clone, Default)]
pub struct MediaClient {
    client: reqwest::Client,
}

impl MediaClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download the image at `url`
    ///
    /// The MIME type comes from `Content-Type`, then the URL extension, and
    /// defaults to PNG.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Request` on transport failure and
    /// `ContentError::Status` on a non-success response.
    pub async fn fetch_image(&self, url: &str) -> Result<MediaBlob> {
        debug!(%url, "Fetching image");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContentError::Request {
                operation: "fetch image",
                target: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContentError::Status {
                operation: "fetch image",
                target: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(ImageMimeType::from_mime_str);
        let mime_type = header_mime
            .or_else(|| ImageMimeType::from_url(url))
            .unwrap_or(ImageMimeType::Png);

        // TODO: stop reading once the body passes MAX_BLOB_SIZE instead of
        // buffering oversized sprites in full.
        let bytes = response.bytes().await.map_err(|e| ContentError::Request {
            operation: "fetch image",
            target: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, size = bytes.len(), mime = %mime_type, "Fetched image");
        Ok(MediaBlob::new(bytes.to_vec(), mime_type))
    }
}
