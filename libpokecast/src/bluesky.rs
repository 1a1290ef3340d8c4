//! Bluesky (AT Protocol) session client
//!
//! Talks XRPC directly over HTTP: `com.atproto.server.createSession`,
//! `com.atproto.server.refreshSession`, `com.atproto.repo.uploadBlob`, and
//! `com.atproto.repo.createRecord`.
//!
//! A [`Session`] is an explicit value. Callers that want to reuse one across
//! calls keep it in an `Option<Session>` and go through
//! [`BlueskyClient::ensure_session`], which authenticates at most once.
//! A PDS answering `ExpiredToken` or `InvalidToken` surfaces as
//! `ProtocolError::Authentication`; [`BlueskyClient::refresh_session`] trades
//! the refresh token for a new session.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::types::MediaBlob;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";
pub const LINK_FEATURE_TYPE: &str = "app.bsky.richtext.facet#link";
pub const IMAGES_EMBED_TYPE: &str = "app.bsky.embed.images";

/// Reference to an uploaded blob, embedded verbatim in records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub kind: String,
    #[serde(rename = "ref", default)]
    pub reference: CidLink,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidLink {
    #[serde(rename = "$link", default)]
    pub link: String,
}

fn blob_type() -> String {
    "blob".to_string()
}

impl BlobRef {
    fn is_zero(&self) -> bool {
        self.reference.link.is_empty()
    }
}

/// `app.bsky.feed.post` record body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: String,
    pub text: String,
    /// RFC3339 timestamp
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

/// Rich-text annotation over a UTF-8 byte range of the post text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// Half-open UTF-8 byte range `[byte_start, byte_end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetFeature {
    #[serde(rename = "$type")]
    pub kind: String,
    pub uri: String,
}

impl Facet {
    pub fn link(byte_start: usize, byte_end: usize, uri: impl Into<String>) -> Self {
        Self {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![FacetFeature {
                kind: LINK_FEATURE_TYPE.to_string(),
                uri: uri.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(rename = "$type")]
    pub kind: String,
    pub images: Vec<EmbedImage>,
}

impl Embed {
    pub fn images(images: Vec<EmbedImage>) -> Self {
        Self {
            kind: IMAGES_EMBED_TYPE.to_string(),
            images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedImage {
    pub alt: String,
    pub image: BlobRef,
}

/// Body of a `createRecord` call
#[derive(Debug, Clone, Serialize)]
pub struct PostPayload<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

/// Login identifier and app password
pub struct Credentials {
    pub identifier: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: SecretString) -> Self {
        Self {
            identifier: identifier.into(),
            password,
        }
    }
}

/// An authenticated session. Never persisted.
#[derive(Debug)]
pub struct Session {
    pub did: String,
    pub handle: String,
    access_jwt: SecretString,
    refresh_jwt: SecretString,
}

impl Session {
    pub fn new(
        did: impl Into<String>,
        handle: impl Into<String>,
        access_jwt: SecretString,
        refresh_jwt: SecretString,
    ) -> Self {
        Self {
            did: did.into(),
            handle: handle.into(),
            access_jwt,
            refresh_jwt,
        }
    }

    pub fn access_jwt(&self) -> &SecretString {
        &self.access_jwt
    }

    pub fn refresh_jwt(&self) -> &SecretString {
        &self.refresh_jwt
    }
}

/// Body of both `createSession` and `refreshSession` replies
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    #[serde(default)]
    did: String,
    #[serde(default)]
    handle: String,
    #[serde(default)]
    access_jwt: String,
    #[serde(default)]
    refresh_jwt: String,
}

impl SessionResponse {
    fn into_session(self, operation: Operation) -> Result<Session> {
        if self.did.is_empty() || self.access_jwt.is_empty() {
            return Err(ProtocolError::InvalidResponse(format!(
                "{} response is missing the DID or access token",
                operation.as_str()
            ))
            .into());
        }
        Ok(Session::new(
            self.did,
            self.handle,
            SecretString::from(self.access_jwt),
            SecretString::from(self.refresh_jwt),
        ))
    }
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Option<BlobRef>,
}

/// Location of a created record
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreatedRecord {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

/// AT Protocol error codes meaning the bearer token is no longer usable
const TOKEN_ERRORS: [&str; 2] = ["ExpiredToken", "InvalidToken"];

#[derive(Deserialize)]
struct XrpcErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    CreateSession,
    RefreshSession,
    UploadBlob,
    CreateRecord,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::CreateSession => "create session",
            Operation::RefreshSession => "refresh session",
            Operation::UploadBlob => "upload blob",
            Operation::CreateRecord => "create post",
        }
    }
}

/// Summarize an XRPC error body as "Error: message", falling back to raw text
fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<XrpcErrorBody>(body) {
        Ok(xrpc) if !xrpc.error.is_empty() && !xrpc.message.is_empty() => {
            format!("{}: {}", xrpc.error, xrpc.message)
        }
        Ok(xrpc) if !xrpc.error.is_empty() => xrpc.error,
        _ => body.trim().to_string(),
    }
}

fn is_token_error(body: &str) -> bool {
    serde_json::from_str::<XrpcErrorBody>(body)
        .map(|xrpc| TOKEN_ERRORS.contains(&xrpc.error.as_str()))
        .unwrap_or(false)
}

/// Map a non-success XRPC status to a `ProtocolError`
///
/// - 401/403, or an `ExpiredToken`/`InvalidToken` body → `Authentication`
/// - 429 → `RateLimit`
/// - 5xx → `Network`
/// - other 4xx → per operation (`Authentication` for session calls,
///   `Upload` for blobs, `Posting` for records)
fn map_status_error(status: StatusCode, body: &str, operation: Operation) -> ProtocolError {
    let detail = describe_error_body(body);
    let context = operation.as_str();

    match status.as_u16() {
        400 if is_token_error(body) => ProtocolError::Authentication(format!(
            "Bluesky session rejected during {}: {}",
            context, detail
        )),
        401 | 403 => ProtocolError::Authentication(format!(
            "Bluesky rejected credentials during {} (HTTP {}): {}",
            context,
            status.as_u16(),
            detail
        )),
        429 => ProtocolError::RateLimit(format!(
            "Bluesky rate limit exceeded during {}: {}",
            context, detail
        )),
        500..=599 => ProtocolError::Network(format!(
            "Bluesky server error during {} (HTTP {}): {}",
            context,
            status.as_u16(),
            detail
        )),
        code => match operation {
            Operation::CreateSession => ProtocolError::Authentication(format!(
                "Bluesky login failed (HTTP {}): {}",
                code, detail
            )),
            Operation::RefreshSession => ProtocolError::Authentication(format!(
                "Bluesky session refresh failed (HTTP {}): {}",
                code, detail
            )),
            Operation::UploadBlob => {
                ProtocolError::Upload(format!("HTTP {}: {}", code, detail))
            }
            Operation::CreateRecord => {
                ProtocolError::Posting(format!("HTTP {}: {}", code, detail))
            }
        },
    }
}

/// Client for one PDS (e.g. "https://bsky.social")
#[derive(Debug, Clone)]
pub struct BlueskyClient {
    client: reqwest::Client,
    service: String,
}

impl BlueskyClient {
    pub fn new(service: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), service)
    }

    pub fn with_client(client: reqwest::Client, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into().trim_end_matches('/').to_string(),
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    /// Authenticate and return a fresh session
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Authentication` if the PDS rejects the
    /// credentials, or `ProtocolError::InvalidResponse` if the reply lacks
    /// the DID or access token.
    pub async fn create_session(&self, credentials: &Credentials) -> Result<Session> {
        debug!(identifier = %credentials.identifier, "Creating Bluesky session");

        let body = serde_json::json!({
            "identifier": credentials.identifier,
            "password": credentials.password.expose_secret(),
        });
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&body)
            .send()
            .await
            .map_err(|e| network_error(Operation::CreateSession, e))?;

        let session = read_json::<SessionResponse>(response, Operation::CreateSession)
            .await?
            .into_session(Operation::CreateSession)?;

        debug!(did = %session.did, "Bluesky session created");
        Ok(session)
    }

    /// Exchange the session's refresh token for a new session
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Authentication` when the refresh token itself
    /// is expired or revoked; the caller has to log in again.
    pub async fn refresh_session(&self, session: &Session) -> Result<Session> {
        debug!(did = %session.did, "Refreshing Bluesky session");

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.refreshSession"))
            .bearer_auth(session.refresh_jwt.expose_secret())
            .send()
            .await
            .map_err(|e| network_error(Operation::RefreshSession, e))?;

        let refreshed = read_json::<SessionResponse>(response, Operation::RefreshSession)
            .await?
            .into_session(Operation::RefreshSession)?;

        debug!(did = %refreshed.did, "Bluesky session refreshed");
        Ok(refreshed)
    }

    /// Return the session in `slot`, creating it first if the slot is empty
    ///
    /// A failed login leaves the slot empty; it is not retried here.
    pub async fn ensure_session<'a>(
        &self,
        slot: &'a mut Option<Session>,
        credentials: &Credentials,
    ) -> Result<&'a Session> {
        let session = match slot.take() {
            Some(session) => session,
            None => self.create_session(credentials).await?,
        };
        Ok(slot.insert(session))
    }

    /// Upload image bytes and return the blob reference to embed
    ///
    /// The size limit is checked before anything is sent.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::ImageTooLarge` for blobs over the limit, and
    /// `ProtocolError` for rejected uploads or replies without a blob ref.
    pub async fn upload_blob(&self, session: &Session, blob: &MediaBlob) -> Result<BlobRef> {
        blob.ensure_within_limit()?;

        debug!(size = blob.size(), mime = %blob.mime_type, "Uploading blob");
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .bearer_auth(session.access_jwt.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, blob.mime_type.as_str())
            .body(blob.bytes.clone())
            .send()
            .await
            .map_err(|e| network_error(Operation::UploadBlob, e))?;

        let parsed: UploadBlobResponse = read_json(response, Operation::UploadBlob).await?;
        match parsed.blob {
            Some(blob_ref) if !blob_ref.is_zero() => Ok(blob_ref),
            _ => Err(ProtocolError::InvalidResponse(
                "uploadBlob response carries no blob reference".to_string(),
            )
            .into()),
        }
    }

    /// Publish `record` to the session's repo
    ///
    /// # Errors
    ///
    /// Any non-success status is an error, as is a reply without a URI or
    /// CID.
    pub async fn create_post(&self, session: &Session, record: &PostRecord) -> Result<CreatedRecord> {
        let payload = PostPayload {
            repo: &session.did,
            collection: POST_COLLECTION,
            record,
        };

        debug!(repo = %session.did, bytes = record.text.len(), "Creating post record");
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(session.access_jwt.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| network_error(Operation::CreateRecord, e))?;

        let created: CreatedRecord = read_json(response, Operation::CreateRecord).await?;
        if created.uri.is_empty() || created.cid.is_empty() {
            return Err(ProtocolError::InvalidResponse(
                "createRecord response is missing the URI or CID".to_string(),
            )
            .into());
        }

        debug!(uri = %created.uri, "Post created");
        Ok(created)
    }
}

fn network_error(operation: Operation, error: reqwest::Error) -> ProtocolError {
    ProtocolError::Network(format!(
        "request to Bluesky failed during {}: {}",
        operation.as_str(),
        error
    ))
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation: Operation,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| network_error(operation, e))?;

    if !status.is_success() {
        return Err(map_status_error(status, &body, operation).into());
    }
    if body.trim().is_empty() {
        return Err(ProtocolError::InvalidResponse(format!(
            "empty response body during {}",
            operation.as_str()
        ))
        .into());
    }

    serde_json::from_str(&body).map_err(|e| {
        ProtocolError::InvalidResponse(format!(
            "unparsable response during {}: {}",
            operation.as_str(),
            e
        ))
        .into()
    })
}
