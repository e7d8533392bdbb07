//! Product image storage.
//!
//! Client for a Supabase-compatible object storage REST API. Uploads go to a
//! single public bucket; the returned URL is what gets stored in
//! `product.images`.
//!
//! Content type and size are validated before any request is made.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::config::MediaConfig;

/// Largest accepted upload (10 MiB).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Image types accepted for upload.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
];

const LIST_LIMIT: u32 = 100;

/// Errors that can occur when talking to object storage.
#[derive(Debug, Error)]
pub enum MediaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Content type not in the allow-list.
    #[error("unsupported content type: {0}")]
    UnsupportedType(String),

    /// Payload exceeds [`MAX_UPLOAD_BYTES`].
    #[error("file too large: {0} bytes (max {MAX_UPLOAD_BYTES})")]
    TooLarge(usize),

    /// Empty payload.
    #[error("file is empty")]
    Empty,

    /// Object path is empty or escapes the bucket.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl MediaError {
    /// Whether the error was caused by the caller's input.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType(_) | Self::TooLarge(_) | Self::Empty | Self::InvalidPath(_)
        )
    }
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaObject {
    /// Path inside the bucket.
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub public_url: String,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    /// `None` for folder placeholders.
    id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ListMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListMetadata {
    #[serde(default)]
    size: u64,
    #[serde(default)]
    mimetype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Object storage client.
#[derive(Clone)]
pub struct MediaClient {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: SecretString,
}

impl std::fmt::Debug for MediaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClient")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl MediaClient {
    /// Create a new media client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MediaConfig) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            service_key: config.service_key.clone(),
        })
    }

    /// Public URL for an object path.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{path}",
            self.base_url, self.bucket
        )
    }

    /// Upload an image, replacing any object at `path`.
    ///
    /// Returns the public URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error without calling storage if the path, type
    /// or size is rejected. Returns other variants if the request fails.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, MediaError> {
        validate_path(path)?;
        validate_upload(content_type, bytes.len())?;

        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/{}/{path}",
                self.base_url, self.bucket
            ))
            .bearer_auth(self.service_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        check_status(response).await?;
        tracing::info!(%path, "Image uploaded");
        Ok(self.public_url(path))
    }

    /// List objects directly under `folder` (empty for the bucket root),
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the response is malformed.
    #[instrument(skip(self))]
    pub async fn list(&self, folder: &str) -> Result<Vec<MediaObject>, MediaError> {
        let prefix = folder.trim_matches('/');
        if !prefix.is_empty() {
            validate_path(prefix)?;
        }

        let body = serde_json::json!({
            "prefix": prefix,
            "limit": LIST_LIMIT,
            "offset": 0,
            "sortBy": { "column": "created_at", "order": "desc" },
        });

        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/list/{}",
                self.base_url, self.bucket
            ))
            .bearer_auth(self.service_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let text = check_status(response).await?;
        let entries: Vec<ListEntry> =
            serde_json::from_str(&text).map_err(|e| MediaError::Parse(e.to_string()))?;

        Ok(entries
            .into_iter()
            .filter(|entry| entry.id.is_some())
            .map(|entry| {
                let name = if prefix.is_empty() {
                    entry.name
                } else {
                    format!("{prefix}/{}", entry.name)
                };
                let (size, content_type) = entry
                    .metadata
                    .map_or((0, None), |m| (m.size, m.mimetype));
                MediaObject {
                    public_url: self.public_url(&name),
                    name,
                    size,
                    content_type,
                    created_at: entry.created_at,
                }
            })
            .collect())
    }

    /// Delete objects by path. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns error if any path is invalid or the request fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, paths: &[String]) -> Result<usize, MediaError> {
        if paths.is_empty() {
            return Ok(0);
        }
        for path in paths {
            validate_path(path)?;
        }

        let response = self
            .client
            .delete(format!(
                "{}/storage/v1/object/{}",
                self.base_url, self.bucket
            ))
            .bearer_auth(self.service_key.expose_secret())
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await?;

        let text = check_status(response).await?;
        let deleted: Vec<serde_json::Value> =
            serde_json::from_str(&text).map_err(|e| MediaError::Parse(e.to_string()))?;

        tracing::info!(count = deleted.len(), "Images deleted");
        Ok(deleted.len())
    }
}

/// Build a collision-free object path for an uploaded file.
///
/// The file name is reduced to lowercase ASCII alphanumerics, `-`, `_` and `.`.
#[must_use]
pub fn object_path(folder: &str, file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '-' || c == '.');
    let cleaned = if cleaned.is_empty() { "image" } else { cleaned };

    let id = Uuid::new_v4().simple().to_string();
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        format!("{}-{cleaned}", &id[..12])
    } else {
        format!("{folder}/{}-{cleaned}", &id[..12])
    }
}

/// Check content type and size against the upload rules.
///
/// # Errors
///
/// Returns the first rule the upload breaks.
pub fn validate_upload(content_type: &str, len: usize) -> Result<(), MediaError> {
    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err(MediaError::UnsupportedType(content_type.to_string()));
    }
    if len == 0 {
        return Err(MediaError::Empty);
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(MediaError::TooLarge(len));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), MediaError> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || path.chars().any(char::is_control);
    if invalid {
        return Err(MediaError::InvalidPath(path.to_string()));
    }
    Ok(())
}

async fn check_status(response: reqwest::Response) -> Result<String, MediaError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or(body);
        return Err(MediaError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn client() -> MediaClient {
        MediaClient::new(&MediaConfig {
            base_url: "https://media.loomline.shop/".to_string(),
            bucket: "product-images".to_string(),
            service_key: SecretString::from("service_key_value"),
        })
        .unwrap()
    }

    #[test]
    fn test_debug_redacts_service_key() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("product-images"));
        assert!(!debug.contains("service_key_value"));
    }

    #[test]
    fn test_public_url() {
        assert_eq!(
            client().public_url("tops/abc-shirt.jpg"),
            "https://media.loomline.shop/storage/v1/object/public/product-images/tops/abc-shirt.jpg"
        );
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("image/webp", 1024).is_ok());
        assert!(matches!(
            validate_upload("application/pdf", 1024),
            Err(MediaError::UnsupportedType(_))
        ));
        assert!(matches!(
            validate_upload("image/png", 0),
            Err(MediaError::Empty)
        ));
        assert!(matches!(
            validate_upload("image/png", MAX_UPLOAD_BYTES + 1),
            Err(MediaError::TooLarge(_))
        ));
        assert!(validate_upload("image/png", MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("tops/shirt.jpg").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("/tops/shirt.jpg").is_err());
        assert!(validate_path("tops/../secrets").is_err());
        assert!(validate_path("tops//shirt.jpg").is_err());
    }

    #[test]
    fn test_object_path() {
        let path = object_path("/tops/", "Linen Shirt (Front).JPG");
        assert!(path.starts_with("tops/"));
        assert!(path.ends_with("-linen-shirt--front-.jpg"));
        assert!(validate_path(&path).is_ok());

        let root = object_path("", "???");
        assert!(root.ends_with("-image"));
        assert!(!root.contains('/'));
    }

    #[test]
    fn test_list_entry_parsing() {
        let entries: Vec<ListEntry> = serde_json::from_str(
            r#"[
                {"name":"tops","id":null,"metadata":null},
                {"name":"a.png","id":"1","created_at":"2026-03-01T10:00:00Z",
                 "metadata":{"size":2048,"mimetype":"image/png"}}
            ]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].id.is_none());
        assert_eq!(entries[1].metadata.as_ref().unwrap().size, 2048);
    }

    #[test]
    fn test_client_error_classification() {
        assert!(MediaError::Empty.is_client_error());
        assert!(
            !MediaError::Api {
                status: 500,
                message: "down".into()
            }
            .is_client_error()
        );
    }

    #[tokio::test]
    async fn test_rejected_upload_makes_no_request() {
        let err = client()
            .upload("tops/notes.txt", "text/plain", b"hello".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_delete_nothing() {
        assert_eq!(client().delete(&[]).await.unwrap(), 0);
    }
}
