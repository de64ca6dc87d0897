use crate::config::MediaConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Errors from the media host boundary
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// Inline image data arrived but no media host is configured
    #[error("media host is not configured; cannot upload inline image data")]
    NotConfigured,
    /// Transport-level failure talking to the media host
    #[error("media host request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The media host answered with a non-success status
    #[error("media host rejected the request ({status}): {body}")]
    Upstream { status: u16, body: String },
}

/// A hosted asset as returned by the media host after an upload
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Public delivery URL
    pub url: String,
    /// Opaque asset identifier within the media host
    pub public_id: String,
}

/// Upload/delete/list surface of the media host.
///
/// Handlers and the garbage collector receive this as an explicitly
/// constructed client so tests can substitute a fake.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload an inline-encoded image and return its hosted URL and id
    async fn upload_image(&self, data_uri: &str) -> Result<UploadedAsset, MediaError>;
    /// Delete assets by id, returning how many the host actually removed
    async fn delete_assets(&self, public_ids: &[String]) -> Result<usize, MediaError>;
    /// Enumerate every asset id under the configured folder
    async fn list_assets(&self) -> Result<Vec<String>, MediaError>;
}

/// Media host client (Cloudinary-compatible REST API)
pub struct MediaLibrary {
    http: reqwest::Client,
    config: MediaConfig,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct ResourcePage {
    #[serde(default)]
    resources: Vec<ResourceEntry>,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    public_id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    deleted: HashMap<String, String>,
}

impl MediaLibrary {
    /// Create a new media host client
    pub fn new(config: MediaConfig) -> Self {
        info!(
            cloud_name = %config.cloud_name,
            folder = %config.folder,
            "Media library client initialized"
        );

        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Folder uploads land in and the garbage collector sweeps
    pub fn folder(&self) -> &str {
        &self.config.folder
    }

    fn upload_endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/image/upload",
            self.config.api_base_url, self.config.cloud_name
        )
    }

    fn resources_endpoint(&self) -> String {
        format!(
            "{}/v1_1/{}/resources/image/upload",
            self.config.api_base_url, self.config.cloud_name
        )
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MediaError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(MediaError::Upstream { status, body })
    }
}

#[async_trait]
impl MediaStore for MediaLibrary {
    #[instrument(skip(self, data_uri))]
    async fn upload_image(&self, data_uri: &str) -> Result<UploadedAsset, MediaError> {
        let response = self
            .http
            .post(self.upload_endpoint())
            .form(&[
                ("file", data_uri),
                ("upload_preset", self.config.upload_preset.as_str()),
                ("folder", self.config.folder.as_str()),
            ])
            .send()
            .await?;

        let upload: UploadResponse = Self::check_status(response).await?.json().await?;

        info!(public_id = %upload.public_id, "Image uploaded to media host");
        metrics::counter!("media.assets_uploaded").increment(1);

        Ok(UploadedAsset {
            url: upload.secure_url,
            public_id: upload.public_id,
        })
    }

    #[instrument(skip(self), fields(requested = public_ids.len()))]
    async fn delete_assets(&self, public_ids: &[String]) -> Result<usize, MediaError> {
        let mut deleted_count = 0;

        for chunk in public_ids.chunks(self.config.delete_batch_size.max(1)) {
            let query: Vec<(&str, &str)> = chunk
                .iter()
                .map(|id| ("public_ids[]", id.as_str()))
                .collect();

            let response = self
                .http
                .delete(self.resources_endpoint())
                .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
                .query(&query)
                .send()
                .await?;

            let outcome: DeleteResponse = Self::check_status(response).await?.json().await?;
            // The host reports per-id results; count only actual removals.
            deleted_count += count_deleted(&outcome.deleted);
        }

        debug!(deleted = deleted_count, "Assets deleted from media host");
        metrics::counter!("media.assets_deleted").increment(deleted_count as u64);

        Ok(deleted_count)
    }

    #[instrument(skip(self))]
    async fn list_assets(&self) -> Result<Vec<String>, MediaError> {
        let prefix = format!("{}/", self.config.folder);
        let max_results = self.config.list_page_size.to_string();
        let mut assets = Vec::new();
        let mut next_cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.resources_endpoint())
                .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
                .query(&[
                    ("prefix", prefix.as_str()),
                    ("max_results", max_results.as_str()),
                ]);

            if let Some(cursor) = &next_cursor {
                request = request.query(&[("next_cursor", cursor.as_str())]);
            }

            let page: ResourcePage = Self::check_status(request.send().await?)
                .await?
                .json()
                .await?;

            assets.extend(page.resources.into_iter().map(|r| r.public_id));

            next_cursor = page.next_cursor;
            if next_cursor.is_none() {
                break;
            }
        }

        debug!(count = assets.len(), "Listed media host folder");
        Ok(assets)
    }
}

fn count_deleted(deleted: &HashMap<String, String>) -> usize {
    deleted.values().filter(|state| *state == "deleted").count()
}

/// Outcome of resolving a user-supplied image reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedImage {
    /// Stored delivery URL, if any image was supplied
    pub url: Option<String>,
    /// Asset id within the media host, if derivable
    pub public_id: Option<String>,
    /// Whether an upload to the media host occurred
    pub uploaded: bool,
}

/// True when the input carries inline-encoded image data rather than a URL
pub fn is_inline_image(input: &str) -> bool {
    input.starts_with("data:")
}

/// Resolve a user-supplied image reference into a stored URL and asset id.
///
/// Inline payloads require a configured media host and are uploaded; plain
/// URLs are stored as-is with the asset id derived from the URL when the
/// host matches `host_suffix`.
pub async fn resolve_image(
    input: Option<&str>,
    media: Option<&dyn MediaStore>,
    host_suffix: &str,
) -> Result<ResolvedImage, MediaError> {
    let trimmed = match input.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value,
        None => return Ok(ResolvedImage::default()),
    };

    if is_inline_image(trimmed) {
        let store = media.ok_or(MediaError::NotConfigured)?;
        let asset = store.upload_image(trimmed).await?;
        return Ok(ResolvedImage {
            url: Some(asset.url),
            public_id: Some(asset.public_id),
            uploaded: true,
        });
    }

    Ok(ResolvedImage {
        url: Some(trimmed.to_string()),
        public_id: extract_public_id(trimmed, host_suffix),
        uploaded: false,
    })
}

/// Derive the media-host asset id from a delivery URL.
///
/// Returns the decoded path between the `upload` marker (skipping an
/// optional `v<digits>` version segment) and the file extension. URLs on
/// other hosts, or without the marker, yield `None`.
pub fn extract_public_id(input_url: &str, host_suffix: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(input_url).ok()?;
    if !parsed.host_str()?.ends_with(host_suffix) {
        return None;
    }

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();

    let upload_index = segments.iter().position(|segment| *segment == "upload")?;
    let candidates = &segments[upload_index + 1..];

    let version_index = candidates.iter().position(|segment| is_version_segment(segment));
    let mut id_parts: Vec<&str> = match version_index {
        Some(index) => candidates[index + 1..].to_vec(),
        None => candidates.to_vec(),
    };

    let last = id_parts.pop()?;
    let stripped = strip_extension(last);
    id_parts.push(stripped);

    let joined = id_parts.join("/");
    let decoded = urlencoding::decode(&joined).ok()?;
    let public_id = decoded.trim();

    if public_id.is_empty() {
        None
    } else {
        Some(public_id.to_string())
    }
}

fn is_version_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v') && segment.len() > 1 && chars.all(|c| c.is_ascii_digit())
}

fn strip_extension(segment: &str) -> &str {
    match segment.rsplit_once('.') {
        Some((stem, extension))
            if !stem.is_empty()
                && !extension.is_empty()
                && extension.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_public_id_with_version_and_extension() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1700000000/listings/apt-42.jpg";
        assert_eq!(
            extract_public_id(url, "cloudinary.com"),
            Some("listings/apt-42".to_string())
        );
    }

    #[test]
    fn test_extract_public_id_without_version() {
        let url = "https://res.cloudinary.com/demo/image/upload/listings/apt-42.png";
        assert_eq!(
            extract_public_id(url, "cloudinary.com"),
            Some("listings/apt-42".to_string())
        );
    }

    #[test]
    fn test_extract_public_id_decodes_segments() {
        let url = "https://res.cloudinary.com/demo/image/upload/v123/listings/front%20door.jpg";
        assert_eq!(
            extract_public_id(url, "cloudinary.com"),
            Some("listings/front door".to_string())
        );
    }

    #[test]
    fn test_extract_public_id_foreign_host_is_none() {
        let url = "https://images.example.org/upload/v123/listings/apt-42.jpg";
        assert_eq!(extract_public_id(url, "cloudinary.com"), None);
    }

    #[test]
    fn test_extract_public_id_requires_upload_marker() {
        let url = "https://res.cloudinary.com/demo/image/fetch/listings/apt-42.jpg";
        assert_eq!(extract_public_id(url, "cloudinary.com"), None);
    }

    #[test]
    fn test_extract_public_id_invalid_url_is_none() {
        assert_eq!(extract_public_id("not a url", "cloudinary.com"), None);
        assert_eq!(extract_public_id("", "cloudinary.com"), None);
    }

    #[test]
    fn test_extract_public_id_strips_single_extension() {
        let url = "https://res.cloudinary.com/demo/image/upload/v9/listings/archive.tar.gz";
        assert_eq!(
            extract_public_id(url, "cloudinary.com"),
            Some("listings/archive.tar".to_string())
        );
    }

    #[test]
    fn test_version_segment_detection() {
        assert!(is_version_segment("v1"));
        assert!(is_version_segment("v1700000000"));
        assert!(!is_version_segment("v"));
        assert!(!is_version_segment("version1"));
        assert!(!is_version_segment("v12a"));
    }

    #[test]
    fn test_count_deleted_ignores_not_found() {
        let mut outcome = HashMap::new();
        outcome.insert("a".to_string(), "deleted".to_string());
        outcome.insert("b".to_string(), "not_found".to_string());
        outcome.insert("c".to_string(), "deleted".to_string());
        assert_eq!(count_deleted(&outcome), 2);
    }

    #[tokio::test]
    async fn test_resolve_image_empty_input() {
        let resolved = resolve_image(None, None, "cloudinary.com").await.unwrap();
        assert_eq!(resolved, ResolvedImage::default());

        let resolved = resolve_image(Some("   "), None, "cloudinary.com")
            .await
            .unwrap();
        assert!(resolved.url.is_none());
        assert!(!resolved.uploaded);
    }

    #[tokio::test]
    async fn test_resolve_image_inline_requires_media_host() {
        let result = resolve_image(Some("data:image/png;base64,AAAA"), None, "cloudinary.com").await;
        assert!(matches!(result, Err(MediaError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_resolve_image_inline_uploads() {
        let mut media = MockMediaStore::new();
        media.expect_upload_image().times(1).returning(|_| {
            Ok(UploadedAsset {
                url: "https://res.cloudinary.com/demo/image/upload/v1/listings/new.jpg".to_string(),
                public_id: "listings/new".to_string(),
            })
        });

        let resolved = resolve_image(
            Some("data:image/png;base64,AAAA"),
            Some(&media as &dyn MediaStore),
            "cloudinary.com",
        )
        .await
        .unwrap();

        assert!(resolved.uploaded);
        assert_eq!(resolved.public_id.as_deref(), Some("listings/new"));
    }

    #[tokio::test]
    async fn test_resolve_image_hosted_url_is_not_uploaded() {
        let url = "https://res.cloudinary.com/demo/image/upload/v1/listings/kept.jpg";
        let resolved = resolve_image(Some(url), None, "cloudinary.com").await.unwrap();

        assert!(!resolved.uploaded);
        assert_eq!(resolved.url.as_deref(), Some(url));
        assert_eq!(resolved.public_id.as_deref(), Some("listings/kept"));
    }

    #[tokio::test]
    async fn test_resolve_image_foreign_url_has_no_public_id() {
        let url = "https://images.example.org/photos/apt.jpg";
        let resolved = resolve_image(Some(url), None, "cloudinary.com").await.unwrap();

        assert_eq!(resolved.url.as_deref(), Some(url));
        assert!(resolved.public_id.is_none());
        assert!(!resolved.uploaded);
    }
}
