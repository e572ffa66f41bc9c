use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use vault_domain::ArchiveMetadata;
use vault_storage::{StorageBackend, content_addressed_key};

use crate::fetch::fetch_with_retries;
use crate::transcode;

#[derive(Debug, Clone)]
pub struct MediaProcessorConfig {
	pub quality: u8,
	pub image_timeout: Duration,
	pub video_timeout: Duration,
	pub max_images: Option<usize>,
	pub max_videos: Option<usize>,
	/// Path to an ffmpeg-compatible binary for the animated-image fast path.
	/// `None` means the in-process fallback (first frame only) is always used.
	pub ffmpeg_binary: Option<PathBuf>,
}

impl Default for MediaProcessorConfig {
	fn default() -> Self {
		Self {
			quality: 80,
			image_timeout: Duration::from_secs(30),
			video_timeout: Duration::from_secs(120),
			max_images: None,
			max_videos: None,
			ffmpeg_binary: None,
		}
	}
}

/// Downloads, transcodes, and content-addresses the images and videos
/// referenced by an archive, storing the results through `StorageBackend`.
pub struct MediaProcessor {
	http: reqwest::Client,
	storage: Arc<dyn StorageBackend>,
	config: MediaProcessorConfig,
}

impl MediaProcessor {
	pub fn new(storage: Arc<dyn StorageBackend>, config: MediaProcessorConfig) -> Self {
		if config.ffmpeg_binary.is_none() {
			tracing::info!("no external transcoder on PATH, animated images fall back to first-frame WebP");
		}
		Self { http: reqwest::Client::new(), storage, config }
	}

	/// Processes every not-yet-stored image in `archive.images`, mutating each
	/// entry in place and attaching a dominant color to the archive from the
	/// first one that succeeds. Returns an `orig_url -> "local://<key>"` map
	/// for callers that need to rewrite references elsewhere.
	pub async fn store_archive_images(&self, archive: &mut ArchiveMetadata, namespace: &str) -> HashMap<String, String> {
		let mut url_map = HashMap::new();
		let mut processed = 0usize;
		let mut dominant_color_set = false;

		for img in archive.images.iter_mut() {
			if let Some(max) = self.config.max_images {
				if processed >= max {
					break;
				}
			}
			if img.is_processed() {
				continue;
			}
			let orig_url = img.url.trim().to_string();
			if orig_url.is_empty() {
				continue;
			}

			let resp = match fetch_with_retries(&self.http, &orig_url, self.config.image_timeout, 3, Duration::from_millis(800)).await
			{
				Ok(resp) => resp,
				Err(err) => {
					tracing::warn!(url = %orig_url, error = %err, "image fetch failed after retries");
					continue;
				}
			};

			let src_bytes = match resp.bytes().await {
				Ok(bytes) => bytes,
				Err(err) => {
					tracing::warn!(url = %orig_url, error = %err, "reading image response body failed");
					continue;
				}
			};

			let transcoded = match transcode::image_to_webp(&src_bytes, self.config.quality, self.config.ffmpeg_binary.as_deref()).await
			{
				Ok(result) => result,
				Err(err) => {
					tracing::warn!(url = %orig_url, error = %err, "image transcode failed");
					continue;
				}
			};

			let key = content_addressed_key(namespace, &transcoded.bytes, "webp");
			if let Err(err) = self.storage.put(&key, transcoded.bytes.clone(), "image/webp").await {
				tracing::warn!(url = %orig_url, error = %err, "storing transcoded image failed");
				continue;
			}

			match transcode::thumbnail_webp(&transcoded.bytes, 300, 300) {
				Ok(thumb_bytes) => {
					let thumb_key = key.replace(".webp", ".thumb.webp");
					if let Err(err) = self.storage.put(&thumb_key, thumb_bytes, "image/webp").await {
						tracing::warn!(url = %orig_url, error = %err, "storing thumbnail failed");
					}
				}
				Err(err) => tracing::warn!(url = %orig_url, error = %err, "thumbnail generation failed"),
			}

			if !dominant_color_set {
				archive.dominant_color = transcode::dominant_color(&transcoded.bytes);
				dominant_color_set = true;
			}

			let sha256 = hex::encode(Sha256::digest(&transcoded.bytes));
			img.stored_key = Some(key.clone());
			img.stored_url = self.storage.url(&key);
			img.stored_sha256 = Some(sha256);
			img.stored_size = Some(transcoded.bytes.len() as i64);
			img.stored_width = Some(transcoded.width);
			img.stored_height = Some(transcoded.height);
			img.stored_content_type = Some("image/webp".to_string());

			// `local://` is preferred over whatever public URL Storage exposes so
			// the presentation layer can uniformly proxy every stored asset.
			url_map.insert(orig_url, format!("local://{key}"));
			processed += 1;
		}

		url_map
	}

	/// Processes every not-yet-stored video in `archive.videos`. No
	/// transcoding happens; the content type and extension come from the
	/// response, defaulting to `mp4`.
	pub async fn store_archive_videos(&self, archive: &mut ArchiveMetadata, namespace: &str) {
		let mut processed = 0usize;

		for vid in archive.videos.iter_mut() {
			if let Some(max) = self.config.max_videos {
				if processed >= max {
					break;
				}
			}
			if vid.is_processed() {
				continue;
			}
			let orig_url = vid.url.trim().to_string();
			if orig_url.is_empty() {
				continue;
			}

			let resp = match fetch_with_retries(&self.http, &orig_url, self.config.video_timeout, 3, Duration::from_millis(1500)).await
			{
				Ok(resp) => resp,
				Err(err) => {
					tracing::warn!(url = %orig_url, error = %err, "video fetch failed after retries");
					continue;
				}
			};

			let content_type = resp
				.headers()
				.get(reqwest::header::CONTENT_TYPE)
				.and_then(|v| v.to_str().ok())
				.unwrap_or("video/mp4")
				.to_string();
			let content_type = if content_type.contains("video") { content_type } else { "video/mp4".to_string() };
			let ext = extension_for_content_type(&content_type);

			let bytes = match resp.bytes().await {
				Ok(bytes) => bytes,
				Err(err) => {
					tracing::warn!(url = %orig_url, error = %err, "reading video response body failed");
					continue;
				}
			};

			let key = content_addressed_key(namespace, &bytes, ext);
			if let Err(err) = self.storage.put(&key, bytes.to_vec(), &content_type).await {
				tracing::warn!(url = %orig_url, error = %err, "storing video failed");
				continue;
			}

			vid.stored_key = Some(key.clone());
			vid.stored_url = self.storage.url(&key);
			vid.stored_sha256 = Some(hex::encode(Sha256::digest(&bytes)));
			vid.stored_size = Some(bytes.len() as i64);
			vid.stored_content_type = Some(content_type);
			processed += 1;
		}
	}

	/// Extracts a dominant color from a cover image URL without running the
	/// full archive pipeline. A single best-effort fetch, no retries.
	pub async fn extract_cover_color(&self, url: &str) -> Option<String> {
		let url = url.trim();
		if url.is_empty() {
			return None;
		}

		let resp = fetch_with_retries(&self.http, url, Duration::from_secs(10), 1, Duration::ZERO).await.ok()?;
		let bytes = resp.bytes().await.ok()?;
		transcode::dominant_color(&bytes)
	}
}

fn extension_for_content_type(content_type: &str) -> &str {
	const KNOWN: &[&str] = &["mp4", "webm", "ogg", "mov", "avi", "mkv"];
	let subtype = content_type.split('/').nth(1).and_then(|s| s.split(';').next()).unwrap_or("").trim();
	KNOWN.iter().find(|&&ext| ext == subtype).copied().unwrap_or("mp4")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn extension_falls_back_to_mp4_for_unknown_subtype() {
		assert_eq!(extension_for_content_type("video/mp4"), "mp4");
		assert_eq!(extension_for_content_type("video/webm; charset=binary"), "webm");
		assert_eq!(extension_for_content_type("application/octet-stream"), "mp4");
	}
}
