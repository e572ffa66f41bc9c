use async_trait::async_trait;
use vault_domain::{LayoutType, Platform};

use crate::error::AdapterError;
use crate::parsed::ParsedContent;
use crate::registry::Adapter;

/// Matches `bilibili.com` and `b23.tv` hosts.
pub fn detect(url: &url::Url) -> bool {
	match url.host_str() {
		Some(host) => host.ends_with("bilibili.com") || host.ends_with("b23.tv"),
		None => false,
	}
}

/// Illustrative bilibili adapter: extracts the BV/av/cv identifier and the
/// content type (video vs. article) from the URL path alone. Real field
/// extraction (title, stats, media) requires calling bilibili's API, which
/// is out of scope here — this is enough to exercise ingestion end to end.
pub struct BilibiliAdapter;

fn extract_identifier(path: &str) -> (Option<String>, &'static str, LayoutType) {
	let last_segment = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
	if last_segment.starts_with("BV") || last_segment.starts_with("av") {
		(Some(last_segment.to_string()), "video", LayoutType::Video)
	} else if last_segment.starts_with("cv") {
		(Some(last_segment.to_string()), "article", LayoutType::Article)
	} else {
		(None, "unknown", LayoutType::Link)
	}
}

#[async_trait]
impl Adapter for BilibiliAdapter {
	fn platform(&self) -> Platform {
		Platform::Bilibili
	}

	async fn parse(&self, url: &str) -> Result<ParsedContent, AdapterError> {
		let parsed_url = url::Url::parse(url).map_err(|e| AdapterError::non_retryable(e.to_string()))?;
		let (content_id, content_type, layout_type) = extract_identifier(parsed_url.path());

		if content_id.is_none() {
			return Err(AdapterError::non_retryable("no recognizable bilibili identifier in path"));
		}

		Ok(ParsedContent {
			platform: Platform::Bilibili,
			content_type: content_type.to_string(),
			content_id,
			clean_url: url.to_string(),
			layout_type,
			title: None,
			description: None,
			summary: None,
			body: None,
			author_name: None,
			author_id: None,
			author_avatar: None,
			author_url: None,
			cover_url: None,
			media_urls: Vec::new(),
			published_at: None,
			archive_metadata: Default::default(),
			stats: Default::default(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_bilibili_and_short_link_hosts() {
		assert!(detect(&url::Url::parse("https://www.bilibili.com/video/BV1xx411c7Xg").unwrap()));
		assert!(detect(&url::Url::parse("https://b23.tv/abcdefg").unwrap()));
		assert!(!detect(&url::Url::parse("https://example.com").unwrap()));
	}

	#[tokio::test]
	async fn extracts_bv_identifier() {
		let adapter = BilibiliAdapter;
		let parsed = adapter.parse("https://www.bilibili.com/video/BV1xx411c7Xg").await.unwrap();
		assert_eq!(parsed.content_id.as_deref(), Some("BV1xx411c7Xg"));
		assert_eq!(parsed.layout_type, LayoutType::Video);
	}

	#[tokio::test]
	async fn rejects_unrecognizable_path() {
		let adapter = BilibiliAdapter;
		let err = adapter.parse("https://www.bilibili.com/").await.unwrap_err();
		assert_eq!(err.kind(), "non_retryable");
	}
}
