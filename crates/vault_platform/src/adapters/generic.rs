use async_trait::async_trait;
use vault_domain::{LayoutType, Platform};

use crate::error::AdapterError;
use crate::parsed::ParsedContent;
use crate::registry::Adapter;

/// The catch-all adapter: treats any URL it's handed as a bare link with no
/// media and no enrichment. Real scraping for named platforms is out of
/// scope (§1); this is what keeps an unrecognized submission from being
/// dropped rather than archived.
pub struct GenericAdapter;

#[async_trait]
impl Adapter for GenericAdapter {
	fn platform(&self) -> Platform {
		Platform::Universal
	}

	async fn parse(&self, url: &str) -> Result<ParsedContent, AdapterError> {
		Ok(ParsedContent {
			platform: Platform::Universal,
			content_type: "link".to_string(),
			content_id: None,
			clean_url: url.to_string(),
			layout_type: LayoutType::Link,
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

	#[tokio::test]
	async fn parses_to_bare_link() {
		let adapter = GenericAdapter;
		let parsed = adapter.parse("https://example.com/whatever").await.unwrap();
		assert_eq!(parsed.layout_type, LayoutType::Link);
		assert!(parsed.media_urls.is_empty());
	}
}
