use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vault_domain::{ArchiveMetadata, LayoutType, Platform};

/// The semantic result of a successful `Adapter::parse` call. The Parse
/// Worker copies these fields onto the `Content` row and hands
/// `archive_metadata` to the Media Processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedContent {
	pub platform: Platform,
	pub content_type: String,
	pub content_id: Option<String>,
	pub clean_url: String,
	pub layout_type: LayoutType,
	pub title: Option<String>,
	pub description: Option<String>,
	pub summary: Option<String>,
	pub body: Option<String>,
	pub author_name: Option<String>,
	pub author_id: Option<String>,
	pub author_avatar: Option<String>,
	pub author_url: Option<String>,
	pub cover_url: Option<String>,
	pub media_urls: Vec<String>,
	pub published_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub archive_metadata: ArchiveMetadata,
	#[serde(default)]
	pub stats: std::collections::BTreeMap<String, i64>,
}
