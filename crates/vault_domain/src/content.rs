use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_json::Value;

use crate::ids::{ContentId, Platform};

/// Presentation form driven by the content itself, not by the platform alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LayoutType {
	Article,
	Video,
	Gallery,
	Audio,
	Link,
}

impl LayoutType {
	pub const fn as_str(self) -> &'static str {
		match self {
			LayoutType::Article => "article",
			LayoutType::Video => "video",
			LayoutType::Gallery => "gallery",
			LayoutType::Audio => "audio",
			LayoutType::Link => "link",
		}
	}
}

/// Parse lifecycle of a `Content` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ParseStatus {
	Unprocessed,
	Processing,
	ParseSuccess,
	ParseFailed,
}

impl ParseStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			ParseStatus::Unprocessed => "unprocessed",
			ParseStatus::Processing => "processing",
			ParseStatus::ParseSuccess => "parse_success",
			ParseStatus::ParseFailed => "parse_failed",
		}
	}
}

/// Human review lifecycle, independent of parse status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReviewStatus {
	Pending,
	Approved,
	Rejected,
	AutoApproved,
}

impl ReviewStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			ReviewStatus::Pending => "pending",
			ReviewStatus::Approved => "approved",
			ReviewStatus::Rejected => "rejected",
			ReviewStatus::AutoApproved => "auto_approved",
		}
	}

	/// Approved content, by hand or by an auto-approve rule, may be distributed.
	pub const fn is_approved(self) -> bool {
		matches!(self, ReviewStatus::Approved | ReviewStatus::AutoApproved)
	}
}

/// Interaction counters common to every platform, plus a free-form overflow map
/// for platform-specific ones (coin counts, reposts, ...).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ContentStats {
	pub view_count: i64,
	pub like_count: i64,
	pub collect_count: i64,
	pub share_count: i64,
	pub comment_count: i64,
	#[cfg(feature = "serde")]
	pub extra: serde_json::Map<String, Value>,
}

/// One image entry inside `archive_metadata.images[]`, before and after the
/// Media Processor has run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArchiveImage {
	pub url: String,
	pub stored_key: Option<String>,
	pub stored_url: Option<String>,
	pub stored_sha256: Option<String>,
	pub stored_size: Option<i64>,
	pub stored_width: Option<u32>,
	pub stored_height: Option<u32>,
	pub stored_content_type: Option<String>,
}

impl ArchiveImage {
	pub fn is_processed(&self) -> bool {
		self.stored_key.is_some()
	}
}

/// One video entry inside `archive_metadata.videos[]`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArchiveVideo {
	pub url: String,
	pub stored_key: Option<String>,
	pub stored_url: Option<String>,
	pub stored_sha256: Option<String>,
	pub stored_size: Option<i64>,
	pub stored_content_type: Option<String>,
}

impl ArchiveVideo {
	pub fn is_processed(&self) -> bool {
		self.stored_key.is_some()
	}
}

/// The opaque structured archive blob. `platform_data` preserves whatever the
/// adapter attached beyond the fields this core understands.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ArchiveMetadata {
	pub images: Vec<ArchiveImage>,
	pub videos: Vec<ArchiveVideo>,
	pub dominant_color: Option<String>,
	#[cfg(feature = "serde")]
	pub platform_data: serde_json::Map<String, Value>,
}

impl ArchiveMetadata {
	/// Whether every image and video in this archive has already been run
	/// through the Media Processor.
	pub fn fully_processed(&self) -> bool {
		self.images.iter().all(ArchiveImage::is_processed) && self.videos.iter().all(ArchiveVideo::is_processed)
	}
}

/// A single archived item.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Content {
	pub id: ContentId,
	pub platform: Platform,
	pub url: String,
	pub canonical_url: String,
	pub clean_url: Option<String>,
	pub content_type: Option<String>,
	pub layout_type: Option<LayoutType>,
	pub status: ParseStatus,
	pub review_status: ReviewStatus,
	pub queue_priority: i32,
	pub tags: Vec<String>,
	pub is_nsfw: bool,
	pub platform_id: Option<String>,
	pub title: Option<String>,
	pub body: Option<String>,
	pub summary: Option<String>,
	pub author_name: Option<String>,
	pub author_id: Option<String>,
	pub author_avatar_url: Option<String>,
	pub author_url: Option<String>,
	pub cover_url: Option<String>,
	pub media_urls: Vec<String>,
	pub archive_metadata: Option<ArchiveMetadata>,
	pub stats: ContentStats,
	pub failure_count: i32,
	pub last_error: Option<String>,
	pub last_error_type: Option<String>,
	pub last_error_at: Option<DateTime<Utc>>,
	pub deleted_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub published_at: Option<DateTime<Utc>>,
}

impl Content {
	/// Whether this content is eligible to be matched by the Rule Engine and
	/// enqueued: parsed, not soft-deleted, and either approved or still
	/// pending human review.
	pub fn is_enqueueable(&self) -> bool {
		self.deleted_at.is_none() && self.status == ParseStatus::ParseSuccess
	}
}

/// Append-only record of one share/submission of a URL. Never mutated after
/// creation; a Content row may own many of these.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContentSource {
	pub content_id: ContentId,
	pub shared_by: Option<String>,
	pub share_context: Option<String>,
	pub tags_snapshot: Vec<String>,
	pub note: Option<String>,
	pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn review_status_is_approved() {
		assert!(ReviewStatus::Approved.is_approved());
		assert!(ReviewStatus::AutoApproved.is_approved());
		assert!(!ReviewStatus::Pending.is_approved());
		assert!(!ReviewStatus::Rejected.is_approved());
	}

	#[test]
	fn archive_metadata_fully_processed() {
		let mut archive = ArchiveMetadata::default();
		assert!(archive.fully_processed());

		archive.images.push(ArchiveImage {
			url: "https://cdn.example/a.jpg".into(),
			..Default::default()
		});
		assert!(!archive.fully_processed());

		archive.images[0].stored_key = Some("ns/blobs/sha256/ab/cd/abcd....webp".into());
		assert!(archive.fully_processed());
	}
}
