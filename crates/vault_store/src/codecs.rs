//! String <-> enum round-trips for columns stored as plain TEXT. Each enum
//! already carries an `as_str`; these add the missing parse direction so a
//! row read back from sqlite can't silently coerce an unknown value.

use vault_domain::{
	AuthorMode, ChatType, ContentMode, LayoutType, LinkMode, MediaMode, NsfwPolicy, ParseStatus, QueueItemStatus, ReviewStatus,
	TagsMatchMode,
};

use crate::error::StoreError;

pub fn parse_status(s: &str) -> Result<ParseStatus, StoreError> {
	match s {
		"unprocessed" => Ok(ParseStatus::Unprocessed),
		"processing" => Ok(ParseStatus::Processing),
		"parse_success" => Ok(ParseStatus::ParseSuccess),
		"parse_failed" => Ok(ParseStatus::ParseFailed),
		other => Err(StoreError::InvalidEnum(format!("ParseStatus: {other}"))),
	}
}

pub fn review_status(s: &str) -> Result<ReviewStatus, StoreError> {
	match s {
		"pending" => Ok(ReviewStatus::Pending),
		"approved" => Ok(ReviewStatus::Approved),
		"rejected" => Ok(ReviewStatus::Rejected),
		"auto_approved" => Ok(ReviewStatus::AutoApproved),
		other => Err(StoreError::InvalidEnum(format!("ReviewStatus: {other}"))),
	}
}

pub fn layout_type(s: &str) -> Result<LayoutType, StoreError> {
	match s {
		"article" => Ok(LayoutType::Article),
		"video" => Ok(LayoutType::Video),
		"gallery" => Ok(LayoutType::Gallery),
		"audio" => Ok(LayoutType::Audio),
		"link" => Ok(LayoutType::Link),
		other => Err(StoreError::InvalidEnum(format!("LayoutType: {other}"))),
	}
}

pub fn chat_type(s: &str) -> Result<ChatType, StoreError> {
	match s {
		"channel" => Ok(ChatType::Channel),
		"group" => Ok(ChatType::Group),
		"supergroup" => Ok(ChatType::Supergroup),
		"private" => Ok(ChatType::Private),
		"qq_group" => Ok(ChatType::QqGroup),
		"qq_private" => Ok(ChatType::QqPrivate),
		other => Err(StoreError::InvalidEnum(format!("ChatType: {other}"))),
	}
}

pub fn nsfw_policy(s: &str) -> Result<NsfwPolicy, StoreError> {
	match s {
		"allow" => Ok(NsfwPolicy::Allow),
		"block" => Ok(NsfwPolicy::Block),
		"separate_channel" => Ok(NsfwPolicy::SeparateChannel),
		other => Err(StoreError::InvalidEnum(format!("NsfwPolicy: {other}"))),
	}
}

pub fn tags_match_mode(s: &str) -> Result<TagsMatchMode, StoreError> {
	match s {
		"any" => Ok(TagsMatchMode::Any),
		"all" => Ok(TagsMatchMode::All),
		other => Err(StoreError::InvalidEnum(format!("TagsMatchMode: {other}"))),
	}
}

pub fn queue_item_status(s: &str) -> Result<QueueItemStatus, StoreError> {
	match s {
		"pending" => Ok(QueueItemStatus::Pending),
		"scheduled" => Ok(QueueItemStatus::Scheduled),
		"processing" => Ok(QueueItemStatus::Processing),
		"success" => Ok(QueueItemStatus::Success),
		"failed" => Ok(QueueItemStatus::Failed),
		"skipped" => Ok(QueueItemStatus::Skipped),
		"canceled" => Ok(QueueItemStatus::Canceled),
		other => Err(StoreError::InvalidEnum(format!("QueueItemStatus: {other}"))),
	}
}

pub fn author_mode(s: &str) -> Result<AuthorMode, StoreError> {
	match s {
		"none" => Ok(AuthorMode::None),
		"name" => Ok(AuthorMode::Name),
		"full" => Ok(AuthorMode::Full),
		other => Err(StoreError::InvalidEnum(format!("AuthorMode: {other}"))),
	}
}

pub fn content_mode(s: &str) -> Result<ContentMode, StoreError> {
	match s {
		"hidden" => Ok(ContentMode::Hidden),
		"summary" => Ok(ContentMode::Summary),
		"full" => Ok(ContentMode::Full),
		other => Err(StoreError::InvalidEnum(format!("ContentMode: {other}"))),
	}
}

pub fn media_mode(s: &str) -> Result<MediaMode, StoreError> {
	match s {
		"none" => Ok(MediaMode::None),
		"auto" => Ok(MediaMode::Auto),
		"all" => Ok(MediaMode::All),
		"cover" => Ok(MediaMode::Cover),
		other => Err(StoreError::InvalidEnum(format!("MediaMode: {other}"))),
	}
}

pub fn link_mode(s: &str) -> Result<LinkMode, StoreError> {
	match s {
		"none" => Ok(LinkMode::None),
		"clean" => Ok(LinkMode::Clean),
		"original" => Ok(LinkMode::Original),
		other => Err(StoreError::InvalidEnum(format!("LinkMode: {other}"))),
	}
}
