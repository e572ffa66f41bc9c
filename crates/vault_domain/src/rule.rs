use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::{BotChatId, DistributionRuleId, DistributionTargetId};

/// How a rule's `tags` predicate combines with the content's tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TagsMatchMode {
	#[default]
	Any,
	All,
}

impl TagsMatchMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			TagsMatchMode::Any => "any",
			TagsMatchMode::All => "all",
		}
	}
}

/// How a rule routes NSFW content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum NsfwPolicy {
	Allow,
	#[default]
	Block,
	SeparateChannel,
}

impl NsfwPolicy {
	pub const fn as_str(self) -> &'static str {
		match self {
			NsfwPolicy::Allow => "allow",
			NsfwPolicy::Block => "block",
			NsfwPolicy::SeparateChannel => "separate_channel",
		}
	}
}

/// Match predicate for a `DistributionRule`. Reused verbatim for
/// `auto_approve_conditions` evaluation (see the Rule Engine).
///
/// An empty `tags` list means "don't care" rather than "match nothing".
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatchConditions {
	pub tags: Vec<String>,
	pub tags_match_mode: TagsMatchMode,
	pub platforms: Vec<String>,
	pub is_nsfw: Option<bool>,
	pub content_type: Option<String>,
	pub source: Option<String>,
}

/// How a content should be presented on a sink. Unknown keys in the
/// underlying JSON blob are preserved by the crate that persists this; only
/// the fields this core consumes are surfaced here.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderConfig {
	pub show_platform_id: bool,
	pub show_title: bool,
	pub show_tags: bool,
	pub author_mode: AuthorMode,
	pub content_mode: ContentMode,
	pub media_mode: MediaMode,
	pub link_mode: LinkMode,
	pub header_text: Option<String>,
	pub footer_text: Option<String>,
}

impl RenderConfig {
	/// Merge `self` (the rule-level config) with a target-level override,
	/// where `Some`/non-default fields on the override win. Mirrors the
	/// "target wins for non-null fields" rule in the Distribution Scheduler.
	pub fn merged_with_override(&self, over: &RenderConfigOverride) -> RenderConfig {
		RenderConfig {
			show_platform_id: over.show_platform_id.unwrap_or(self.show_platform_id),
			show_title: over.show_title.unwrap_or(self.show_title),
			show_tags: over.show_tags.unwrap_or(self.show_tags),
			author_mode: over.author_mode.unwrap_or(self.author_mode),
			content_mode: over.content_mode.unwrap_or(self.content_mode),
			media_mode: over.media_mode.unwrap_or(self.media_mode),
			link_mode: over.link_mode.unwrap_or(self.link_mode),
			header_text: over.header_text.clone().or_else(|| self.header_text.clone()),
			footer_text: over.footer_text.clone().or_else(|| self.footer_text.clone()),
		}
	}
}

/// A sparse override of `RenderConfig`, stored on a `DistributionTarget`.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RenderConfigOverride {
	pub show_platform_id: Option<bool>,
	pub show_title: Option<bool>,
	pub show_tags: Option<bool>,
	pub author_mode: Option<AuthorMode>,
	pub content_mode: Option<ContentMode>,
	pub media_mode: Option<MediaMode>,
	pub link_mode: Option<LinkMode>,
	pub header_text: Option<String>,
	pub footer_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AuthorMode {
	None,
	#[default]
	Name,
	Full,
}

impl AuthorMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthorMode::None => "none",
			AuthorMode::Name => "name",
			AuthorMode::Full => "full",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ContentMode {
	Hidden,
	Summary,
	#[default]
	Full,
}

impl ContentMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			ContentMode::Hidden => "hidden",
			ContentMode::Summary => "summary",
			ContentMode::Full => "full",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MediaMode {
	None,
	#[default]
	Auto,
	All,
	Cover,
}

impl MediaMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			MediaMode::None => "none",
			MediaMode::Auto => "auto",
			MediaMode::All => "all",
			MediaMode::Cover => "cover",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LinkMode {
	None,
	#[default]
	Clean,
	Original,
}

impl LinkMode {
	pub const fn as_str(self) -> &'static str {
		match self {
			LinkMode::None => "none",
			LinkMode::Clean => "clean",
			LinkMode::Original => "original",
		}
	}
}

/// A named filter and push configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistributionRule {
	pub id: DistributionRuleId,
	pub name: String,
	pub match_conditions: MatchConditions,
	pub enabled: bool,
	pub priority: i32,
	pub nsfw_policy: NsfwPolicy,
	pub approval_required: bool,
	pub auto_approve_conditions: Option<MatchConditions>,
	pub rate_limit: Option<i64>,
	pub time_window_secs: Option<i64>,
	pub render_config: RenderConfig,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A link from a rule to a sink, with per-link render overrides.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistributionTarget {
	pub id: DistributionTargetId,
	pub rule_id: DistributionRuleId,
	pub bot_chat_id: BotChatId,
	pub enabled: bool,
	pub render_config_override: RenderConfigOverride,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn render_config_override_wins_on_set_fields() {
		let base = RenderConfig {
			show_title: true,
			content_mode: ContentMode::Full,
			header_text: Some("base header".into()),
			..Default::default()
		};
		let over = RenderConfigOverride {
			content_mode: Some(ContentMode::Summary),
			..Default::default()
		};
		let merged = base.merged_with_override(&over);
		assert_eq!(merged.content_mode, ContentMode::Summary);
		assert!(merged.show_title);
		assert_eq!(merged.header_text.as_deref(), Some("base header"));
	}

	#[test]
	fn tags_match_mode_defaults_to_any() {
		assert_eq!(TagsMatchMode::default(), TagsMatchMode::Any);
	}
}
