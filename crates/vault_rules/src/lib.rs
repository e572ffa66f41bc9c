#![forbid(unsafe_code)]

//! The Rule Engine (component G, §4.G): matches a `Content` against a
//! `DistributionRule`'s conditions and computes the per-target push
//! decision (filtered / pending review / will push), including NSFW
//! routing.

use vault_domain::{BotChat, Content, DistributionRule, MatchConditions, NsfwPolicy, NsfwRoutingResult, TagsMatchMode};

/// Why a (Content, Rule, BotChat) triple was filtered out, surfaced on
/// `Decision::Filtered` for diagnostics and preview UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
	/// Content has not been reviewed and the rule does not opt into
	/// pushing unreviewed content.
	NotReviewed,
	/// `nsfw_policy = block` and the content is NSFW.
	NsfwBlocked,
	/// `nsfw_policy = separate_channel` and the chat has no configured
	/// NSFW sibling channel.
	NsfwNoTarget,
}

impl FilterReason {
	pub const fn as_str(self) -> &'static str {
		match self {
			FilterReason::NotReviewed => "not_reviewed",
			FilterReason::NsfwBlocked => "nsfw_blocked",
			FilterReason::NsfwNoTarget => "nsfw_no_target",
		}
	}
}

/// The Rule Engine's per-target bucket, mirroring the three-way outcome
/// used by the preview/status surfaces (`PreviewItemStatus` upstream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	Filtered(FilterReason),
	PendingReview { target_id: String },
	WillPush { target_id: String },
}

impl Decision {
	pub fn target_id(&self) -> Option<&str> {
		match self {
			Decision::Filtered(_) => None,
			Decision::PendingReview { target_id } | Decision::WillPush { target_id } => Some(target_id),
		}
	}

	pub fn as_nsfw_routing_result(&self) -> Option<NsfwRoutingResult> {
		self.target_id().map(|target_id| NsfwRoutingResult { target_id: Some(target_id.to_string()) })
	}
}

/// Whether `content`'s tags satisfy `conditions.tags` under
/// `conditions.tags_match_mode`. An empty `tags` list is "don't care" and
/// always matches (the resolved reading of the spec's Open Question #5).
fn tags_match(content_tags: &[String], conditions: &MatchConditions) -> bool {
	if conditions.tags.is_empty() {
		return true;
	}
	match conditions.tags_match_mode {
		TagsMatchMode::Any => conditions.tags.iter().any(|tag| content_tags.iter().any(|t| t == tag)),
		TagsMatchMode::All => conditions.tags.iter().all(|tag| content_tags.iter().any(|t| t == tag)),
	}
}

fn platform_matches(content: &Content, conditions: &MatchConditions) -> bool {
	if conditions.platforms.is_empty() {
		return true;
	}
	conditions.platforms.iter().any(|p| p.eq_ignore_ascii_case(content.platform.as_str()))
}

fn nsfw_matches(content: &Content, conditions: &MatchConditions) -> bool {
	match conditions.is_nsfw {
		None => true,
		Some(expected) => expected == content.is_nsfw,
	}
}

fn content_type_matches(content: &Content, conditions: &MatchConditions) -> bool {
	match &conditions.content_type {
		None => true,
		Some(expected) => content.content_type.as_deref() == Some(expected.as_str()),
	}
}

/// `conditions.source` matches against the share context of the submission
/// that is driving this evaluation (a content may carry several sources
/// over its lifetime; the caller passes whichever one is relevant — the
/// latest one for the Enqueue Service, a specific one for a manual re-run).
fn source_matches(share_context: Option<&str>, conditions: &MatchConditions) -> bool {
	match &conditions.source {
		None => true,
		Some(expected) => share_context == Some(expected.as_str()),
	}
}

/// Evaluates whether `content` (as shared via `share_context`, if any)
/// satisfies `conditions`. Used both for `DistributionRule::match_conditions`
/// and, reused verbatim, for `DistributionRule::auto_approve_conditions`
/// (§4.G "reused rather than duplicated").
pub fn matches(content: &Content, share_context: Option<&str>, conditions: &MatchConditions) -> bool {
	tags_match(&content.tags, conditions)
		&& platform_matches(content, conditions)
		&& nsfw_matches(content, conditions)
		&& content_type_matches(content, conditions)
		&& source_matches(share_context, conditions)
}

/// Whether `content` qualifies for `rule.auto_approve_conditions`. `false`
/// if the rule has none configured.
pub fn qualifies_for_auto_approval(content: &Content, share_context: Option<&str>, rule: &DistributionRule) -> bool {
	match &rule.auto_approve_conditions {
		None => false,
		Some(conditions) => matches(content, share_context, conditions),
	}
}

/// The per-target decision (§4.G steps 1-3): `require_approval` is whether
/// the content has not yet cleared review (`review_status == pending`).
pub fn evaluate_target_decision(
	content: &Content,
	rule: &DistributionRule,
	bot_chat: &BotChat,
	require_approval: bool,
) -> Decision {
	if require_approval && !rule.approval_required {
		return Decision::Filtered(FilterReason::NotReviewed);
	}

	let target_id = match rule.nsfw_policy {
		NsfwPolicy::Block if content.is_nsfw => return Decision::Filtered(FilterReason::NsfwBlocked),
		NsfwPolicy::SeparateChannel if content.is_nsfw => match &bot_chat.nsfw_chat_id {
			Some(nsfw_chat_id) => nsfw_chat_id.clone(),
			None => return Decision::Filtered(FilterReason::NsfwNoTarget),
		},
		_ => bot_chat.chat_id.clone(),
	};

	if require_approval {
		Decision::PendingReview { target_id }
	} else {
		Decision::WillPush { target_id }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use vault_domain::{
		BotChatId, ChatType, ContentId, ContentStats, DistributionRuleId, LayoutType, ParseStatus, Platform, RenderConfig,
		ReviewStatus,
	};

	fn sample_content(tags: &[&str], is_nsfw: bool) -> Content {
		let now = Utc::now();
		Content {
			id: ContentId::new(1),
			platform: Platform::Bilibili,
			url: "https://b23.tv/x".into(),
			canonical_url: "https://www.bilibili.com/video/BV1xx".into(),
			clean_url: None,
			content_type: Some("video".into()),
			layout_type: Some(LayoutType::Video),
			status: ParseStatus::ParseSuccess,
			review_status: ReviewStatus::Pending,
			queue_priority: 0,
			tags: tags.iter().map(|t| t.to_string()).collect(),
			is_nsfw,
			platform_id: Some("BV1xx".into()),
			title: Some("a video".into()),
			body: None,
			summary: None,
			author_name: None,
			author_id: None,
			author_avatar_url: None,
			author_url: None,
			cover_url: None,
			media_urls: vec![],
			archive_metadata: None,
			stats: ContentStats::default(),
			failure_count: 0,
			last_error: None,
			last_error_type: None,
			last_error_at: None,
			deleted_at: None,
			created_at: now,
			updated_at: now,
			published_at: None,
		}
	}

	fn sample_rule(nsfw_policy: NsfwPolicy, approval_required: bool) -> DistributionRule {
		let now = Utc::now();
		DistributionRule {
			id: DistributionRuleId::new(1),
			name: "r".into(),
			match_conditions: MatchConditions::default(),
			enabled: true,
			priority: 0,
			nsfw_policy,
			approval_required,
			auto_approve_conditions: None,
			rate_limit: None,
			time_window_secs: None,
			render_config: RenderConfig::default(),
			created_at: now,
			updated_at: now,
		}
	}

	fn sample_chat(nsfw_chat_id: Option<&str>) -> BotChat {
		BotChat {
			id: BotChatId::new(1),
			chat_id: "-100111".into(),
			chat_type: ChatType::Channel,
			enabled: true,
			is_accessible: true,
			nsfw_chat_id: nsfw_chat_id.map(|s| s.to_string()),
			total_pushed: 0,
			last_pushed_at: None,
		}
	}

	#[test]
	fn empty_tags_list_is_dont_care() {
		let content = sample_content(&["music"], false);
		let conditions = MatchConditions::default();
		assert!(matches(&content, None, &conditions));
	}

	#[test]
	fn any_mode_requires_one_overlapping_tag() {
		let content = sample_content(&["music", "live"], false);
		let conditions = MatchConditions { tags: vec!["live".into(), "art".into()], ..Default::default() };
		assert!(matches(&content, None, &conditions));

		let conditions_none = MatchConditions { tags: vec!["art".into()], ..Default::default() };
		assert!(!matches(&content, None, &conditions_none));
	}

	#[test]
	fn all_mode_requires_every_tag() {
		let content = sample_content(&["music", "live"], false);
		let conditions = MatchConditions {
			tags: vec!["music".into(), "live".into()],
			tags_match_mode: TagsMatchMode::All,
			..Default::default()
		};
		assert!(matches(&content, None, &conditions));

		let missing_one =
			MatchConditions { tags: vec!["music".into(), "art".into()], tags_match_mode: TagsMatchMode::All, ..Default::default() };
		assert!(!matches(&content, None, &missing_one));
	}

	#[test]
	fn not_reviewed_is_filtered_unless_rule_allows_approval_flow() {
		let content = sample_content(&[], false);
		let rule = sample_rule(NsfwPolicy::Block, false);
		let chat = sample_chat(None);
		assert_eq!(
			evaluate_target_decision(&content, &rule, &chat, true),
			Decision::Filtered(FilterReason::NotReviewed)
		);

		let approval_rule = sample_rule(NsfwPolicy::Block, true);
		assert_eq!(
			evaluate_target_decision(&content, &approval_rule, &chat, true),
			Decision::PendingReview { target_id: "-100111".into() }
		);
	}

	#[test]
	fn nsfw_block_filters() {
		let content = sample_content(&[], true);
		let rule = sample_rule(NsfwPolicy::Block, false);
		let chat = sample_chat(None);
		assert_eq!(evaluate_target_decision(&content, &rule, &chat, false), Decision::Filtered(FilterReason::NsfwBlocked));
	}

	#[test]
	fn nsfw_separate_channel_routes_or_filters() {
		let content = sample_content(&[], true);
		let rule = sample_rule(NsfwPolicy::SeparateChannel, false);

		let chat_without_nsfw = sample_chat(None);
		assert_eq!(
			evaluate_target_decision(&content, &rule, &chat_without_nsfw, false),
			Decision::Filtered(FilterReason::NsfwNoTarget)
		);

		let chat_with_nsfw = sample_chat(Some("-100999"));
		assert_eq!(
			evaluate_target_decision(&content, &rule, &chat_with_nsfw, false),
			Decision::WillPush { target_id: "-100999".into() }
		);
	}

	#[test]
	fn auto_approval_reuses_match_conditions_evaluator() {
		let content = sample_content(&["safe"], false);
		let mut rule = sample_rule(NsfwPolicy::Block, false);
		rule.auto_approve_conditions = Some(MatchConditions { tags: vec!["safe".into()], ..Default::default() });
		assert!(qualifies_for_auto_approval(&content, None, &rule));

		rule.auto_approve_conditions = Some(MatchConditions { tags: vec!["nope".into()], ..Default::default() });
		assert!(!qualifies_for_auto_approval(&content, None, &rule));
	}
}
