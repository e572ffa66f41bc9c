//! The Enqueue Service (component H, §4.H): turns a successfully parsed,
//! reviewed `Content` into zero or more `content_queue_items`, one per
//! `(rule, target)` pair the Rule Engine says should receive it.

use chrono::{DateTime, Utc};
use vault_domain::{BotChatId, ContentId, DistributionRule, QueueItemStatus, ReviewStatus};
use vault_events::EventBus;
use vault_store::queue_item::NewQueueItem;
use vault_store::{VaultPool, chat, content, queue_item, rule};

use crate::error::DistributionError;

/// Queue items created without an explicit retry budget get this many
/// attempts before going terminal (§4.I).
const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Evaluates every enabled rule against `content_id` and creates (or, with
/// `force`, resets) the queue items the Rule Engine says should exist.
/// Publishes `queue_updated` once if anything actually changed.
pub async fn enqueue_content(
	pool: &VaultPool,
	bus: &EventBus,
	content_id: ContentId,
	force: bool,
) -> Result<usize, DistributionError> {
	let item = content::get_by_id(pool, content_id).await?.ok_or(DistributionError::ContentNotFound(content_id.get()))?;
	if !item.is_enqueueable() {
		return Err(DistributionError::ContentNotEnqueueable(content_id.get()));
	}

	let require_approval = match item.review_status {
		ReviewStatus::Approved | ReviewStatus::AutoApproved => false,
		ReviewStatus::Pending => true,
		ReviewStatus::Rejected => return Err(DistributionError::ContentNotEnqueueable(content_id.get())),
	};

	// The Enqueue Service evaluates `conditions.source` against the latest
	// submission, not every submission the content has ever had (§4.G).
	let share_context = content::list_sources(pool, content_id).await?.into_iter().last().and_then(|s| s.share_context);

	let rules = rule::list_enabled_rules(pool).await?;
	let mut items_changed = 0usize;

	for r in &rules {
		if require_approval && !r.approval_required {
			continue;
		}
		if !vault_rules::matches(&item, share_context.as_deref(), &r.match_conditions) {
			continue;
		}

		let targets = rule::list_targets_for_rule(pool, r.id).await?;
		for target in &targets {
			let Some(bot_chat) = chat::get(pool, target.bot_chat_id).await? else { continue };
			if !bot_chat.is_usable() {
				continue;
			}

			let decision = vault_rules::evaluate_target_decision(&item, r, &bot_chat, require_approval);
			let target_id = match decision.target_id() {
				Some(id) => id.to_string(),
				None => continue,
			};
			let needs_approval = matches!(decision, vault_rules::Decision::PendingReview { .. });
			let routing_result = decision.as_nsfw_routing_result();

			let existing = queue_item::get_for_content_rule_chat(pool, content_id, r.id, target.bot_chat_id).await?;
			match existing {
				Some(existing) if existing.status == QueueItemStatus::Success && !force => continue,
				Some(existing) if existing.status == QueueItemStatus::Failed && force => {
					let scheduled_at = compute_auto_scheduled_at(pool, r, target.bot_chat_id, &target_id).await?;
					queue_item::reset_for_force_reenqueue(
						pool,
						existing.id,
						bot_chat.platform_type().as_str(),
						&target_id,
						routing_result.as_ref(),
						needs_approval,
						Some(scheduled_at),
					)
					.await?;
					items_changed += 1;
				}
				Some(_) => continue,
				None => {
					let scheduled_at = compute_auto_scheduled_at(pool, r, target.bot_chat_id, &target_id).await?;
					let new = NewQueueItem {
						content_id,
						rule_id: r.id,
						bot_chat_id: target.bot_chat_id,
						target_platform: bot_chat.platform_type().as_str().to_string(),
						target_id: target_id.clone(),
						priority: r.priority + item.queue_priority,
						scheduled_at: Some(scheduled_at),
						needs_approval,
						max_attempts: DEFAULT_MAX_ATTEMPTS,
					};
					if queue_item::insert_if_absent(pool, new).await?.is_some() {
						items_changed += 1;
					}
				}
			}
		}
	}

	if items_changed > 0 {
		bus.publish(
			"queue_updated",
			serde_json::json!({"action": "enqueue", "content_id": content_id.get(), "items_changed": items_changed}),
		)
		.await?;
	}

	Ok(items_changed)
}

/// Picks a `scheduled_at` that respects `rule.rate_limit`/`time_window_secs`
/// for this `(bot_chat, target)` pair, stacking behind whatever is already
/// queued or recently pushed rather than bursting everything at the window
/// boundary (§4.H `compute_auto_scheduled_at`).
async fn compute_auto_scheduled_at(
	pool: &VaultPool,
	rule: &DistributionRule,
	bot_chat_id: BotChatId,
	target_id: &str,
) -> Result<DateTime<Utc>, DistributionError> {
	let now = Utc::now();

	let (rate_limit, time_window) = match (rule.rate_limit, rule.time_window_secs) {
		(Some(rate_limit), Some(time_window)) if rate_limit > 0 && time_window > 0 => (rate_limit, time_window),
		_ => return Ok(now),
	};
	let min_interval = (time_window / rate_limit).max(1);

	let queued_anchor = queue_item::latest_due_time(pool, bot_chat_id).await?;
	let pushed_anchor = queue_item::latest_pushed_at(pool, target_id).await?;
	let anchor = match (queued_anchor, pushed_anchor) {
		(Some(a), Some(b)) => Some(a.max(b)),
		(a, b) => a.or(b),
	};

	let mut scheduled_at = match anchor {
		Some(anchor) => now.max(anchor + chrono::Duration::seconds(min_interval)),
		None => now,
	};

	let (recent_count, earliest_in_window) = queue_item::successes_in_window(pool, target_id, time_window).await?;
	if recent_count >= rate_limit
		&& let Some(earliest) = earliest_in_window
	{
		scheduled_at = scheduled_at.max(earliest + chrono::Duration::seconds(time_window));
	}

	Ok(scheduled_at)
}

#[cfg(test)]
mod tests {
	use super::*;
	use vault_domain::{ChatType, MatchConditions, NsfwPolicy, Platform, RenderConfig};
	use vault_store::content::{InsertOutcome, NewContent, ParsedFields, insert_or_get};
	use vault_store::rule::{NewRule, insert_rule};

	async fn seed_parsed_content(pool: &VaultPool) -> ContentId {
		let content = match insert_or_get(
			pool,
			NewContent {
				platform: Platform::Twitter,
				url: "https://x.com/a/status/1".into(),
				canonical_url: "https://x.com/a/status/1".into(),
				tags: vec!["music".into()],
				queue_priority: 0,
			},
		)
		.await
		.unwrap()
		{
			InsertOutcome::Created(c) => c,
			InsertOutcome::AlreadyExists(c) => c,
		};

		content::apply_parsed_fields(
			pool,
			content.id,
			ParsedFields {
				clean_url: Some("https://x.com/a/status/1".into()),
				content_type: Some("post".into()),
				layout_type: vault_domain::LayoutType::Article,
				platform_id: Some("1".into()),
				title: Some("hi".into()),
				body: None,
				summary: None,
				author_name: None,
				author_id: None,
				author_avatar_url: None,
				author_url: None,
				cover_url: None,
				media_urls: vec![],
				is_nsfw: false,
				stats: Default::default(),
				published_at: None,
			},
		)
		.await
		.unwrap();
		content::set_review_status(pool, content.id, ReviewStatus::Approved).await.unwrap();
		content.id
	}

	async fn seed_rule_and_target(pool: &VaultPool, rate_limit: Option<i64>, time_window_secs: Option<i64>) -> BotChatId {
		let rule = insert_rule(
			pool,
			NewRule {
				name: "default".into(),
				match_conditions: MatchConditions { tags: vec!["music".into()], ..Default::default() },
				enabled: true,
				priority: 5,
				nsfw_policy: NsfwPolicy::Block,
				approval_required: false,
				auto_approve_conditions: None,
				rate_limit,
				time_window_secs,
				render_config: RenderConfig::default(),
			},
		)
		.await
		.unwrap();
		let bot_chat = chat::insert(pool, "-100111", ChatType::Channel, None).await.unwrap();
		rule::insert_target(pool, rule.id, bot_chat.id, &Default::default()).await.unwrap();
		bot_chat.id
	}

	#[tokio::test]
	async fn enqueue_creates_one_item_per_matching_target() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let content_id = seed_parsed_content(&pool).await;
		seed_rule_and_target(&pool, None, None).await;

		let changed = enqueue_content(&pool, &bus, content_id, false).await.unwrap();
		assert_eq!(changed, 1);

		let changed_again = enqueue_content(&pool, &bus, content_id, false).await.unwrap();
		assert_eq!(changed_again, 0);
	}

	#[tokio::test]
	async fn force_reenqueue_resets_a_failed_item() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let content_id = seed_parsed_content(&pool).await;
		seed_rule_and_target(&pool, None, None).await;

		enqueue_content(&pool, &bus, content_id, false).await.unwrap();
		let rules = rule::list_enabled_rules(&pool).await.unwrap();
		let targets = rule::list_targets_for_rule(&pool, rules[0].id).await.unwrap();
		let item = queue_item::get_for_content_rule_chat(&pool, content_id, rules[0].id, targets[0].bot_chat_id)
			.await
			.unwrap()
			.unwrap();
		queue_item::record_failure(&pool, item.id, "boom", "transport", None).await.unwrap();

		let changed = enqueue_content(&pool, &bus, content_id, true).await.unwrap();
		assert_eq!(changed, 1);
		let reloaded = queue_item::get(&pool, item.id).await.unwrap().unwrap();
		assert_eq!(reloaded.status, QueueItemStatus::Scheduled);
	}

	#[tokio::test]
	async fn rate_limited_rule_schedules_after_existing_queue() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let first = seed_parsed_content(&pool).await;
		seed_rule_and_target(&pool, Some(1), Some(3600)).await;

		enqueue_content(&pool, &bus, first, false).await.unwrap();
		let rules = rule::list_enabled_rules(&pool).await.unwrap();
		let targets = rule::list_targets_for_rule(&pool, rules[0].id).await.unwrap();
		let first_item = queue_item::get_for_content_rule_chat(&pool, first, rules[0].id, targets[0].bot_chat_id)
			.await
			.unwrap()
			.unwrap();

		let second = match vault_store::content::insert_or_get(
			&pool,
			NewContent {
				platform: Platform::Twitter,
				url: "https://x.com/a/status/2".into(),
				canonical_url: "https://x.com/a/status/2".into(),
				tags: vec!["music".into()],
				queue_priority: 0,
			},
		)
		.await
		.unwrap()
		{
			InsertOutcome::Created(c) => c.id,
			InsertOutcome::AlreadyExists(c) => c.id,
		};
		content::apply_parsed_fields(
			&pool,
			second,
			ParsedFields {
				clean_url: None,
				content_type: None,
				layout_type: vault_domain::LayoutType::Article,
				platform_id: None,
				title: None,
				body: None,
				summary: None,
				author_name: None,
				author_id: None,
				author_avatar_url: None,
				author_url: None,
				cover_url: None,
				media_urls: vec![],
				is_nsfw: false,
				stats: Default::default(),
				published_at: None,
			},
		)
		.await
		.unwrap();
		content::set_review_status(&pool, second, ReviewStatus::Approved).await.unwrap();

		enqueue_content(&pool, &bus, second, false).await.unwrap();
		let second_item = queue_item::get_for_content_rule_chat(&pool, second, rules[0].id, targets[0].bot_chat_id)
			.await
			.unwrap()
			.unwrap();

		assert!(second_item.scheduled_at.unwrap() >= first_item.scheduled_at.unwrap() + chrono::Duration::seconds(3600));
	}
}
