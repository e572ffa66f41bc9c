//! The Distribution Scheduler Worker Pool (component I, §4.I): a handful of
//! workers that claim due `content_queue_items`, render and push each one
//! through the sink for its target platform, and record the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vault_domain::{Content, ContentQueueItem, DistributionTarget, PlatformType, PushedRecord, QueueItemStatus};
use vault_events::EventBus;
use vault_store::{VaultPool, chat, content, queue_item, rule};

use crate::error::{DistributionError, SinkError};
use crate::payload::build_content_payload;
use crate::sinks::PushSink;

/// How long an idle worker sleeps before re-polling for due work.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Items claimed per poll, per worker.
const BATCH_SIZE: i64 = 10;
/// Retry backoff base and ceiling (§4.I `_handle_failure`: `min(base * 2^n, ceiling)`).
const BACKOFF_BASE_SECS: i64 = 60;
const BACKOFF_CEILING_SECS: i64 = 3600;

/// One `PushSink` per destination platform. Platforms with no sink
/// configured are simply never matched by any `BotChat` in that platform's
/// family, so claims for them never occur in practice.
#[derive(Clone, Default)]
pub struct Sinks {
	sinks: HashMap<PlatformType, Arc<dyn PushSink>>,
}

impl Sinks {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_sink(mut self, platform: PlatformType, sink: Arc<dyn PushSink>) -> Self {
		self.sinks.insert(platform, sink);
		self
	}

	fn get(&self, platform: PlatformType) -> Option<&Arc<dyn PushSink>> {
		self.sinks.get(&platform)
	}
}

/// Runs one worker's claim/process loop until `shutdown` is cancelled.
pub async fn run_worker(pool: VaultPool, bus: EventBus, sinks: Arc<Sinks>, worker_id: String, shutdown: CancellationToken) {
	loop {
		if shutdown.is_cancelled() {
			return;
		}

		let claimed = match queue_item::claim_batch(&pool, &worker_id, BATCH_SIZE).await {
			Ok(items) => items,
			Err(err) => {
				warn!(worker_id = %worker_id, error = %err, "distribution worker: claim failed, backing off");
				Vec::new()
			}
		};

		if claimed.is_empty() {
			tokio::select! {
				_ = shutdown.cancelled() => return,
				_ = tokio::time::sleep(POLL_INTERVAL) => {}
			}
			continue;
		}

		for item in claimed {
			if let Err(err) = process_claimed_item(&pool, &bus, &sinks, item).await {
				warn!(worker_id = %worker_id, error = %err, "distribution worker: item processing failed");
			}
		}
	}
}

/// Spawns `worker_count` workers sharing one pool/bus/sinks set, returning
/// their join handles so the caller can await clean shutdown.
pub fn spawn_pool(
	pool: VaultPool,
	bus: EventBus,
	sinks: Arc<Sinks>,
	worker_count: usize,
	shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
	(0..worker_count)
		.map(|n| {
			let worker_id = format!("distribution-worker-{n}");
			let pool = pool.clone();
			let bus = bus.clone();
			let sinks = sinks.clone();
			let shutdown = shutdown.clone();
			tokio::spawn(async move {
				info!(worker_id = %worker_id, "distribution worker: starting");
				run_worker(pool, bus, sinks, worker_id, shutdown).await;
			})
		})
		.collect()
}

/// One already-claimed item through reload, eligibility, dedup, push, and
/// outcome recording (§4.I steps 3-5).
async fn process_claimed_item(
	pool: &VaultPool,
	bus: &EventBus,
	sinks: &Sinks,
	item: ContentQueueItem,
) -> Result<(), DistributionError> {
	let Some(loaded) = content::get_by_id(pool, item.content_id).await? else {
		queue_item::mark_skipped(pool, item.id, "content no longer exists").await?;
		return Ok(());
	};
	let Some(rule) = rule::get_rule(pool, item.rule_id).await? else {
		queue_item::mark_skipped(pool, item.id, "rule no longer exists").await?;
		return Ok(());
	};
	let Some(bot_chat) = chat::get(pool, item.bot_chat_id).await? else {
		queue_item::mark_skipped(pool, item.id, "bot chat no longer exists").await?;
		return Ok(());
	};

	// Target guard: a chat that went inaccessible between enqueue and claim
	// is rescheduled, not failed — it costs no attempt (§4.I step "target guard").
	if !bot_chat.is_usable() {
		queue_item::reset_for_force_reenqueue(
			pool,
			item.id,
			item.target_platform.as_str(),
			&item.target_id,
			item.nsfw_routing_result.as_ref(),
			item.needs_approval,
			Some(Utc::now() + chrono::Duration::seconds(POLL_INTERVAL.as_secs() as i64)),
		)
		.await?;
		return Ok(());
	}

	if !is_eligible(&loaded) {
		queue_item::mark_skipped(pool, item.id, "not eligible: review status or parse status changed").await?;
		return Ok(());
	}

	let target_id = item.effective_target_id().to_string();
	if queue_item::already_pushed(pool, item.content_id, &target_id).await? {
		queue_item::mark_skipped(pool, item.id, "already pushed").await?;
		return Ok(());
	}

	let Some(target) = find_target(pool, item.rule_id, item.bot_chat_id).await? else {
		queue_item::mark_skipped(pool, item.id, "distribution target no longer exists").await?;
		return Ok(());
	};
	let payload = build_content_payload(&loaded, &rule, &target);

	let Some(sink) = sinks.get(bot_chat.platform_type()) else {
		queue_item::record_failure(pool, item.id, "no push sink configured for this platform", "configuration", None).await?;
		return Ok(());
	};

	match sink.push(&payload, &target_id).await {
		Ok(message_id) => {
			// Telegram sometimes omits `message_id` on success; synthesize a
			// stable placeholder so the push still counts and dedups (§4.I
			// "Telegram no-id compensation").
			let message_id = match (message_id, bot_chat.platform_type()) {
				(Some(id), _) => Some(id),
				(None, PlatformType::Telegram) => {
					Some(format!("telegram-noid-{}-{}-{}", Utc::now().timestamp_millis(), item.id.get(), item.attempt_count))
				}
				(None, _) => None,
			};
			handle_success(pool, bus, &item, &target_id, message_id).await
		}
		Err(SinkError::TargetUnavailable) => {
			chat::set_accessible(pool, item.bot_chat_id, false).await?;
			queue_item::reset_for_force_reenqueue(
				pool,
				item.id,
				item.target_platform.as_str(),
				&item.target_id,
				item.nsfw_routing_result.as_ref(),
				item.needs_approval,
				Some(Utc::now() + chrono::Duration::seconds(POLL_INTERVAL.as_secs() as i64)),
			)
			.await?;
			Ok(())
		}
		Err(err) => handle_failure(pool, bus, &item, &err.to_string()).await,
	}
}

fn is_eligible(content: &Content) -> bool {
	content.review_status.is_approved() && content.status == vault_domain::ParseStatus::ParseSuccess
}

async fn find_target(
	pool: &VaultPool,
	rule_id: vault_domain::DistributionRuleId,
	bot_chat_id: vault_domain::BotChatId,
) -> Result<Option<DistributionTarget>, DistributionError> {
	let targets = rule::list_targets_for_rule(pool, rule_id).await?;
	Ok(targets.into_iter().find(|t| t.bot_chat_id == bot_chat_id))
}

async fn handle_success(
	pool: &VaultPool,
	bus: &EventBus,
	item: &ContentQueueItem,
	target_id: &str,
	message_id: Option<String>,
) -> Result<(), DistributionError> {
	queue_item::mark_success(pool, item.id, message_id.as_deref(), item.nsfw_routing_result.as_ref()).await?;
	queue_item::insert_pushed_record(
		pool,
		&PushedRecord {
			content_id: item.content_id,
			target_platform: item.target_platform.clone(),
			target_id: target_id.to_string(),
			message_id: message_id.clone(),
			push_status: "success".to_string(),
			error_message: None,
			pushed_at: Utc::now(),
		},
	)
	.await?;
	chat::record_push(pool, item.bot_chat_id).await?;

	bus.publish(
		"content_pushed",
		serde_json::json!({"content_id": item.content_id.get(), "target_id": target_id, "message_id": message_id}),
	)
	.await?;
	bus.publish(
		"distribution_push_success",
		serde_json::json!({"queue_item_id": item.id.get(), "content_id": item.content_id.get(), "target_id": target_id}),
	)
	.await?;
	bus.publish("queue_updated", serde_json::json!({"action": "push_success", "queue_item_id": item.id.get()})).await?;
	debug!(queue_item_id = item.id.get(), "distribution worker: push succeeded");
	Ok(())
}

async fn handle_failure(
	pool: &VaultPool,
	bus: &EventBus,
	item: &ContentQueueItem,
	error: &str,
) -> Result<(), DistributionError> {
	let next_attempt_count = item.attempt_count + 1;
	let next_attempt_at = if next_attempt_count >= item.max_attempts {
		None
	} else {
		let backoff = (BACKOFF_BASE_SECS * 2i64.pow(next_attempt_count as u32)).min(BACKOFF_CEILING_SECS);
		Some(Utc::now() + chrono::Duration::seconds(backoff))
	};

	queue_item::record_failure(pool, item.id, error, "push_failed", next_attempt_at).await?;

	bus.publish(
		"distribution_push_failed",
		serde_json::json!({"queue_item_id": item.id.get(), "content_id": item.content_id.get(), "error": error, "terminal": next_attempt_at.is_none()}),
	)
	.await?;
	bus.publish("queue_updated", serde_json::json!({"action": "push_failed", "queue_item_id": item.id.get()})).await?;
	Ok(())
}

/// Manual operator override (`process_item_now`, §4.I): not permitted for
/// items already in a terminal state.
pub async fn process_item_now(pool: &VaultPool, bus: &EventBus, sinks: &Sinks, id: vault_domain::QueueItemId) -> Result<(), DistributionError> {
	let item = queue_item::get(pool, id).await?.ok_or(DistributionError::QueueItemNotFound(id.get()))?;
	if item.status.is_terminal() {
		return Err(DistributionError::QueueItemNotIntervenable(id.get()));
	}

	queue_item::force_reschedule_now(pool, id).await?;
	let reloaded = queue_item::get(pool, id).await?.ok_or(DistributionError::QueueItemNotFound(id.get()))?;
	process_claimed_item(pool, bus, sinks, reloaded).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::Mutex;
	use vault_domain::{ChatType, LayoutType, MatchConditions, NsfwPolicy, Platform, RenderConfig, ReviewStatus};
	use vault_store::content::{InsertOutcome, NewContent, ParsedFields, insert_or_get};
	use vault_store::queue_item::NewQueueItem;
	use vault_store::rule::{NewRule, insert_rule};

	struct RecordingSink {
		calls: Mutex<Vec<String>>,
		result: Result<Option<String>, &'static str>,
	}

	#[async_trait]
	impl PushSink for RecordingSink {
		async fn push(&self, _payload: &crate::payload::PushPayload, target_id: &str) -> Result<Option<String>, SinkError> {
			self.calls.lock().unwrap().push(target_id.to_string());
			match &self.result {
				Ok(id) => Ok(id.clone()),
				Err(msg) => Err(SinkError::Rejected(msg.to_string())),
			}
		}
	}

	async fn seed(pool: &VaultPool) -> (ContentQueueItem, vault_domain::BotChatId) {
		let content = match insert_or_get(
			pool,
			NewContent {
				platform: Platform::Twitter,
				url: "https://x.com/a/status/1".into(),
				canonical_url: "https://x.com/a/status/1".into(),
				tags: vec![],
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
				clean_url: None,
				content_type: None,
				layout_type: LayoutType::Article,
				platform_id: None,
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

		let rule = insert_rule(
			pool,
			NewRule {
				name: "default".into(),
				match_conditions: MatchConditions::default(),
				enabled: true,
				priority: 0,
				nsfw_policy: NsfwPolicy::Block,
				approval_required: false,
				auto_approve_conditions: None,
				rate_limit: None,
				time_window_secs: None,
				render_config: RenderConfig::default(),
			},
		)
		.await
		.unwrap();
		let bot_chat = chat::insert(pool, "-100111", ChatType::Channel, None).await.unwrap();
		rule::insert_target(pool, rule.id, bot_chat.id, &Default::default()).await.unwrap();

		let item = queue_item::insert_if_absent(
			pool,
			NewQueueItem {
				content_id: content.id,
				rule_id: rule.id,
				bot_chat_id: bot_chat.id,
				target_platform: "telegram".into(),
				target_id: "-100111".into(),
				priority: 0,
				scheduled_at: Some(Utc::now()),
				needs_approval: false,
				max_attempts: 3,
			},
		)
		.await
		.unwrap()
		.unwrap();
		(item, bot_chat.id)
	}

	#[tokio::test]
	async fn successful_push_marks_success_and_records_pushed_record() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let (item, _) = seed(&pool).await;
		let claimed = queue_item::claim_batch(&pool, "worker-1", 10).await.unwrap();
		assert_eq!(claimed.len(), 1);

		let sinks = Sinks::new().with_sink(
			PlatformType::Telegram,
			Arc::new(RecordingSink { calls: Mutex::new(vec![]), result: Ok(Some("42".to_string())) }),
		);

		process_claimed_item(&pool, &bus, &sinks, claimed.into_iter().next().unwrap()).await.unwrap();

		let reloaded = queue_item::get(&pool, item.id).await.unwrap().unwrap();
		assert_eq!(reloaded.status, QueueItemStatus::Success);
		assert!(queue_item::already_pushed(&pool, item.content_id, "-100111").await.unwrap());
	}

	#[tokio::test]
	async fn telegram_no_id_success_synthesizes_message_id() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let (item, _) = seed(&pool).await;
		let claimed = queue_item::claim_batch(&pool, "worker-1", 10).await.unwrap();

		let sinks =
			Sinks::new().with_sink(PlatformType::Telegram, Arc::new(RecordingSink { calls: Mutex::new(vec![]), result: Ok(None) }));

		process_claimed_item(&pool, &bus, &sinks, claimed.into_iter().next().unwrap()).await.unwrap();

		let reloaded = queue_item::get(&pool, item.id).await.unwrap().unwrap();
		assert_eq!(reloaded.status, QueueItemStatus::Success);
		assert!(reloaded.message_id.unwrap().starts_with("telegram-noid-"));
	}

	#[tokio::test]
	async fn failed_push_reschedules_with_backoff_until_terminal() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let bus = EventBus::new(pool.clone());
		let (item, _) = seed(&pool).await;

		let sinks = Sinks::new().with_sink(
			PlatformType::Telegram,
			Arc::new(RecordingSink { calls: Mutex::new(vec![]), result: Err("boom") }),
		);

		for expected_attempt in 1..=3 {
			let claimed = queue_item::claim_batch(&pool, "worker-1", 10).await.unwrap();
			assert_eq!(claimed.len(), 1, "attempt {expected_attempt} should be claimable");
			let before = Utc::now();
			process_claimed_item(&pool, &bus, &sinks, claimed.into_iter().next().unwrap()).await.unwrap();
			let reloaded = queue_item::get(&pool, item.id).await.unwrap().unwrap();
			assert_eq!(reloaded.attempt_count, expected_attempt);
			if expected_attempt < 3 {
				// Backoff is computed on the post-increment attempt count
				// (`min(60 * 2^attempt_count, 3600)`), not the pre-increment
				// one: attempt 1 schedules ~120s out, attempt 2 ~240s out.
				let next_attempt_at = reloaded.next_attempt_at.expect("non-terminal failure must reschedule");
				let expected_backoff_secs = 60 * 2i64.pow(expected_attempt as u32);
				let delta_secs = (next_attempt_at - before).num_seconds();
				assert!(
					(expected_backoff_secs - 2..=expected_backoff_secs + 2).contains(&delta_secs),
					"attempt {expected_attempt}: expected backoff ~{expected_backoff_secs}s, got {delta_secs}s"
				);
				// Force the next iteration to see it as due without touching attempt_count.
				queue_item::force_reschedule_now(&pool, item.id).await.unwrap();
			} else {
				assert!(reloaded.next_attempt_at.is_none(), "third failure should go terminal");
			}
		}

		let final_claim = queue_item::claim_batch(&pool, "worker-1", 10).await.unwrap();
		assert!(final_claim.is_empty(), "a terminal failure is never claimed again");
	}
}
