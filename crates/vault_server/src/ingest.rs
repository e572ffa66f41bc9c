//! Ingestion entry point: turns a raw shared URL into a `contents` row, a
//! `content_sources` row recording who shared it, a queue slot in the Parse
//! Task queue, and a `content_created` event (component B, §4.A/§4.B).

use thiserror::Error;
use vault_domain::{Content, ContentId, Platform};
use vault_events::EventBus;
use vault_platform::AdapterRegistry;
use vault_queue::QueueError;
use vault_store::{StoreError, VaultPool};

const PARSE_MAX_ATTEMPTS: i32 = 5;

#[derive(Debug, Error)]
pub enum IngestError {
	#[error("invalid url: {0}")]
	InvalidUrl(#[from] vault_platform::CanonicalizeError),
	#[error(transparent)]
	Store(#[from] StoreError),
	#[error(transparent)]
	Queue(#[from] QueueError),
	#[error(transparent)]
	Events(#[from] vault_events::EventsError),
}

/// What a successful ingest produced: the content row (new or
/// already-on-file) and whether a parse was actually (re-)enqueued for it.
pub struct IngestOutcome {
	pub content: Content,
	pub is_new: bool,
}

/// Parameters describing who shared a URL and how (the `content_sources`
/// snapshot, §4.K).
pub struct ShareContext<'a> {
	pub shared_by: Option<&'a str>,
	pub share_context: Option<&'a str>,
	pub tags: Vec<String>,
	pub note: Option<&'a str>,
	pub queue_priority: i32,
}

impl Default for ShareContext<'_> {
	fn default() -> Self {
		Self {
			shared_by: None,
			share_context: None,
			tags: Vec::new(),
			note: None,
			queue_priority: 0,
		}
	}
}

/// Canonicalizes and detects the platform for `raw_url`, inserts (or finds
/// the existing) `contents` row, records this share as a `content_sources`
/// entry, and — for brand new or previously-failed content — enqueues a
/// parse task and publishes `content_created`.
///
/// Re-sharing an already `parse_success` URL still records the new source
/// (so its tags/share_context are visible to the Rule Engine) but does not
/// re-enqueue a parse.
pub async fn ingest_url(
	pool: &VaultPool,
	registry: &AdapterRegistry,
	bus: &EventBus,
	raw_url: &str,
	ctx: ShareContext<'_>,
) -> Result<IngestOutcome, IngestError> {
	let (platform, canonical_url, _adapter) = registry.resolve(raw_url)?;

	let new = vault_store::content::NewContent {
		platform,
		url: raw_url.to_string(),
		canonical_url,
		tags: ctx.tags.clone(),
		queue_priority: ctx.queue_priority,
	};

	let (content, is_new) = match vault_store::content::insert_or_get(pool, new).await? {
		vault_store::content::InsertOutcome::Created(content) => (content, true),
		vault_store::content::InsertOutcome::AlreadyExists(content) => (content, false),
	};

	vault_store::content::insert_source(pool, content.id, ctx.shared_by, ctx.share_context, &ctx.tags, ctx.note).await?;

	let needs_parse = is_new || content.status == vault_domain::ParseStatus::ParseFailed;
	if needs_parse {
		vault_queue::task_queue::enqueue(pool, content.id, "parse", PARSE_MAX_ATTEMPTS).await?;
	}

	if is_new {
		bus.publish(
			"content_created",
			serde_json::json!({
				"content_id": content.id.get(),
				"platform": platform.as_str(),
				"canonical_url": content.canonical_url,
			}),
		)
		.await?;
	}

	Ok(IngestOutcome { content, is_new })
}

/// Looks up a content row by its canonical URL under a given platform,
/// without performing a fresh canonicalization pass. Exposed for callers
/// (e.g. an admin surface) that already hold a known-canonical URL.
pub async fn find_by_canonical_url(pool: &VaultPool, platform: Platform, canonical_url: &str) -> Result<Option<Content>, StoreError> {
	vault_store::content::get_by_platform_canonical_url(pool, platform, canonical_url).await
}

pub async fn get(pool: &VaultPool, id: ContentId) -> Result<Option<Content>, StoreError> {
	vault_store::content::get_by_id(pool, id).await
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn harness() -> (VaultPool, AdapterRegistry, EventBus) {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let registry = AdapterRegistry::with_builtin_adapters();
		let bus = EventBus::new(pool.clone());
		(pool, registry, bus)
	}

	#[tokio::test]
	async fn ingesting_a_new_url_enqueues_a_parse_and_publishes_an_event() {
		let (pool, registry, bus) = harness().await;
		let mut sub = bus.subscribe();

		let outcome = ingest_url(&pool, &registry, &bus, "https://www.bilibili.com/video/BV1xx411c7Xg", ShareContext::default())
			.await
			.unwrap();
		assert!(outcome.is_new);
		assert_eq!(outcome.content.platform, Platform::Bilibili);

		let event = sub.next().await.unwrap();
		assert_eq!(event.event_type, "content_created");

		let task = vault_queue::task_queue::dequeue(&pool, "worker-1", std::time::Duration::from_millis(50))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(task.content_id, outcome.content.id);
	}

	#[tokio::test]
	async fn reingesting_the_same_url_dedupes_and_does_not_reenqueue() {
		let (pool, registry, bus) = harness().await;

		let first = ingest_url(&pool, &registry, &bus, "https://www.bilibili.com/video/BV1xx411c7Xg", ShareContext::default())
			.await
			.unwrap();
		assert!(first.is_new);

		// Drain the first parse task so the second ingest's queue state is
		// unambiguous.
		let _ = vault_queue::task_queue::dequeue(&pool, "worker-1", std::time::Duration::from_millis(50)).await.unwrap();

		let second = ingest_url(
			&pool,
			&registry,
			&bus,
			"https://www.bilibili.com/video/BV1xx411c7Xg?spm_id_from=333.999",
			ShareContext {
				shared_by: Some("alice"),
				..ShareContext::default()
			},
		)
		.await
		.unwrap();
		assert!(!second.is_new);
		assert_eq!(second.content.id, first.content.id);

		let sources = vault_store::content::list_sources(&pool, first.content.id).await.unwrap();
		assert_eq!(sources.len(), 2);
		assert_eq!(sources[1].shared_by.as_deref(), Some("alice"));
	}
}
