//! The Parse Worker (component F, §4.F): dequeues parse tasks, runs the
//! matching Adapter, archives media, applies the result to the `contents`
//! row, checks auto-approval, and hands off to the Enqueue Service.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vault_domain::{ContentStats, ParseStatus, ReviewStatus, Task};
use vault_events::EventBus;
use vault_media::MediaProcessor;
use vault_platform::{AdapterError, AdapterRegistry};
use vault_queue::task_queue;
use vault_store::VaultPool;
use vault_store::content::ParsedFields;

/// How long a single `dequeue` poll blocks before the worker loop rechecks
/// the shutdown signal.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff base for the in-task adapter retry loop: `1s * 2^attempt`.
const RETRY_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Runs the Parse Worker loop until `shutdown` is cancelled.
pub async fn run(
	pool: VaultPool,
	registry: AdapterRegistry,
	bus: EventBus,
	media: MediaProcessor,
	storage_namespace: String,
	worker_id: String,
	shutdown: CancellationToken,
) {
	loop {
		if shutdown.is_cancelled() {
			info!(worker_id = %worker_id, "parse worker: shutting down");
			return;
		}

		let task = tokio::select! {
			_ = shutdown.cancelled() => return,
			result = task_queue::dequeue(&pool, &worker_id, DEQUEUE_TIMEOUT) => result,
		};

		let task = match task {
			Ok(Some(task)) => task,
			Ok(None) => continue,
			Err(err) => {
				error!(error = %err, "parse worker: dequeue failed");
				tokio::time::sleep(Duration::from_secs(1)).await;
				continue;
			}
		};

		if let Err(err) = process_task(&pool, &registry, &bus, &media, &storage_namespace, &task).await {
			error!(task_id = task.id.get(), error = %err, "parse worker: task processing failed unexpectedly");
		}
	}
}

async fn process_task(
	pool: &VaultPool,
	registry: &AdapterRegistry,
	bus: &EventBus,
	media: &MediaProcessor,
	storage_namespace: &str,
	task: &Task,
) -> anyhow::Result<()> {
	let Some(content) = vault_store::content::get_by_id(pool, task.content_id).await? else {
		warn!(task_id = task.id.get(), content_id = task.content_id.get(), "parse worker: content vanished, dropping task");
		task_queue::mark_complete(pool, task.id).await?;
		return Ok(());
	};

	// Re-running an already-parsed item (a caller re-enqueued it, e.g. after
	// a media archival partial failure) skips straight to the media step.
	if content.status == ParseStatus::ParseSuccess {
		if let Some(mut archive) = content.archive_metadata.clone() {
			if !archive.fully_processed() {
				media.store_archive_images(&mut archive, storage_namespace).await;
				media.store_archive_videos(&mut archive, storage_namespace).await;
				vault_store::content::update_archive_metadata(pool, content.id, &archive).await?;
			}
		}
		task_queue::mark_complete(pool, task.id).await?;
		return Ok(());
	}

	vault_store::content::mark_processing(pool, content.id).await?;

	let max_attempts = task.max_attempts.max(1);
	let mut attempt = 0i32;
	let outcome = match registry.resolve(&content.canonical_url) {
		Ok((_, _, adapter)) => loop {
			attempt += 1;
			match adapter.parse(&content.canonical_url).await {
				Ok(parsed) => break Ok(parsed),
				Err(err) => {
					if attempt >= max_attempts || !err.should_retry() {
						break Err(err);
					}
					let backoff = RETRY_BACKOFF_BASE * 2u32.pow((attempt - 1).min(16) as u32);
					warn!(content_id = content.id.get(), attempt, error = %err, "parse worker: adapter error, retrying");
					tokio::time::sleep(backoff).await;
				}
			}
		},
		Err(err) => Err(AdapterError::non_retryable(err.to_string())),
	};

	match outcome {
		Ok(parsed) => {
			let mut archive = parsed.archive_metadata.clone();
			let url_map = media.store_archive_images(&mut archive, storage_namespace).await;
			media.store_archive_videos(&mut archive, storage_namespace).await;

			let cover_url = parsed.cover_url.clone().map(|url| localize_url(&url, &url_map));
			let media_urls = localize_urls(&parsed.media_urls, &url_map);

			let stats = content_stats_from_parsed(&parsed.stats);
			vault_store::content::apply_parsed_fields(
				pool,
				content.id,
				ParsedFields {
					clean_url: Some(parsed.clean_url.clone()),
					content_type: Some(parsed.content_type.clone()),
					layout_type: parsed.layout_type,
					platform_id: parsed.content_id.clone(),
					title: parsed.title.clone(),
					body: parsed.body.clone(),
					summary: parsed.summary.clone().or_else(|| parsed.description.clone()),
					author_name: parsed.author_name.clone(),
					author_id: parsed.author_id.clone(),
					author_avatar_url: parsed.author_avatar.clone(),
					author_url: parsed.author_url.clone(),
					cover_url,
					media_urls,
					is_nsfw: false,
					stats,
					published_at: parsed.published_at,
				},
			)
			.await?;
			vault_store::content::update_archive_metadata(pool, content.id, &archive).await?;

			task_queue::mark_complete(pool, task.id).await?;

			let reloaded = vault_store::content::get_by_id(pool, content.id).await?.unwrap_or(content);
			maybe_auto_approve(pool, &reloaded).await?;

			bus.publish(
				"content_parsed",
				serde_json::json!({"content_id": reloaded.id.get(), "status": reloaded.status.as_str()}),
			)
			.await?;

			if let Err(err) = vault_distribution::enqueue_content(pool, bus, reloaded.id, false).await {
				warn!(content_id = reloaded.id.get(), error = %err, "parse worker: enqueue after parse failed");
			}
		}
		Err(err) => {
			let terminal = !err.should_retry() || attempt >= max_attempts;
			vault_store::content::mark_parse_failed(pool, content.id, &err.to_string(), err.kind()).await?;
			task_queue::record_attempt_failure(pool, task.id, &err.to_string(), terminal).await?;
			if terminal {
				task_queue::push_dead_letter(pool, task, &err.to_string()).await?;
			}
		}
	}

	Ok(())
}

/// Flips `review_status` to `auto_approved` if any enabled rule's
/// `auto_approve_conditions` matches this content, using its latest source's
/// share context (§4.G, reusing the Rule Engine's matcher).
async fn maybe_auto_approve(pool: &VaultPool, content: &vault_domain::Content) -> anyhow::Result<()> {
	if content.review_status != ReviewStatus::Pending {
		return Ok(());
	}

	let share_context = vault_store::content::list_sources(pool, content.id).await?.into_iter().last().and_then(|s| s.share_context);

	let rules = vault_store::rule::list_enabled_rules(pool).await?;
	let qualifies = rules.iter().any(|rule| vault_rules::qualifies_for_auto_approval(content, share_context.as_deref(), rule));

	if qualifies {
		vault_store::content::set_review_status(pool, content.id, ReviewStatus::AutoApproved).await?;
	}

	Ok(())
}

/// Rewrites a single URL through the Media Processor's `orig_url ->
/// "local://<key>"` map, falling back to the original URL when it was not
/// archived (§4.C step 8 / §4.F step 5).
fn localize_url(url: &str, url_map: &std::collections::HashMap<String, String>) -> String {
	url_map.get(url).cloned().unwrap_or_else(|| url.to_string())
}

/// Rewrites `urls` through `url_map`, preserving insertion order and
/// dropping duplicates that only appear once the rewrite collapses two
/// distinct CDN URLs onto the same stored key (§4.F step 5).
fn localize_urls(urls: &[String], url_map: &std::collections::HashMap<String, String>) -> Vec<String> {
	let mut seen = std::collections::HashSet::new();
	let mut out = Vec::with_capacity(urls.len());
	for url in urls {
		let localized = localize_url(url, url_map);
		if seen.insert(localized.clone()) {
			out.push(localized);
		}
	}
	out
}

fn content_stats_from_parsed(raw: &std::collections::BTreeMap<String, i64>) -> ContentStats {
	let mut stats = ContentStats::default();
	let mut extra = serde_json::Map::new();
	for (key, value) in raw {
		match key.as_str() {
			"view_count" => stats.view_count = *value,
			"like_count" => stats.like_count = *value,
			"collect_count" => stats.collect_count = *value,
			"share_count" => stats.share_count = *value,
			"comment_count" => stats.comment_count = *value,
			other => {
				extra.insert(other.to_string(), serde_json::Value::from(*value));
			}
		}
	}
	stats.extra = extra;
	stats
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_stat_keys_go_to_extra() {
		let mut raw = std::collections::BTreeMap::new();
		raw.insert("view_count".to_string(), 10);
		raw.insert("coin_count".to_string(), 3);
		let stats = content_stats_from_parsed(&raw);
		assert_eq!(stats.view_count, 10);
		assert_eq!(stats.extra.get("coin_count"), Some(&serde_json::Value::from(3)));
	}

	#[test]
	fn localize_urls_rewrites_preserves_order_and_dedupes() {
		let mut url_map = std::collections::HashMap::new();
		url_map.insert("https://cdn.example/a.jpg".to_string(), "local://ns/blobs/sha256/aa/bb/x.webp".to_string());
		url_map.insert("https://cdn.example/b.jpg".to_string(), "local://ns/blobs/sha256/aa/bb/x.webp".to_string());

		let urls = vec![
			"https://cdn.example/a.jpg".to_string(),
			"https://cdn.example/b.jpg".to_string(),
			"https://cdn.example/unarchived.jpg".to_string(),
		];
		let localized = localize_urls(&urls, &url_map);

		// a.jpg and b.jpg both collapse onto the same stored key, so the
		// duplicate is dropped; the unarchived URL passes through unchanged.
		assert_eq!(localized, vec!["local://ns/blobs/sha256/aa/bb/x.webp".to_string(), "https://cdn.example/unarchived.jpg".to_string()]);
	}

	#[test]
	fn localize_url_falls_back_to_original_when_not_archived() {
		let url_map = std::collections::HashMap::new();
		assert_eq!(localize_url("https://cdn.example/a.jpg", &url_map), "https://cdn.example/a.jpg");
	}
}
