//! Repository functions for the `contents` and `content_sources` tables
//! (component K, §4.K). Every write goes through here; nothing else in the
//! workspace touches these tables directly.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vault_domain::{ArchiveMetadata, Content, ContentId, ContentSource, ContentStats, Platform};

use crate::codecs;
use crate::error::StoreError;
use crate::pool::VaultPool;

fn row_to_content(row: SqliteRow) -> Result<Content, StoreError> {
	let platform: String = row.try_get("platform")?;
	let status: String = row.try_get("status")?;
	let review_status: String = row.try_get("review_status")?;
	let layout_type: Option<String> = row.try_get("layout_type")?;
	let tags: String = row.try_get("tags")?;
	let media_urls: String = row.try_get("media_urls")?;
	let archive_metadata: Option<String> = row.try_get("archive_metadata")?;
	let stats: String = row.try_get("stats")?;

	Ok(Content {
		id: ContentId::new(row.try_get::<i64, _>("id")?),
		platform: platform.parse().map_err(|_| StoreError::InvalidEnum(format!("Platform: {platform}")))?,
		url: row.try_get("url")?,
		canonical_url: row.try_get("canonical_url")?,
		clean_url: row.try_get("clean_url")?,
		content_type: row.try_get("content_type")?,
		layout_type: layout_type.as_deref().map(codecs::layout_type).transpose()?,
		status: codecs::parse_status(&status)?,
		review_status: codecs::review_status(&review_status)?,
		queue_priority: row.try_get("queue_priority")?,
		tags: serde_json::from_str(&tags)?,
		is_nsfw: row.try_get::<i64, _>("is_nsfw")? != 0,
		platform_id: row.try_get("platform_id")?,
		title: row.try_get("title")?,
		body: row.try_get("body")?,
		summary: row.try_get("summary")?,
		author_name: row.try_get("author_name")?,
		author_id: row.try_get("author_id")?,
		author_avatar_url: row.try_get("author_avatar_url")?,
		author_url: row.try_get("author_url")?,
		cover_url: row.try_get("cover_url")?,
		media_urls: serde_json::from_str(&media_urls)?,
		archive_metadata: archive_metadata.as_deref().map(serde_json::from_str::<ArchiveMetadata>).transpose()?,
		stats: serde_json::from_str(&stats)?,
		failure_count: row.try_get("failure_count")?,
		last_error: row.try_get("last_error")?,
		last_error_type: row.try_get("last_error_type")?,
		last_error_at: row.try_get("last_error_at")?,
		deleted_at: row.try_get("deleted_at")?,
		created_at: row.try_get("created_at")?,
		updated_at: row.try_get("updated_at")?,
		published_at: row.try_get("published_at")?,
	})
}

/// Parameters for a brand new `Content` row, before a parse has run.
pub struct NewContent {
	pub platform: Platform,
	pub url: String,
	pub canonical_url: String,
	pub tags: Vec<String>,
	pub queue_priority: i32,
}

/// Either a freshly created row or the existing one the unique constraint on
/// `(platform, canonical_url)` bounced us off of.
pub enum InsertOutcome {
	Created(Content),
	AlreadyExists(Content),
}

/// Inserts a new content, or returns the existing row for the same
/// `(platform, canonical_url)` pair untouched (component B dedup, §4.A).
pub async fn insert_or_get(pool: &VaultPool, new: NewContent) -> Result<InsertOutcome, StoreError> {
	if let Some(existing) = get_by_platform_canonical_url(pool, new.platform, &new.canonical_url).await? {
		return Ok(InsertOutcome::AlreadyExists(existing));
	}

	let now = Utc::now();
	let tags_json = serde_json::to_string(&new.tags)?;
	let id = sqlx::query(
		"INSERT INTO contents (platform, url, canonical_url, status, review_status, queue_priority, tags, created_at, updated_at)
		 VALUES (?, ?, ?, 'unprocessed', 'pending', ?, ?, ?, ?)
		 ON CONFLICT (platform, canonical_url) DO NOTHING",
	)
	.bind(new.platform.as_str())
	.bind(&new.url)
	.bind(&new.canonical_url)
	.bind(new.queue_priority)
	.bind(&tags_json)
	.bind(now)
	.bind(now)
	.execute(pool.raw())
	.await?
	.last_insert_rowid();

	if id == 0 {
		// Another writer won the race on the unique constraint between our
		// lookup and our insert; fetch what they created.
		let existing = get_by_platform_canonical_url(pool, new.platform, &new.canonical_url)
			.await?
			.ok_or(StoreError::NotFound)?;
		return Ok(InsertOutcome::AlreadyExists(existing));
	}

	let created = get_by_id(pool, ContentId::new(id)).await?.ok_or(StoreError::NotFound)?;
	Ok(InsertOutcome::Created(created))
}

pub async fn get_by_id(pool: &VaultPool, id: ContentId) -> Result<Option<Content>, StoreError> {
	let row = sqlx::query("SELECT * FROM contents WHERE id = ?").bind(id.get()).fetch_optional(pool.raw()).await?;
	row.map(row_to_content).transpose()
}

pub async fn get_by_platform_canonical_url(
	pool: &VaultPool,
	platform: Platform,
	canonical_url: &str,
) -> Result<Option<Content>, StoreError> {
	let row = sqlx::query("SELECT * FROM contents WHERE platform = ? AND canonical_url = ?")
		.bind(platform.as_str())
		.bind(canonical_url)
		.fetch_optional(pool.raw())
		.await?;
	row.map(row_to_content).transpose()
}

/// Applies the result of a successful parse: fills in the content fields an
/// adapter produced and flips status to `parse_success`.
pub struct ParsedFields {
	pub clean_url: Option<String>,
	pub content_type: Option<String>,
	pub layout_type: vault_domain::LayoutType,
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
	pub is_nsfw: bool,
	pub stats: ContentStats,
	pub published_at: Option<DateTime<Utc>>,
}

pub async fn apply_parsed_fields(pool: &VaultPool, id: ContentId, fields: ParsedFields) -> Result<(), StoreError> {
	let media_urls_json = serde_json::to_string(&fields.media_urls)?;
	let stats_json = serde_json::to_string(&fields.stats)?;
	let now = Utc::now();
	sqlx::query(
		"UPDATE contents SET
			status = 'parse_success', clean_url = ?, content_type = ?, layout_type = ?, platform_id = ?,
			title = ?, body = ?, summary = ?, author_name = ?, author_id = ?, author_avatar_url = ?, author_url = ?,
			cover_url = ?, media_urls = ?, is_nsfw = ?, stats = ?, published_at = ?, updated_at = ?
		 WHERE id = ?",
	)
	.bind(&fields.clean_url)
	.bind(&fields.content_type)
	.bind(fields.layout_type.as_str())
	.bind(&fields.platform_id)
	.bind(&fields.title)
	.bind(&fields.body)
	.bind(&fields.summary)
	.bind(&fields.author_name)
	.bind(&fields.author_id)
	.bind(&fields.author_avatar_url)
	.bind(&fields.author_url)
	.bind(&fields.cover_url)
	.bind(&media_urls_json)
	.bind(fields.is_nsfw as i64)
	.bind(&stats_json)
	.bind(fields.published_at)
	.bind(now)
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

/// Replaces the archive metadata blob (the Media Processor writes this
/// incrementally as each image/video finishes transcoding).
pub async fn update_archive_metadata(pool: &VaultPool, id: ContentId, metadata: &ArchiveMetadata) -> Result<(), StoreError> {
	let json = serde_json::to_string(metadata)?;
	sqlx::query("UPDATE contents SET archive_metadata = ?, updated_at = ? WHERE id = ?")
		.bind(json)
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

/// Records a failed parse attempt: bumps `failure_count`, stashes the error,
/// and flips status to `parse_failed` once the worker gives up retrying.
pub async fn mark_parse_failed(pool: &VaultPool, id: ContentId, error: &str, error_type: &str) -> Result<(), StoreError> {
	sqlx::query(
		"UPDATE contents SET status = 'parse_failed', failure_count = failure_count + 1,
			last_error = ?, last_error_type = ?, last_error_at = ?, updated_at = ? WHERE id = ?",
	)
	.bind(error)
	.bind(error_type)
	.bind(Utc::now())
	.bind(Utc::now())
	.bind(id.get())
	.execute(pool.raw())
	.await?;
	Ok(())
}

pub async fn mark_processing(pool: &VaultPool, id: ContentId) -> Result<(), StoreError> {
	sqlx::query("UPDATE contents SET status = 'processing', updated_at = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

pub async fn set_review_status(
	pool: &VaultPool,
	id: ContentId,
	status: vault_domain::ReviewStatus,
) -> Result<(), StoreError> {
	sqlx::query("UPDATE contents SET review_status = ?, updated_at = ? WHERE id = ?")
		.bind(status.as_str())
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

pub async fn soft_delete(pool: &VaultPool, id: ContentId) -> Result<(), StoreError> {
	sqlx::query("UPDATE contents SET deleted_at = ?, updated_at = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

pub async fn insert_source(
	pool: &VaultPool,
	content_id: ContentId,
	shared_by: Option<&str>,
	share_context: Option<&str>,
	tags_snapshot: &[String],
	note: Option<&str>,
) -> Result<(), StoreError> {
	let tags_json = serde_json::to_string(tags_snapshot)?;
	sqlx::query(
		"INSERT INTO content_sources (content_id, shared_by, share_context, tags_snapshot, note, created_at)
		 VALUES (?, ?, ?, ?, ?, ?)",
	)
	.bind(content_id.get())
	.bind(shared_by)
	.bind(share_context)
	.bind(tags_json)
	.bind(note)
	.bind(Utc::now())
	.execute(pool.raw())
	.await?;
	Ok(())
}

pub async fn list_sources(pool: &VaultPool, content_id: ContentId) -> Result<Vec<ContentSource>, StoreError> {
	let rows = sqlx::query("SELECT * FROM content_sources WHERE content_id = ? ORDER BY created_at ASC")
		.bind(content_id.get())
		.fetch_all(pool.raw())
		.await?;

	rows.into_iter()
		.map(|row| {
			let tags_snapshot: String = row.try_get("tags_snapshot")?;
			Ok(ContentSource {
				content_id: ContentId::new(row.try_get("content_id")?),
				shared_by: row.try_get("shared_by")?,
				share_context: row.try_get("share_context")?,
				tags_snapshot: serde_json::from_str(&tags_snapshot)?,
				note: row.try_get("note")?,
				created_at: row.try_get("created_at")?,
			})
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_or_get_dedupes_on_platform_and_canonical_url() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let new = NewContent {
			platform: Platform::Bilibili,
			url: "https://www.bilibili.com/video/BV1xx411c7mD".into(),
			canonical_url: "https://www.bilibili.com/video/BV1xx411c7mD".into(),
			tags: vec!["music".into()],
			queue_priority: 0,
		};

		let first = match insert_or_get(&pool, new).await.unwrap() {
			InsertOutcome::Created(content) => content,
			InsertOutcome::AlreadyExists(_) => panic!("expected a fresh insert"),
		};

		let dup = NewContent {
			platform: Platform::Bilibili,
			url: "https://www.bilibili.com/video/BV1xx411c7mD?spm_id_from=333.999".into(),
			canonical_url: "https://www.bilibili.com/video/BV1xx411c7mD".into(),
			tags: vec![],
			queue_priority: 5,
		};

		match insert_or_get(&pool, dup).await.unwrap() {
			InsertOutcome::AlreadyExists(content) => assert_eq!(content.id, first.id),
			InsertOutcome::Created(_) => panic!("expected the dedup path"),
		}
	}

	#[tokio::test]
	async fn apply_parsed_fields_flips_status_to_success() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let new = NewContent {
			platform: Platform::Weibo,
			url: "https://weibo.com/1/abc".into(),
			canonical_url: "https://weibo.com/1/abc".into(),
			tags: vec![],
			queue_priority: 0,
		};
		let content = match insert_or_get(&pool, new).await.unwrap() {
			InsertOutcome::Created(content) => content,
			_ => unreachable!(),
		};
		assert_eq!(content.status, vault_domain::ParseStatus::Unprocessed);

		apply_parsed_fields(
			&pool,
			content.id,
			ParsedFields {
				clean_url: Some("https://weibo.com/1/abc".into()),
				content_type: Some("post".into()),
				layout_type: vault_domain::LayoutType::Article,
				platform_id: Some("abc".into()),
				title: None,
				body: Some("hello".into()),
				summary: None,
				author_name: Some("someone".into()),
				author_id: None,
				author_avatar_url: None,
				author_url: None,
				cover_url: None,
				media_urls: vec![],
				is_nsfw: false,
				stats: ContentStats::default(),
				published_at: None,
			},
		)
		.await
		.unwrap();

		let reloaded = get_by_id(&pool, content.id).await.unwrap().unwrap();
		assert_eq!(reloaded.status, vault_domain::ParseStatus::ParseSuccess);
		assert_eq!(reloaded.body.as_deref(), Some("hello"));
	}
}
