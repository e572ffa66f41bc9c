//! Repository functions for the `bot_chats` table (component K, §4.K).

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vault_domain::{BotChat, BotChatId, ChatType};

use crate::codecs;
use crate::error::StoreError;
use crate::pool::VaultPool;

fn row_to_chat(row: SqliteRow) -> Result<BotChat, StoreError> {
	let chat_type: String = row.try_get("chat_type")?;
	Ok(BotChat {
		id: BotChatId::new(row.try_get("id")?),
		chat_id: row.try_get("chat_id")?,
		chat_type: codecs::chat_type(&chat_type)?,
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		is_accessible: row.try_get::<i64, _>("is_accessible")? != 0,
		nsfw_chat_id: row.try_get("nsfw_chat_id")?,
		total_pushed: row.try_get("total_pushed")?,
		last_pushed_at: row.try_get("last_pushed_at")?,
	})
}

pub async fn get(pool: &VaultPool, id: BotChatId) -> Result<Option<BotChat>, StoreError> {
	let row = sqlx::query("SELECT * FROM bot_chats WHERE id = ?").bind(id.get()).fetch_optional(pool.raw()).await?;
	row.map(row_to_chat).transpose()
}

pub async fn insert(
	pool: &VaultPool,
	chat_id: &str,
	chat_type: ChatType,
	nsfw_chat_id: Option<&str>,
) -> Result<BotChat, StoreError> {
	let id = sqlx::query("INSERT INTO bot_chats (chat_id, chat_type, nsfw_chat_id) VALUES (?, ?, ?)")
		.bind(chat_id)
		.bind(chat_type.as_str())
		.bind(nsfw_chat_id)
		.execute(pool.raw())
		.await?
		.last_insert_rowid();

	get(pool, BotChatId::new(id)).await?.ok_or(StoreError::NotFound)
}

/// Bumps `total_pushed` and `last_pushed_at` after a successful push
/// (§4.I step "update BotChat stats").
pub async fn record_push(pool: &VaultPool, id: BotChatId) -> Result<(), StoreError> {
	sqlx::query("UPDATE bot_chats SET total_pushed = total_pushed + 1, last_pushed_at = ? WHERE id = ?")
		.bind(Utc::now())
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

/// Flags a chat inaccessible (bot kicked, chat deleted) so the scheduler
/// stops claiming work for it until an operator re-enables it.
pub async fn set_accessible(pool: &VaultPool, id: BotChatId, accessible: bool) -> Result<(), StoreError> {
	sqlx::query("UPDATE bot_chats SET is_accessible = ? WHERE id = ?")
		.bind(accessible as i64)
		.bind(id.get())
		.execute(pool.raw())
		.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn insert_and_record_push() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let chat = insert(&pool, "-100123", ChatType::Channel, None).await.unwrap();
		assert_eq!(chat.total_pushed, 0);
		assert!(chat.is_usable());

		record_push(&pool, chat.id).await.unwrap();
		let reloaded = get(&pool, chat.id).await.unwrap().unwrap();
		assert_eq!(reloaded.total_pushed, 1);
		assert!(reloaded.last_pushed_at.is_some());
	}

	#[tokio::test]
	async fn set_accessible_toggles_usability() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let chat = insert(&pool, "-100456", ChatType::Supergroup, Some("-100789")).await.unwrap();
		set_accessible(&pool, chat.id, false).await.unwrap();
		let reloaded = get(&pool, chat.id).await.unwrap().unwrap();
		assert!(!reloaded.is_usable());
	}
}
