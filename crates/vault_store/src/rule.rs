//! Repository functions for `distribution_rules` and `distribution_targets`
//! (component K, §4.K; consumed by the Rule Engine and Enqueue Service).

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use vault_domain::{
	BotChatId, DistributionRule, DistributionRuleId, DistributionTarget, DistributionTargetId, MatchConditions, NsfwPolicy,
	RenderConfig, RenderConfigOverride,
};

use crate::codecs;
use crate::error::StoreError;
use crate::pool::VaultPool;

fn row_to_rule(row: SqliteRow) -> Result<DistributionRule, StoreError> {
	let match_conditions: String = row.try_get("match_conditions")?;
	let nsfw_policy: String = row.try_get("nsfw_policy")?;
	let auto_approve_conditions: Option<String> = row.try_get("auto_approve_conditions")?;
	let render_config: String = row.try_get("render_config")?;

	Ok(DistributionRule {
		id: DistributionRuleId::new(row.try_get("id")?),
		name: row.try_get("name")?,
		match_conditions: serde_json::from_str(&match_conditions)?,
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		priority: row.try_get("priority")?,
		nsfw_policy: codecs::nsfw_policy(&nsfw_policy)?,
		approval_required: row.try_get::<i64, _>("approval_required")? != 0,
		auto_approve_conditions: auto_approve_conditions
			.as_deref()
			.map(serde_json::from_str::<MatchConditions>)
			.transpose()?,
		rate_limit: row.try_get("rate_limit")?,
		time_window_secs: row.try_get("time_window_secs")?,
		render_config: serde_json::from_str(&render_config)?,
		created_at: row.try_get("created_at")?,
		updated_at: row.try_get("updated_at")?,
	})
}

fn row_to_target(row: SqliteRow) -> Result<DistributionTarget, StoreError> {
	let render_config_override: String = row.try_get("render_config_override")?;
	Ok(DistributionTarget {
		id: DistributionTargetId::new(row.try_get("id")?),
		rule_id: DistributionRuleId::new(row.try_get("rule_id")?),
		bot_chat_id: BotChatId::new(row.try_get("bot_chat_id")?),
		enabled: row.try_get::<i64, _>("enabled")? != 0,
		render_config_override: serde_json::from_str(&render_config_override)?,
	})
}

pub async fn list_enabled_rules(pool: &VaultPool) -> Result<Vec<DistributionRule>, StoreError> {
	let rows = sqlx::query("SELECT * FROM distribution_rules WHERE enabled = 1 ORDER BY priority DESC, id ASC")
		.fetch_all(pool.raw())
		.await?;
	rows.into_iter().map(row_to_rule).collect()
}

pub async fn get_rule(pool: &VaultPool, id: DistributionRuleId) -> Result<Option<DistributionRule>, StoreError> {
	let row = sqlx::query("SELECT * FROM distribution_rules WHERE id = ?").bind(id.get()).fetch_optional(pool.raw()).await?;
	row.map(row_to_rule).transpose()
}

pub async fn list_targets_for_rule(
	pool: &VaultPool,
	rule_id: DistributionRuleId,
) -> Result<Vec<DistributionTarget>, StoreError> {
	let rows = sqlx::query("SELECT * FROM distribution_targets WHERE rule_id = ? AND enabled = 1 ORDER BY id ASC")
		.bind(rule_id.get())
		.fetch_all(pool.raw())
		.await?;
	rows.into_iter().map(row_to_target).collect()
}

pub async fn get_target(pool: &VaultPool, id: DistributionTargetId) -> Result<Option<DistributionTarget>, StoreError> {
	let row = sqlx::query("SELECT * FROM distribution_targets WHERE id = ?").bind(id.get()).fetch_optional(pool.raw()).await?;
	row.map(row_to_target).transpose()
}

/// Parameters for creating a rule; `id`/`created_at`/`updated_at` are
/// assigned by the database.
pub struct NewRule {
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
}

pub async fn insert_rule(pool: &VaultPool, new: NewRule) -> Result<DistributionRule, StoreError> {
	let match_conditions_json = serde_json::to_string(&new.match_conditions)?;
	let auto_approve_json = new.auto_approve_conditions.as_ref().map(serde_json::to_string).transpose()?;
	let render_config_json = serde_json::to_string(&new.render_config)?;
	let now = Utc::now();

	let id = sqlx::query(
		"INSERT INTO distribution_rules
			(name, match_conditions, enabled, priority, nsfw_policy, approval_required,
			 auto_approve_conditions, rate_limit, time_window_secs, render_config, created_at, updated_at)
		 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
	)
	.bind(&new.name)
	.bind(&match_conditions_json)
	.bind(new.enabled as i64)
	.bind(new.priority)
	.bind(new.nsfw_policy.as_str())
	.bind(new.approval_required as i64)
	.bind(&auto_approve_json)
	.bind(new.rate_limit)
	.bind(new.time_window_secs)
	.bind(&render_config_json)
	.bind(now)
	.bind(now)
	.execute(pool.raw())
	.await?
	.last_insert_rowid();

	get_rule(pool, DistributionRuleId::new(id)).await?.ok_or(StoreError::NotFound)
}

pub async fn insert_target(
	pool: &VaultPool,
	rule_id: DistributionRuleId,
	bot_chat_id: BotChatId,
	render_config_override: &RenderConfigOverride,
) -> Result<DistributionTarget, StoreError> {
	let override_json = serde_json::to_string(render_config_override)?;
	let id = sqlx::query(
		"INSERT INTO distribution_targets (rule_id, bot_chat_id, enabled, render_config_override) VALUES (?, ?, 1, ?)",
	)
	.bind(rule_id.get())
	.bind(bot_chat_id.get())
	.bind(override_json)
	.execute(pool.raw())
	.await?
	.last_insert_rowid();

	get_target(pool, DistributionTargetId::new(id)).await?.ok_or(StoreError::NotFound)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_rule() -> NewRule {
		NewRule {
			name: "music clips".into(),
			match_conditions: MatchConditions { tags: vec!["music".into()], ..Default::default() },
			enabled: true,
			priority: 10,
			nsfw_policy: NsfwPolicy::Block,
			approval_required: false,
			auto_approve_conditions: None,
			rate_limit: Some(20),
			time_window_secs: Some(60),
			render_config: RenderConfig::default(),
		}
	}

	#[tokio::test]
	async fn insert_and_fetch_rule_roundtrips_match_conditions() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let rule = insert_rule(&pool, sample_rule()).await.unwrap();
		assert_eq!(rule.match_conditions.tags, vec!["music".to_string()]);
		assert_eq!(rule.rate_limit, Some(20));

		let reloaded = get_rule(&pool, rule.id).await.unwrap().unwrap();
		assert_eq!(reloaded.name, "music clips");
	}

	#[tokio::test]
	async fn list_enabled_rules_orders_by_priority_desc() {
		let pool = VaultPool::connect_in_memory().await.unwrap();
		let mut low = sample_rule();
		low.name = "low".into();
		low.priority = 1;
		let mut high = sample_rule();
		high.name = "high".into();
		high.priority = 99;

		insert_rule(&pool, low).await.unwrap();
		insert_rule(&pool, high).await.unwrap();

		let rules = list_enabled_rules(&pool).await.unwrap();
		assert_eq!(rules[0].name, "high");
		assert_eq!(rules[1].name, "low");
	}
}
