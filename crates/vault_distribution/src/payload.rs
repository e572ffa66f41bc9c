//! The push sink payload shape (§6.3): everything a sink needs to render a
//! push, independent of which sink ends up sending it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vault_domain::{ArchiveMetadata, Content, DistributionRule, DistributionTarget, RenderConfig};

#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
	pub id: i64,
	pub platform: String,
	pub content_type: Option<String>,
	pub layout_type: Option<String>,
	pub title: Option<String>,
	pub body: Option<String>,
	pub summary: Option<String>,
	pub author_name: Option<String>,
	pub author_id: Option<String>,
	pub author_avatar_url: Option<String>,
	pub cover_url: Option<String>,
	pub media_urls: Vec<String>,
	pub tags: Vec<String>,
	pub canonical_url: String,
	pub url: String,
	pub clean_url: Option<String>,
	pub is_nsfw: bool,
	pub published_at: Option<DateTime<Utc>>,
	pub render_config: RenderConfig,
	pub archive_metadata: Option<ArchiveMetadata>,
}

/// Builds the payload for one push: the rule's `render_config` merged with
/// the target's override (target wins on set fields), per §4.I step
/// "`_build_content_payload`".
pub fn build_content_payload(content: &Content, rule: &DistributionRule, target: &DistributionTarget) -> PushPayload {
	let render_config = rule.render_config.merged_with_override(&target.render_config_override);
	PushPayload {
		id: content.id.get(),
		platform: content.platform.as_str().to_string(),
		content_type: content.content_type.clone(),
		layout_type: content.layout_type.map(|l| l.as_str().to_string()),
		title: content.title.clone(),
		body: content.body.clone(),
		summary: content.summary.clone(),
		author_name: content.author_name.clone(),
		author_id: content.author_id.clone(),
		author_avatar_url: content.author_avatar_url.clone(),
		cover_url: content.cover_url.clone(),
		media_urls: content.media_urls.clone(),
		tags: content.tags.clone(),
		canonical_url: content.canonical_url.clone(),
		url: content.url.clone(),
		clean_url: content.clean_url.clone(),
		is_nsfw: content.is_nsfw,
		published_at: content.published_at,
		render_config,
		archive_metadata: content.archive_metadata.clone(),
	}
}

/// Applies `{{date}}` and `{{title}}` substitution to a header/footer
/// template (§4.J).
pub fn render_template(template: &str, payload: &PushPayload) -> String {
	let date = payload.published_at.unwrap_or_else(Utc::now).format("%Y-%m-%d").to_string();
	let title = payload.title.as_deref().unwrap_or("");
	template.replace("{{date}}", &date).replace("{{title}}", title)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn render_template_substitutes_known_placeholders() {
		let payload = PushPayload {
			id: 1,
			platform: "bilibili".into(),
			content_type: None,
			layout_type: None,
			title: Some("hello world".into()),
			body: None,
			summary: None,
			author_name: None,
			author_id: None,
			author_avatar_url: None,
			cover_url: None,
			media_urls: vec![],
			tags: vec![],
			canonical_url: "https://example.com".into(),
			url: "https://example.com".into(),
			clean_url: None,
			is_nsfw: false,
			published_at: None,
			render_config: RenderConfig::default(),
			archive_metadata: None,
		};
		let rendered = render_template("new post: {{title}} ({{date}})", &payload);
		assert!(rendered.starts_with("new post: hello world ("));
	}
}
