use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use vault_domain::{AuthorMode, ContentMode, LinkMode, MediaMode};

use crate::error::SinkError;
use crate::payload::{PushPayload, render_template};
use crate::sinks::PushSink;

const TEXT_CAPTION_LIMIT: usize = 4096;
const MEDIA_CAPTION_LIMIT: usize = 1024;
const MEDIA_GROUP_LIMIT: usize = 10;

/// A Telegram Bot API sink. `base_url` defaults to the public API but is
/// overridable for tests.
pub struct TelegramSink {
	client: Client,
	base_url: String,
	bot_token: String,
}

impl TelegramSink {
	pub fn new(client: Client, bot_token: String) -> Self {
		Self { client, base_url: "https://api.telegram.org".to_string(), bot_token }
	}

	#[cfg(test)]
	pub fn with_base_url(client: Client, bot_token: String, base_url: String) -> Self {
		Self { client, base_url, bot_token }
	}

	fn method_url(&self, method: &str) -> String {
		format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
	}
}

fn truncate(s: &str, limit: usize) -> String {
	if s.chars().count() <= limit {
		return s.to_string();
	}
	let mut out: String = s.chars().take(limit.saturating_sub(1)).collect();
	out.push('…');
	out
}

fn build_caption(payload: &PushPayload, limit: usize) -> String {
	let config = &payload.render_config;
	let mut lines = Vec::new();

	if config.show_title
		&& let Some(title) = &payload.title
	{
		lines.push(title.clone());
	}

	if config.show_platform_id {
		lines.push(format!("#{}", payload.id));
	}

	match config.author_mode {
		AuthorMode::None => {}
		AuthorMode::Name => {
			if let Some(name) = &payload.author_name {
				lines.push(format!("— {name}"));
			}
		}
		AuthorMode::Full => {
			let name = payload.author_name.as_deref().unwrap_or("unknown");
			match &payload.author_id {
				Some(id) => lines.push(format!("— {name} ({id})")),
				None => lines.push(format!("— {name}")),
			}
		}
	}

	match config.content_mode {
		ContentMode::Hidden => {}
		ContentMode::Summary => {
			if let Some(summary) = &payload.summary {
				lines.push(summary.clone());
			} else if let Some(body) = &payload.body {
				lines.push(body.clone());
			}
		}
		ContentMode::Full => {
			if let Some(body) = &payload.body {
				lines.push(body.clone());
			}
		}
	}

	if config.show_tags && !payload.tags.is_empty() {
		lines.push(payload.tags.iter().map(|t| format!("#{t}")).collect::<Vec<_>>().join(" "));
	}

	match config.link_mode {
		LinkMode::None => {}
		LinkMode::Clean => lines.push(payload.canonical_url.clone()),
		LinkMode::Original => lines.push(payload.url.clone()),
	}

	if let Some(header) = &config.header_text {
		lines.insert(0, render_template(header, payload));
	}
	if let Some(footer) = &config.footer_text {
		lines.push(render_template(footer, payload));
	}

	truncate(&lines.join("\n"), limit)
}

fn media_urls_for(payload: &PushPayload) -> Vec<&str> {
	match payload.render_config.media_mode {
		MediaMode::None => vec![],
		MediaMode::Cover => payload.cover_url.as_deref().into_iter().collect(),
		MediaMode::Auto | MediaMode::All => {
			if payload.media_urls.is_empty() {
				payload.cover_url.as_deref().into_iter().collect()
			} else {
				payload.media_urls.iter().map(String::as_str).take(MEDIA_GROUP_LIMIT).collect()
			}
		}
	}
}

#[derive(Deserialize)]
struct TelegramResponse {
	ok: bool,
	result: Option<TelegramResult>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TelegramResult {
	Single(TelegramMessage),
	Many(Vec<TelegramMessage>),
}

#[derive(Deserialize)]
struct TelegramMessage {
	message_id: Option<i64>,
}

#[async_trait]
impl PushSink for TelegramSink {
	async fn push(&self, payload: &PushPayload, target_id: &str) -> Result<Option<String>, SinkError> {
		let media = media_urls_for(payload);

		let response = if media.is_empty() {
			let text = build_caption(payload, TEXT_CAPTION_LIMIT);
			self.client
				.post(self.method_url("sendMessage"))
				.json(&json!({ "chat_id": target_id, "text": text }))
				.send()
				.await?
		} else if media.len() == 1 {
			let caption = build_caption(payload, MEDIA_CAPTION_LIMIT);
			let is_video = payload.layout_type.as_deref() == Some("video");
			let (method, field) = if is_video { ("sendVideo", "video") } else { ("sendPhoto", "photo") };
			self.client
				.post(self.method_url(method))
				.json(&json!({ "chat_id": target_id, field: media[0], "caption": caption }))
				.send()
				.await?
		} else {
			let caption = build_caption(payload, MEDIA_CAPTION_LIMIT);
			let items: Vec<_> = media
				.iter()
				.enumerate()
				.map(|(i, url)| {
					let mut item = json!({ "type": "photo", "media": url });
					if i == 0 {
						item["caption"] = json!(caption);
					}
					item
				})
				.collect();
			self.client
				.post(self.method_url("sendMediaGroup"))
				.json(&json!({ "chat_id": target_id, "media": items }))
				.send()
				.await?
		};

		if !response.status().is_success() {
			return Err(SinkError::Rejected(format!("telegram returned status {}", response.status())));
		}

		let parsed: TelegramResponse = response.json().await?;
		if !parsed.ok {
			return Err(SinkError::Rejected("telegram reported ok=false".into()));
		}

		let message_id = match parsed.result {
			Some(TelegramResult::Single(m)) => m.message_id,
			Some(TelegramResult::Many(ms)) => ms.first().and_then(|m| m.message_id),
			None => None,
		};

		Ok(message_id.map(|id| id.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vault_domain::RenderConfig;

	fn sample_payload() -> PushPayload {
		PushPayload {
			id: 42,
			platform: "bilibili".into(),
			content_type: Some("video".into()),
			layout_type: Some("video".into()),
			title: Some("a cool clip".into()),
			body: Some("full body text".into()),
			summary: Some("short summary".into()),
			author_name: Some("someone".into()),
			author_id: Some("uid1".into()),
			author_avatar_url: None,
			cover_url: Some("https://cdn/cover.webp".into()),
			media_urls: vec![],
			tags: vec!["music".into()],
			canonical_url: "https://www.bilibili.com/video/BV1xx".into(),
			url: "https://b23.tv/x".into(),
			clean_url: None,
			is_nsfw: false,
			published_at: None,
			render_config: RenderConfig::default(),
			archive_metadata: None,
		}
	}

	#[test]
	fn caption_truncates_to_limit() {
		let mut payload = sample_payload();
		payload.body = Some("x".repeat(5000));
		payload.render_config.content_mode = ContentMode::Full;
		let caption = build_caption(&payload, MEDIA_CAPTION_LIMIT);
		assert_eq!(caption.chars().count(), MEDIA_CAPTION_LIMIT);
		assert!(caption.ends_with('…'));
	}

	#[test]
	fn media_mode_cover_falls_back_to_cover_url() {
		let mut payload = sample_payload();
		payload.render_config.media_mode = MediaMode::Cover;
		assert_eq!(media_urls_for(&payload), vec!["https://cdn/cover.webp"]);
	}

	#[test]
	fn media_mode_none_sends_no_media() {
		let mut payload = sample_payload();
		payload.render_config.media_mode = MediaMode::None;
		assert!(media_urls_for(&payload).is_empty());
	}
}
