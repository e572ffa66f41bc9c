use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use vault_domain::{AuthorMode, ContentMode, LinkMode, MediaMode};

use crate::error::SinkError;
use crate::payload::{PushPayload, render_template};
use crate::sinks::PushSink;

/// A OneBot-like HTTP sink, posting to a single configured endpoint with a
/// bearer token (§4.J: "HTTP client conventions used elsewhere").
pub struct QqSink {
	client: Client,
	endpoint: String,
	token: String,
}

impl QqSink {
	pub fn new(client: Client, endpoint: String, token: String) -> Self {
		Self { client, endpoint, token }
	}
}

/// Strips the handful of Markdown constructs the render pipeline might
/// produce (bold/italic markers, inline code fences) since the QQ sink
/// sends plain text.
fn strip_markdown(input: &str) -> String {
	input.replace("**", "").replace('*', "").replace('`', "").replace("__", "")
}

fn build_text(payload: &PushPayload) -> String {
	let config = &payload.render_config;
	let mut lines = Vec::new();

	if config.show_title
		&& let Some(title) = &payload.title
	{
		lines.push(title.clone());
	}

	match config.author_mode {
		AuthorMode::None => {}
		AuthorMode::Name | AuthorMode::Full => {
			if let Some(name) = &payload.author_name {
				lines.push(format!("来源: {name}"));
			}
		}
	}

	match config.content_mode {
		ContentMode::Hidden => {}
		ContentMode::Summary => {
			if let Some(summary) = payload.summary.as_ref().or(payload.body.as_ref()) {
				lines.push(summary.clone());
			}
		}
		ContentMode::Full => {
			if let Some(body) = &payload.body {
				lines.push(body.clone());
			}
		}
	}

	if config.show_tags && !payload.tags.is_empty() {
		lines.push(payload.tags.join(" "));
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

	strip_markdown(&lines.join("\n"))
}

fn image_urls(payload: &PushPayload) -> Vec<&str> {
	match payload.render_config.media_mode {
		MediaMode::None => vec![],
		MediaMode::Cover => payload.cover_url.as_deref().into_iter().collect(),
		MediaMode::Auto | MediaMode::All => {
			if payload.media_urls.is_empty() {
				payload.cover_url.as_deref().into_iter().collect()
			} else {
				payload.media_urls.iter().map(String::as_str).collect()
			}
		}
	}
}

#[derive(Deserialize)]
struct QqResponse {
	status: String,
	message_id: Option<i64>,
}

#[async_trait]
impl PushSink for QqSink {
	async fn push(&self, payload: &PushPayload, target_id: &str) -> Result<Option<String>, SinkError> {
		let text = build_text(payload);
		let images = image_urls(payload);

		// A single item is sent directly; more than one is bundled as a
		// merge-forward node set (§4.J: "supports merge-forward for
		// bundling multiple items").
		let body = if images.len() <= 1 {
			json!({
				"target_id": target_id,
				"message": [
					{ "type": "text", "data": { "text": text } },
				],
				"images": images,
			})
		} else {
			json!({
				"target_id": target_id,
				"forward": images.iter().map(|url| json!({ "type": "image", "data": { "url": url } })).collect::<Vec<_>>(),
				"message": [{ "type": "text", "data": { "text": text } }],
			})
		};

		let response = self
			.client
			.post(&self.endpoint)
			.bearer_auth(&self.token)
			.json(&body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(SinkError::Rejected(format!("qq sink returned status {}", response.status())));
		}

		let parsed: QqResponse = response.json().await?;
		if parsed.status != "ok" {
			return Err(SinkError::Rejected(format!("qq sink reported status {}", parsed.status)));
		}

		Ok(parsed.message_id.map(|id| id.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_markdown_emphasis() {
		assert_eq!(strip_markdown("**bold** and `code`"), "bold and code");
	}
}
