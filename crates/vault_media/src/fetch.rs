use std::time::Duration;

use crate::error::MediaError;
use crate::headers::{encode_request_url, headers_for_url};

/// Fetches `orig_url`, retrying transient failures up to `attempts` times
/// with a growing delay (`backoff_unit * attempt`) between tries.
pub async fn fetch_with_retries(
	client: &reqwest::Client,
	orig_url: &str,
	timeout: Duration,
	attempts: u32,
	backoff_unit: Duration,
) -> Result<reqwest::Response, MediaError> {
	let request_url = encode_request_url(orig_url);
	let headers = headers_for_url(orig_url);

	let mut last_err = None;
	for attempt in 1..=attempts {
		let result = client.get(&request_url).headers(headers.clone()).timeout(timeout).send().await;

		match result {
			Ok(resp) => match resp.error_for_status() {
				Ok(resp) => return Ok(resp),
				Err(err) => last_err = Some(err),
			},
			Err(err) => last_err = Some(err),
		}

		if attempt < attempts {
			tokio::time::sleep(backoff_unit * attempt).await;
		}
	}

	Err(last_err.expect("loop runs at least once").into())
}
