use url::Url;

const DROPPED_QUERY_KEYS: &[&str] = &["gclid", "fbclid", "spm_id_from", "from_source", "vd_source"];

/// Rewrites a bare bilibili identifier (`BV...`, `av123`, `cv123`) typed
/// without a URL into the canonical bilibili URL it refers to. Returns
/// `None` when `input` doesn't look like one of these bare forms.
fn rewrite_bare_bilibili_id(input: &str) -> Option<String> {
	if input.contains('/') || input.contains(':') || input.contains('.') || input.contains(' ') {
		return None;
	}

	if input.len() >= 3 && input.starts_with("BV") && input[2..].chars().all(|c| c.is_ascii_alphanumeric()) {
		return Some(format!("https://www.bilibili.com/video/{input}"));
	}

	let lower = input.to_ascii_lowercase();
	if let Some(num) = lower.strip_prefix("av") {
		if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
			return Some(format!("https://www.bilibili.com/video/av{num}"));
		}
	}
	if let Some(num) = lower.strip_prefix("cv") {
		if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
			return Some(format!("https://www.bilibili.com/read/cv{num}"));
		}
	}

	None
}

/// Deterministic URL canonicalization used both for ingest dedup and for
/// adapter dispatch. `canon(canon(u)) == canon(u)` for any `u` this returns
/// `Ok` for.
pub fn canonicalize_url(input: &str) -> Result<String, CanonicalizeError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(CanonicalizeError::Empty);
	}

	if let Some(rewritten) = rewrite_bare_bilibili_id(trimmed) {
		return canonicalize_url(&rewritten);
	}

	let with_scheme = if trimmed.contains("://") {
		trimmed.to_string()
	} else {
		format!("https://{trimmed}")
	};

	let mut url = Url::parse(&with_scheme).map_err(|e| CanonicalizeError::Invalid(e.to_string()))?;

	if let Some(host) = url.host_str() {
		let lower = host.to_ascii_lowercase();
		if lower != host {
			url.set_host(Some(&lower)).map_err(|e| CanonicalizeError::Invalid(e.to_string()))?;
		}
	}

	url.set_fragment(None);

	let kept_pairs: Vec<(String, String)> = url
		.query_pairs()
		.filter(|(k, _)| {
			let k = k.to_ascii_lowercase();
			!k.starts_with("utm_") && !DROPPED_QUERY_KEYS.contains(&k.as_str())
		})
		.map(|(k, v)| (k.into_owned(), v.into_owned()))
		.collect();

	if kept_pairs.is_empty() {
		url.set_query(None);
	} else {
		url.query_pairs_mut().clear().extend_pairs(kept_pairs);
	}

	Ok(url.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalizeError {
	#[error("empty url")]
	Empty,
	#[error("invalid url: {0}")]
	Invalid(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prepends_https_when_scheme_missing() {
		assert_eq!(canonicalize_url("example.com/a").unwrap(), "https://example.com/a");
	}

	#[test]
	fn lowercases_host() {
		assert_eq!(canonicalize_url("https://Example.COM/a").unwrap(), "https://example.com/a");
	}

	#[test]
	fn drops_fragment() {
		assert_eq!(canonicalize_url("https://example.com/a#section").unwrap(), "https://example.com/a");
	}

	#[test]
	fn drops_tracking_query_params() {
		let got = canonicalize_url("https://example.com/a?utm_source=x&gclid=y&keep=1").unwrap();
		assert_eq!(got, "https://example.com/a?keep=1");
	}

	#[test]
	fn drops_bilibili_specific_tracking_param() {
		let got = canonicalize_url("https://www.bilibili.com/video/BV1xx411c7Xg?spm_id_from=foo").unwrap();
		assert_eq!(got, "https://www.bilibili.com/video/BV1xx411c7Xg");
	}

	#[test]
	fn rewrites_bare_bv_id() {
		let got = canonicalize_url("BV1xx411c7Xg").unwrap();
		assert_eq!(got, "https://www.bilibili.com/video/BV1xx411c7Xg");
	}

	#[test]
	fn rewrites_bare_av_id() {
		let got = canonicalize_url("av170001").unwrap();
		assert_eq!(got, "https://www.bilibili.com/video/av170001");
	}

	#[test]
	fn rewrites_bare_cv_id() {
		let got = canonicalize_url("cv123456").unwrap();
		assert_eq!(got, "https://www.bilibili.com/read/cv123456");
	}

	#[test]
	fn rejects_empty() {
		assert_eq!(canonicalize_url("   ").unwrap_err(), CanonicalizeError::Empty);
	}

	#[test]
	fn idempotent_on_already_canonical_input() {
		let once = canonicalize_url("https://Example.com/a?utm_source=x&keep=1#frag").unwrap();
		let twice = canonicalize_url(&once).unwrap();
		assert_eq!(once, twice);
	}

	proptest::proptest! {
		#[test]
		fn idempotence_holds_for_generated_urls(host in "[a-z]{3,8}\\.(com|net)", path in "[a-z/]{0,10}") {
			let input = format!("https://{host}/{path}");
			if let Ok(once) = canonicalize_url(&input) {
				let twice = canonicalize_url(&once).unwrap();
				prop_assert_eq!(once, twice);
			}
		}
	}
}
