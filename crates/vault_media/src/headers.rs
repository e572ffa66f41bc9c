use reqwest::header::{HeaderMap, HeaderValue};

const USER_AGENT: &str =
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Some CDNs (bilibili, Weibo, Zhihu) reject requests without a Referer that
/// matches their own site, so the headers sent depend on where the URL lives.
pub fn headers_for_url(url: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));
	headers.insert("Accept", HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"));

	let lowered = url.to_ascii_lowercase();
	if lowered.contains("hdslb.com/") {
		headers.insert("Referer", HeaderValue::from_static("https://www.bilibili.com/"));
		headers.insert("Origin", HeaderValue::from_static("https://www.bilibili.com"));
	} else if lowered.contains("sinaimg.cn") || lowered.contains("weibocdn.com") {
		headers.insert("Referer", HeaderValue::from_static("https://weibo.com/"));
	} else if lowered.contains("zhimg.com") || lowered.contains("zhihu.com") {
		headers.insert("Referer", HeaderValue::from_static("https://www.zhihu.com/"));
		headers.insert("Origin", HeaderValue::from_static("https://www.zhihu.com"));
	}

	headers
}

/// Percent-encodes a URL path, leaving `/` and `%` untouched so octets that
/// are already encoded aren't double-encoded.
fn encode_keeping(input: &str, extra_safe: &[u8]) -> String {
	let mut out = String::with_capacity(input.len());
	for byte in input.bytes() {
		let safe = byte.is_ascii_alphanumeric()
			|| matches!(byte, b'-' | b'_' | b'.' | b'~')
			|| extra_safe.contains(&byte);
		if safe {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{byte:02X}"));
		}
	}
	out
}

/// Percent-encodes the path and query of a URL while leaving already-encoded
/// octets alone, so CDN URLs with raw CJK characters or spaces survive the
/// trip through `reqwest`.
pub fn encode_request_url(raw: &str) -> String {
	let Ok(mut parsed) = url::Url::parse(raw) else {
		return raw.to_string();
	};

	let encoded_path = encode_keeping(parsed.path(), b"/%");
	parsed.set_path(&encoded_path);
	if let Some(query) = parsed.query() {
		let encoded_query = encode_keeping(query, b"=&%");
		parsed.set_query(Some(&encoded_query));
	}
	parsed.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn picks_bilibili_referer_for_hdslb_cdn() {
		let headers = headers_for_url("https://i0.hdslb.com/bfs/archive/abc.jpg");
		assert_eq!(headers.get("Referer").unwrap(), "https://www.bilibili.com/");
	}

	#[test]
	fn no_special_referer_for_unknown_host() {
		let headers = headers_for_url("https://example.com/a.jpg");
		assert!(headers.get("Referer").is_none());
	}

	#[test]
	fn encode_request_url_preserves_already_encoded_octets() {
		let encoded = encode_request_url("https://cdn.example/a%20b/c.jpg");
		assert_eq!(encoded, "https://cdn.example/a%20b/c.jpg");
	}

	#[test]
	fn encode_request_url_escapes_raw_unicode() {
		let encoded = encode_request_url("https://cdn.example/图.jpg");
		assert!(encoded.contains("%E5%9B%BE"));
	}
}
