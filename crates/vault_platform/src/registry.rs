use async_trait::async_trait;
use vault_domain::Platform;

use crate::canonical::canonicalize_url;
use crate::error::AdapterError;
use crate::parsed::ParsedContent;

/// Per-platform scraper contract. Bodies that do real HTML/API scraping are
/// out of scope for this core; what's specified is the shape every adapter
/// must expose and the classified errors it may raise.
#[async_trait]
pub trait Adapter: Send + Sync {
	fn platform(&self) -> Platform;

	/// Canonical form of `url` as this adapter understands it. Called after
	/// the shared `canonicalize_url` step in §6.5; adapters only need to
	/// handle platform-specific quirks the shared step doesn't.
	fn clean_url(&self, url: &str) -> String {
		url.to_string()
	}

	async fn parse(&self, url: &str) -> Result<ParsedContent, AdapterError>;
}

type DetectFn = fn(&url::Url) -> bool;

struct Registration {
	platform: Platform,
	detect: DetectFn,
	build: fn() -> Box<dyn Adapter>,
}

/// Maps URLs to platforms and platforms to adapter instances. Detection
/// order matters: the first matching registration wins, with `Universal`
/// registered last as the catch-all.
pub struct AdapterRegistry {
	registrations: Vec<Registration>,
}

impl Default for AdapterRegistry {
	fn default() -> Self {
		Self::with_builtin_adapters()
	}
}

impl AdapterRegistry {
	pub fn new() -> Self {
		Self { registrations: Vec::new() }
	}

	pub fn with_builtin_adapters() -> Self {
		let mut registry = Self::new();
		registry.register(Platform::Bilibili, crate::adapters::bilibili::detect, || {
			Box::new(crate::adapters::bilibili::BilibiliAdapter)
		});
		registry.register(Platform::Universal, |_| true, || Box::new(crate::adapters::generic::GenericAdapter));
		registry
	}

	pub fn register(&mut self, platform: Platform, detect: DetectFn, build: fn() -> Box<dyn Adapter>) {
		self.registrations.push(Registration { platform, detect, build });
	}

	/// Detects the platform a canonicalized URL belongs to, or `None` if no
	/// registration (including the catch-all) matches — which only happens
	/// on an unparseable URL.
	pub fn detect_platform(&self, canonical_url: &str) -> Option<Platform> {
		let parsed = url::Url::parse(canonical_url).ok()?;
		self.registrations.iter().find(|r| (r.detect)(&parsed)).map(|r| r.platform)
	}

	pub fn create(&self, platform: Platform) -> Option<Box<dyn Adapter>> {
		self.registrations.iter().find(|r| r.platform == platform).map(|r| (r.build)())
	}

	/// Canonicalizes `raw_url`, detects its platform, and builds the adapter
	/// for it in one step — the entry point ingestion calls.
	pub fn resolve(&self, raw_url: &str) -> Result<(Platform, String, Box<dyn Adapter>), crate::canonical::CanonicalizeError> {
		let canonical = canonicalize_url(raw_url)?;
		let platform = self.detect_platform(&canonical).unwrap_or(Platform::Universal);
		let adapter = self.create(platform).expect("catch-all adapter always registered");
		Ok((platform, canonical, adapter))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn detects_bilibili_host() {
		let registry = AdapterRegistry::with_builtin_adapters();
		assert_eq!(registry.detect_platform("https://www.bilibili.com/video/BV1xx411c7Xg"), Some(Platform::Bilibili));
	}

	#[test]
	fn falls_back_to_universal() {
		let registry = AdapterRegistry::with_builtin_adapters();
		assert_eq!(registry.detect_platform("https://example.com/whatever"), Some(Platform::Universal));
	}

	#[test]
	fn resolve_canonicalizes_and_detects() {
		let registry = AdapterRegistry::with_builtin_adapters();
		let (platform, canonical, _adapter) = registry.resolve("BV1xx411c7Xg").unwrap();
		assert_eq!(platform, Platform::Bilibili);
		assert_eq!(canonical, "https://www.bilibili.com/video/BV1xx411c7Xg");
	}
}
