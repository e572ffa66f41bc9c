use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseIdError;

/// Supported source platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Platform {
	Bilibili,
	Twitter,
	Xiaohongshu,
	Douyin,
	Weibo,
	Zhihu,
	/// Any link the registry could not match to a named platform.
	Universal,
}

impl Platform {
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Bilibili => "bilibili",
			Platform::Twitter => "twitter",
			Platform::Xiaohongshu => "xiaohongshu",
			Platform::Douyin => "douyin",
			Platform::Weibo => "weibo",
			Platform::Zhihu => "zhihu",
			Platform::Universal => "universal",
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Platform {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err(ParseIdError::Empty);
		}
		match s.to_ascii_lowercase().as_str() {
			"bilibili" => Ok(Platform::Bilibili),
			"twitter" | "x" => Ok(Platform::Twitter),
			"xiaohongshu" | "xhs" => Ok(Platform::Xiaohongshu),
			"douyin" | "tiktok" => Ok(Platform::Douyin),
			"weibo" => Ok(Platform::Weibo),
			"zhihu" => Ok(Platform::Zhihu),
			"universal" | "link" | "generic" => Ok(Platform::Universal),
			other => Err(ParseIdError::Unknown(other.to_string())),
		}
	}
}

macro_rules! surrogate_id {
	($name:ident) => {
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
		#[cfg_attr(feature = "serde", serde(transparent))]
		pub struct $name(pub i64);

		impl $name {
			pub const fn new(id: i64) -> Self {
				Self(id)
			}

			pub const fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}
	};
}

surrogate_id!(ContentId);
surrogate_id!(QueueItemId);
surrogate_id!(DistributionRuleId);
surrogate_id!(DistributionTargetId);
surrogate_id!(BotChatId);
surrogate_id!(TaskId);

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn platform_parse_and_display() {
		assert_eq!("bilibili".parse::<Platform>().unwrap(), Platform::Bilibili);
		assert_eq!("xhs".parse::<Platform>().unwrap(), Platform::Xiaohongshu);
		assert_eq!(Platform::Douyin.to_string(), "douyin");
	}

	#[test]
	fn platform_rejects_empty_and_unknown() {
		assert!("".parse::<Platform>().is_err());
		assert!("myspace".parse::<Platform>().is_err());
	}

	#[test]
	fn surrogate_ids_roundtrip_display() {
		let id = ContentId::new(42);
		assert_eq!(id.to_string(), "42");
		assert_eq!(ContentId::from(42).get(), 42);
	}
}
