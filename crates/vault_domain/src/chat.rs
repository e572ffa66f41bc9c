use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::ids::BotChatId;

/// The kind of chat a `BotChat` row addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChatType {
	Channel,
	Group,
	Supergroup,
	Private,
	QqGroup,
	QqPrivate,
}

impl ChatType {
	pub const fn as_str(self) -> &'static str {
		match self {
			ChatType::Channel => "channel",
			ChatType::Group => "group",
			ChatType::Supergroup => "supergroup",
			ChatType::Private => "private",
			ChatType::QqGroup => "qq_group",
			ChatType::QqPrivate => "qq_private",
		}
	}

	/// Derives the push sink that owns this chat type.
	pub const fn platform_type(self) -> PlatformType {
		match self {
			ChatType::QqGroup | ChatType::QqPrivate => PlatformType::Qq,
			ChatType::Channel | ChatType::Group | ChatType::Supergroup | ChatType::Private => PlatformType::Telegram,
		}
	}
}

/// The push sink a chat belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlatformType {
	Telegram,
	Qq,
}

impl PlatformType {
	pub const fn as_str(self) -> &'static str {
		match self {
			PlatformType::Telegram => "telegram",
			PlatformType::Qq => "qq",
		}
	}
}

/// An addressable push destination.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BotChat {
	pub id: BotChatId,
	pub chat_id: String,
	pub chat_type: ChatType,
	pub enabled: bool,
	pub is_accessible: bool,
	pub nsfw_chat_id: Option<String>,
	pub total_pushed: i64,
	pub last_pushed_at: Option<DateTime<Utc>>,
}

impl BotChat {
	pub const fn platform_type(&self) -> PlatformType {
		self.chat_type.platform_type()
	}

	/// A target a Distribution Worker may currently claim work for.
	pub const fn is_usable(&self) -> bool {
		self.enabled && self.is_accessible
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn platform_type_derivation() {
		assert_eq!(ChatType::QqGroup.platform_type(), PlatformType::Qq);
		assert_eq!(ChatType::QqPrivate.platform_type(), PlatformType::Qq);
		assert_eq!(ChatType::Channel.platform_type(), PlatformType::Telegram);
		assert_eq!(ChatType::Private.platform_type(), PlatformType::Telegram);
	}
}
