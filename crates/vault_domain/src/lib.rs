#![forbid(unsafe_code)]

//! Core entity types shared by every crate in the vault pipeline: platform
//! identifiers, content/queue/rule/chat records, and the id newtypes and
//! error enums that tie them together. Nothing here talks to a database or
//! the network; persistence and transport live in the crates that depend on
//! this one.

mod chat;
mod content;
mod error;
mod ids;
mod queue;
mod rule;
mod task;

pub use chat::{BotChat, ChatType, PlatformType};
pub use content::{
	ArchiveImage, ArchiveMetadata, ArchiveVideo, Content, ContentSource, ContentStats, LayoutType, ParseStatus,
	ReviewStatus,
};
pub use error::ParseIdError;
pub use ids::{BotChatId, ContentId, DistributionRuleId, DistributionTargetId, Platform, QueueItemId, TaskId};
pub use queue::{ContentQueueItem, NsfwRoutingResult, PushedRecord, QueueItemStatus};
pub use rule::{
	AuthorMode, ContentMode, DistributionRule, DistributionTarget, LinkMode, MatchConditions, MediaMode, NsfwPolicy,
	RenderConfig, RenderConfigOverride, TagsMatchMode,
};
pub use task::{Task, TaskStatus};
