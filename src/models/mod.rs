//! Data models
//!
//! Database entities, input types for create/update operations, and the tree
//! views assembled for the console and the public site.

mod ai_usage;
mod article;
mod media;
mod module;
mod nav;
mod pagination;
mod session;
mod tag;
mod user;

pub use ai_usage::{AiCallStatus, AiKind, AiUsageLog, AiUsageSummary, NewAiUsageLog, TokenUsage};
pub use article::{
    Article, ArticlePlacement, ArticleStatus, ArticleSummary, ArticleWithRelations,
    CreateArticleInput, UpdateArticleInput,
};
pub use media::{MediaAsset, MediaKind, MediaSource, NewMediaAsset};
pub use module::{
    CreateModuleInput, CreateTopicInput, Module, ModuleTree, Topic, TopicWithArticles,
    UpdateModuleInput, UpdateTopicInput,
};
pub use nav::{
    CreateNavMenuInput, CreateNavSubMenuInput, NavMenu, NavMenuTree, NavSubMenu,
    SubMenuWithArticles, UpdateNavMenuInput, UpdateNavSubMenuInput,
};
pub use pagination::{ListParams, PagedResult};
pub use session::Session;
pub use tag::{Tag, TagWithCount};
pub use user::{CreateUserInput, User, UserRole, UserStatus};
