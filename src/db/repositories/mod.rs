//! Database repositories
//!
//! One repository per aggregate. Each exposes an `async_trait` interface and
//! an `Sqlx*Repository` implementation that dispatches on the pool's driver.

pub mod ai_usage;
pub mod article;
pub mod media;
pub mod module;
pub mod nav;
pub(crate) mod ordering;
pub mod session;
pub mod settings;
pub mod tag;
pub mod topic;
pub mod user;

pub use ai_usage::{AiUsageRepository, SqlxAiUsageRepository};
pub use article::{ArticleRepository, SqlxArticleRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use module::{ModuleRepository, SqlxModuleRepository};
pub use nav::{NavRepository, SqlxNavRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use topic::{SqlxTopicRepository, TopicRepository};
pub use user::{SqlxUserRepository, UserRepository};

use sqlx::database::HasArguments;
use sqlx::query::Query;

/// Lookup key for entities addressable by id or slug
#[derive(Debug, Clone, Copy)]
pub(crate) enum Lookup<'a> {
    Id(i64),
    Slug(&'a str),
}

impl Lookup<'_> {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id",
            Lookup::Slug(_) => "slug",
        }
    }

    pub(crate) fn bind_to<'q, DB>(
        self,
        query: Query<'q, DB, <DB as HasArguments<'q>>::Arguments>,
    ) -> Query<'q, DB, <DB as HasArguments<'q>>::Arguments>
    where
        DB: sqlx::Database,
        i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    {
        match self {
            Lookup::Id(id) => query.bind(id),
            Lookup::Slug(slug) => query.bind(slug.to_string()),
        }
    }
}
