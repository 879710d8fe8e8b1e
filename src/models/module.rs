//! Module and topic models
//!
//! A module holds an ordered list of topics; a topic holds an ordered list of
//! articles. Ordering is stored as `order_index`, rewritten to the array
//! position whenever the console saves a drag-and-drop result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::article::double_option;
use super::ArticleSummary;

/// Top level of the learning taxonomy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Module {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub icon: Option<String>,
    pub is_published: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateModuleInput {
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl CreateModuleInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn published(mut self) -> Self {
        self.is_published = true;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateModuleInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "double_option")]
    pub icon: Option<Option<String>>,
    pub is_published: Option<bool>,
}

/// Ordered section inside a module
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: i64,
    pub module_id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTopicInput {
    /// Taken from the route, not the body
    #[serde(skip)]
    pub module_id: i64,
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl CreateTopicInput {
    pub fn new(module_id: i64, title: impl Into<String>) -> Self {
        Self {
            module_id,
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTopicInput {
    /// Moving a topic appends it to the end of the target module
    pub module_id: Option<i64>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicWithArticles {
    #[serde(flatten)]
    pub topic: Topic,
    pub articles: Vec<ArticleSummary>,
}

/// A module with its ordered topics and their ordered articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleTree {
    #[serde(flatten)]
    pub module: Module,
    pub topics: Vec<TopicWithArticles>,
}

impl ModuleTree {
    pub fn article_count(&self) -> usize {
        self.topics.iter().map(|t| t.articles.len()).sum()
    }
}
