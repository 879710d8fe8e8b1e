//! Navigation menu models
//!
//! Menus and sub-menus form a second taxonomy over the same articles, used
//! for the public site header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ArticleSummary;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavMenu {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub is_visible: bool,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNavMenuInput {
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
}

impl CreateNavMenuInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            slug: String::new(),
            title: title.into(),
            is_visible: true,
        }
    }
}

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNavMenuInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub is_visible: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NavSubMenu {
    pub id: i64,
    pub menu_id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNavSubMenuInput {
    #[serde(skip)]
    pub menu_id: i64,
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl CreateNavSubMenuInput {
    pub fn new(menu_id: i64, title: impl Into<String>) -> Self {
        Self {
            menu_id,
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNavSubMenuInput {
    pub menu_id: Option<i64>,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubMenuWithArticles {
    #[serde(flatten)]
    pub sub_menu: NavSubMenu,
    pub articles: Vec<ArticleSummary>,
}

/// A menu with its ordered sub-menus and their ordered articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavMenuTree {
    #[serde(flatten)]
    pub menu: NavMenu,
    pub sub_menus: Vec<SubMenuWithArticles>,
}
