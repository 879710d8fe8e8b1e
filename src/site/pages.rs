//! Public knowledge-base pages

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, Uri},
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::{PageRenderer, PageResult, Pagination, HOME_LIST_SIZE};
use crate::api::common::default_page;
use crate::api::middleware::AppState;
use crate::models::{ListParams, PagedResult};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchPageQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn pagination<T>(result: &PagedResult<T>, base_url: String) -> Pagination {
    Pagination {
        page: result.page,
        total_pages: result.total_pages(),
        base_url,
    }
}

/// GET /
pub async fn home(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;

    let modules = state.module_service.tree(true).await.map_err(page.fail())?;
    let popular = state
        .article_service
        .popular(HOME_LIST_SIZE)
        .await
        .map_err(page.fail())?;
    let recent = state
        .article_service
        .recent(HOME_LIST_SIZE)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    context.insert("modules", &modules);
    context.insert("popular", &popular);
    context.insert("recent", &recent);
    Ok(page.render("index.html", &context))
}

/// GET /modules/{slug}
pub async fn module_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let module = state
        .module_service
        .tree_by_slug(&slug, true)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    context.insert("module", &module);
    Ok(page.render("module.html", &context))
}

/// GET /topics/{slug}
///
/// Topics of an unpublished module are hidden along with it.
pub async fn topic_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let topic = state.topic_service.get_by_slug(&slug).await.map_err(page.fail())?;
    let module = state
        .module_service
        .get_by_id(topic.module_id)
        .await
        .map_err(page.fail())?;
    if !module.is_published {
        return Err(page.failure(super::PageFailure::NotFound));
    }
    let articles = state
        .topic_service
        .published_articles(topic.id)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    context.insert("topic", &topic);
    context.insert("module", &module);
    context.insert("articles", &articles);
    Ok(page.render("topic.html", &context))
}

/// GET /articles/{slug}
///
/// Counts the view, then renders with the breadcrumb of the first topic
/// and its previous/next links.
pub async fn article_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let mut article = state
        .article_service
        .get_published_by_slug(&slug)
        .await
        .map_err(page.fail())?;

    match state.article_service.increment_view_count(article.id).await {
        Ok(count) => article.view_count = count,
        Err(e) => tracing::warn!("Failed to count view of {}: {}", article.slug, e),
    }

    let neighbors = state.article_service.neighbors(&article).await.map_err(page.fail())?;
    let article = state
        .article_service
        .with_relations(article)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    if let Some(placement) = article.topics.first() {
        context.insert("placement", placement);
    }
    context.insert("neighbors", &neighbors);
    context.insert("article", &article);
    Ok(page.render("article.html", &context))
}

/// GET /nav/{slug}
pub async fn sub_menu_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let sub_menu = state
        .nav_service
        .get_sub_menu_by_slug(&slug)
        .await
        .map_err(page.fail())?;
    let menu = state.nav_service.get_menu(sub_menu.menu_id).await.map_err(page.fail())?;
    if !menu.is_visible {
        return Err(page.failure(super::PageFailure::NotFound));
    }
    let articles = state
        .nav_service
        .sub_menu_articles(sub_menu.id, true)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    context.insert("sub_menu", &sub_menu);
    context.insert("articles", &articles);
    Ok(page.render("sub_menu.html", &context))
}

/// GET /tags/{slug}?page=
pub async fn tag_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let tag = state.tag_service.get_by_slug(&slug).await.map_err(page.fail())?;
    let params = ListParams::new(query.page, page.site().articles_per_page);
    let result = state
        .article_service
        .list_by_tag(tag.id, true, &params)
        .await
        .map_err(page.fail())?;

    let mut context = TeraContext::new();
    context.insert("pagination", &pagination(&result, format!("/tags/{}?", tag.slug)));
    context.insert("tag", &tag);
    context.insert("articles", &result.items);
    Ok(page.render("tag.html", &context))
}

/// GET /search?q=&page=
pub async fn search_page(
    State(state): State<AppState>,
    Query(query): Query<SearchPageQuery>,
    uri: Uri,
    headers: HeaderMap,
) -> PageResult {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let per_page = page.site().articles_per_page;
    let params = ListParams::new(query.page, per_page);
    let result = state
        .article_service
        .search(&query.q, true, &params)
        .await
        .map_err(page.fail())?;

    let base_url = format!("/search?q={}&", urlencoding::encode(query.q.trim()));
    let mut context = TeraContext::new();
    context.insert("query", query.q.trim());
    context.insert("total", &result.total);
    context.insert("pagination", &pagination(&result, base_url));
    context.insert("articles", &result.items);
    Ok(page.render("search.html", &context))
}
