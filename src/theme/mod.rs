//! Theme engine
//!
//! Template rendering with Tera. The default templates are embedded into
//! the binary; a theme directory on disk may override any of them by
//! shipping a file with the same relative name.

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::models::NavMenuTree;
use crate::services::settings::SiteSettings;

mod error;

pub use error::ThemeError;

/// Default templates compiled into the binary
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

pub struct ThemeEngine {
    tera: Tera,
    override_dir: Option<PathBuf>,
    overridden: Vec<String>,
}

impl ThemeEngine {
    /// Load the embedded templates, then apply overrides from `override_dir`
    ///
    /// A missing override directory is not an error.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut engine = Self {
            tera: Tera::default(),
            override_dir: override_dir.map(Path::to_path_buf),
            overridden: Vec::new(),
        };
        engine.reload()?;
        Ok(engine)
    }

    /// Rebuild the template set from scratch
    pub fn reload(&mut self) -> Result<()> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in EmbeddedTemplates::iter() {
            let Some(file) = EmbeddedTemplates::get(&name) else {
                continue;
            };
            let content = String::from_utf8(file.data.into_owned())
                .with_context(|| format!("Embedded template {} is not UTF-8", name))?;
            templates.push((name.to_string(), content));
        }

        let mut overridden = Vec::new();
        if let Some(dir) = self.override_dir.as_deref().filter(|d| d.is_dir()) {
            let mut from_disk = Vec::new();
            collect_templates(dir, dir, &mut from_disk)?;
            for (name, content) in from_disk {
                match templates.iter_mut().find(|(n, _)| *n == name) {
                    Some(existing) => existing.1 = content,
                    None => templates.push((name.clone(), content)),
                }
                overridden.push(name);
            }
            tracing::info!("Loaded {} template overrides from {}", overridden.len(), dir.display());
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(describe(&e)))?;

        self.tera = tera;
        self.overridden = overridden;
        Ok(())
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e))).into()
        })
    }

    /// Render with the variables every public page shares
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> String {
        let mut full_context = context.clone();
        full_context.insert("site", &standard_vars.site);
        full_context.insert("nav", &standard_vars.nav);
        full_context.insert("request_path", &standard_vars.request_path);
        full_context.insert("year", &standard_vars.year);
        if let Some(ref user) = standard_vars.current_user {
            full_context.insert("current_user", user);
        }
        self.render_with_fallback(template, &full_context)
    }

    /// Render `template`, falling back to `error.html` and then to a
    /// built-in page. Always produces HTML.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render template '{}': {}, trying error template", template, e);

                let mut error_context = context.clone();
                error_context.insert("error_message", &e.to_string());
                error_context.insert("requested_template", template);

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!("Failed to render error template: {}", error_template_err);
                        Self::simple_error_page(template, &e.to_string())
                    }
                }
            }
        }
    }

    /// Last-resort page when even the error template fails
    fn simple_error_page(template: &str, error: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Template Error</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 600px; margin: 50px auto; padding: 20px; }}
        .error-box {{ border-left: 4px solid #e74c3c; padding: 20px; background: #fafafa; }}
        h1 {{ color: #e74c3c; margin-top: 0; }}
    </style>
</head>
<body>
    <div class="error-box">
        <h1>Template Error</h1>
        <p>Failed to render template: <code>{}</code></p>
        <pre>{}</pre>
    </div>
</body>
</html>"#,
            escape_html(template),
            escape_html(error)
        )
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Names replaced or added by the override directory
    pub fn overridden_templates(&self) -> &[String] {
        &self.overridden
    }
}

/// Variables injected into every public page
#[derive(Debug, Clone, Serialize)]
pub struct StandardTemplateVars {
    pub site: SiteSettings,
    pub nav: Vec<NavMenuTree>,
    pub request_path: String,
    pub year: i32,
    pub current_user: Option<CurrentUser>,
}

/// Logged-in user as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

impl From<&crate::models::User> for CurrentUser {
    fn from(user: &crate::models::User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display().to_string(),
            role: user.role.to_string(),
        }
    }
}

impl StandardTemplateVars {
    pub fn new(site: SiteSettings, nav: Vec<NavMenuTree>, request_path: impl Into<String>) -> Self {
        Self {
            site,
            nav,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
            current_user: None,
        }
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.current_user = Some(user);
        self
    }
}

/// Collect `*.html` files below `dir`, named by their path relative to `base`
fn collect_templates(base: &Path, dir: &Path, templates: &mut Vec<(String, String)>) -> Result<()> {
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let name = path
                .strip_prefix(base)
                .with_context(|| format!("{} is outside {}", path.display(), base.display()))?
                .to_string_lossy()
                .replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            templates.push((name, content));
        }
    }
    Ok(())
}

fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
