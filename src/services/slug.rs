//! Slug generation and validation
//!
//! Slugs are lowercase ASCII letters, digits and hyphens. Non-ASCII
//! letters are kept as-is so titles in other scripts still produce
//! readable URLs.

pub const MAX_SLUG_LENGTH: usize = 128;

/// Derive a slug from free text
///
/// Runs of anything that isn't a letter or digit collapse into a single
/// hyphen; leading and trailing hyphens are dropped.
pub fn generate_slug(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let keep = c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric());
        if keep {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    truncate_slug(slug)
}

fn truncate_slug(slug: String) -> String {
    if slug.chars().count() <= MAX_SLUG_LENGTH {
        return slug;
    }
    let cut: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
    cut.trim_end_matches('-').to_string()
}

/// Check a user-supplied slug, returning a message suitable for the client
pub fn validate_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("Slug cannot be empty".to_string());
    }
    if slug.chars().count() > MAX_SLUG_LENGTH {
        return Err(format!("Slug cannot exceed {} characters", MAX_SLUG_LENGTH));
    }
    if let Some(bad) = slug
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || (!c.is_ascii() && c.is_alphanumeric())))
    {
        return Err(format!("Slug contains invalid character '{}'", bad));
    }
    if slug.starts_with('-') || slug.ends_with('-') || slug.contains("--") {
        return Err("Slug cannot start or end with a hyphen or contain consecutive hyphens".to_string());
    }
    Ok(())
}

/// Slug to use for a create: the supplied one if non-blank, else derived
/// from `title`. `fallback` is used when the title has no usable characters.
pub fn resolve_slug(supplied: &str, title: &str, fallback: &str) -> String {
    let supplied = supplied.trim();
    if !supplied.is_empty() {
        return supplied.to_string();
    }
    let generated = generate_slug(title);
    if generated.is_empty() {
        format!("{}-{}", fallback, &uuid::Uuid::new_v4().simple().to_string()[..8])
    } else {
        generated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generate_slug() {
        assert_eq!(generate_slug("Hello World"), "hello-world");
        assert_eq!(generate_slug("  Getting Started!  "), "getting-started");
        assert_eq!(generate_slug("C++ & Rust: a guide"), "c-rust-a-guide");
        assert_eq!(generate_slug("snake_case_name"), "snake-case-name");
        assert_eq!(generate_slug("---"), "");
        assert_eq!(generate_slug("入门 指南"), "入门-指南");
        assert_eq!(generate_slug("Café Menu"), "café-menu");
    }

    #[test]
    fn test_generate_slug_truncates() {
        let slug = generate_slug(&"word ".repeat(60));
        assert!(slug.chars().count() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_validate_slug() {
        assert!(validate_slug("getting-started").is_ok());
        assert!(validate_slug("v2").is_ok());
        assert!(validate_slug("入门").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Upper").is_err());
        assert!(validate_slug("has space").is_err());
        assert!(validate_slug("-lead").is_err());
        assert!(validate_slug("trail-").is_err());
        assert!(validate_slug("double--hyphen").is_err());
        assert!(validate_slug(&"a".repeat(MAX_SLUG_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_resolve_slug() {
        assert_eq!(resolve_slug(" custom ", "Title", "article"), "custom");
        assert_eq!(resolve_slug("", "My Title", "article"), "my-title");
        let fallback = resolve_slug("", "!!!", "article");
        assert!(fallback.starts_with("article-"));
        assert!(validate_slug(&fallback).is_ok());
    }

    proptest! {
        #[test]
        fn generated_slugs_are_valid_or_empty(text in "\\PC{0,80}") {
            let slug = generate_slug(&text);
            if !slug.is_empty() {
                prop_assert!(validate_slug(&slug).is_ok(), "invalid slug {:?} from {:?}", slug, text);
            }
        }

        #[test]
        fn generation_is_idempotent(text in "[A-Za-z0-9 _.-]{0,60}") {
            let once = generate_slug(&text);
            prop_assert_eq!(generate_slug(&once), once);
        }
    }
}
