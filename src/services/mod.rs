//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They are
//! responsible for:
//! - Validating input and generating slugs
//! - Coordinating repositories and the cache
//! - Translating storage failures into per-service error enums

pub mod ai;
pub mod article;
pub mod media;
pub mod module;
pub mod nav;
pub mod password;
pub mod rate_limiter;
pub mod settings;
pub mod slug;
pub mod tag;
pub mod topic;
pub mod user;

use std::collections::HashSet;

pub use ai::{
    AiAction, AiProvider, AiService, AiServiceError, GeneratedMedia, GeneratedText,
    OpenAiCompatibleProvider, TextGeneration, TextRequest,
};
pub use article::{ArticleNeighbors, ArticleService, ArticleServiceError};
pub use media::{MediaService, MediaServiceError};
pub use module::{ModuleService, ModuleServiceError};
pub use nav::{NavMenuService, NavServiceError};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use settings::{SettingsService, SettingsServiceError, SiteSettings};
pub use slug::{generate_slug, validate_slug};
pub use tag::{TagService, TagServiceError};
pub use topic::{TopicService, TopicServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};

/// Check that `requested` is a reordering of exactly the ids in `current`
pub(crate) fn check_permutation(current: &[i64], requested: &[i64]) -> Result<(), String> {
    if current.len() != requested.len() {
        return Err(format!(
            "Expected {} ids but received {}",
            current.len(),
            requested.len()
        ));
    }

    let known: HashSet<i64> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(requested.len());
    for id in requested {
        if !known.contains(id) {
            return Err(format!("Id {} does not belong to this list", id));
        }
        if !seen.insert(*id) {
            return Err(format!("Id {} appears more than once", id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_permutation() {
        assert!(check_permutation(&[1, 2, 3], &[3, 1, 2]).is_ok());
        assert!(check_permutation(&[], &[]).is_ok());
        assert!(check_permutation(&[1, 2, 3], &[1, 2]).is_err());
        assert!(check_permutation(&[1, 2, 3], &[1, 2, 4]).is_err());
        assert!(check_permutation(&[1, 2, 3], &[1, 1, 2]).is_err());
    }

    proptest! {
        #[test]
        fn property_any_shuffle_is_accepted(
            ids in proptest::collection::hash_set(1i64..10_000, 0..30)
                .prop_map(|s| s.into_iter().collect::<Vec<_>>())
                .prop_shuffle()
        ) {
            let mut sorted = ids.clone();
            sorted.sort_unstable();
            prop_assert!(check_permutation(&sorted, &ids).is_ok());
        }

        #[test]
        fn property_foreign_id_is_rejected(
            ids in proptest::collection::hash_set(1i64..10_000, 1..30)
                .prop_map(|s| s.into_iter().collect::<Vec<_>>())
        ) {
            let mut requested = ids.clone();
            requested[0] = 20_000;
            prop_assert!(check_permutation(&ids, &requested).is_err());
        }
    }
}
