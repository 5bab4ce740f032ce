//! Utilities for generating deterministic, URL-safe article and category slugs.
//!
//! `slug::slugify` transliterates non-Latin scripts through `deunicode`, so an
//! Arabic-only title still yields an ASCII slug. Uniqueness is checked by a
//! caller-supplied predicate so the generation logic stays pure.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 32;
const MAX_SLUG_LEN: usize = 120;

/// Errors that can occur while generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors that can occur while generating a slug via an async uniqueness check.
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from the provided human-readable text.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.len() > MAX_SLUG_LEN {
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Produce a slug that does not collide according to the awaited predicate.
///
/// `is_unique` returns `true` when the candidate is free. Collisions are
/// retried with a monotonic suffix (`-2`, `-3`, ...).
pub async fn generate_unique_slug<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        let slug = derive_slug("Weekly Media Digest: Gulf Edition").expect("slug");
        assert_eq!(slug, "weekly-media-digest-gulf-edition");
    }

    #[test]
    fn derive_slug_transliterates_arabic() {
        let slug = derive_slug("تقرير الرصد الإعلامي").expect("slug");
        assert!(!slug.is_empty());
        assert!(slug.is_ascii());
    }

    #[test]
    fn derive_slug_rejects_blank_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[tokio::test]
    async fn generate_unique_slug_appends_counter() {
        let existing = Arc::new(Mutex::new(vec!["press-review".to_string()]));

        let slug = generate_unique_slug("Press Review", |candidate| {
            let existing = existing.clone();
            async move {
                let mut guard = existing.lock().await;
                if guard.contains(&candidate) {
                    Ok::<bool, Infallible>(false)
                } else {
                    guard.push(candidate);
                    Ok(true)
                }
            }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "press-review-2");
    }

    #[tokio::test]
    async fn generate_unique_slug_exhausts() {
        let result = generate_unique_slug("Example", |_| async { Ok::<bool, Infallible>(false) })
            .await
            .expect_err("should exhaust attempts");
        assert!(matches!(
            result,
            SlugAsyncError::Slug(SlugError::Exhausted { ref base }) if base == "example"
        ));
    }
}
