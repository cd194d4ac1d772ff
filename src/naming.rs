//! Target-name sanitizing and collision resolution
//!
//! The proposed name from the input is reduced to a bare title (known media
//! extensions stripped, forbidden characters replaced), then given exactly one
//! extension: the one the classifier found, or `webm` after transcoding.
//! Taken names get ` (1)`, ` (2)`, ... before the extension. The existence
//! check and the later publish are not atomic; the repository has the final word.

use crate::error::{Error, Result};
use crate::repository::Repository;
use crate::utils::{MAX_RENAME_ATTEMPTS, numbered_name};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)] // literal patterns
static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[#<>\[\]|{}/\\:"?*\p{Cc}]"#).expect("forbidden-character pattern is valid")
});

#[allow(clippy::expect_used)] // literal pattern
static DASH_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-{2,}").expect("dash-run pattern is valid"));

/// Builds final names for the repository
#[derive(Clone, Debug)]
pub struct NameResolver {
    strip_extensions: Vec<String>,
}

impl NameResolver {
    /// `strip_extensions` are removed from the end of proposed names
    pub fn new<I, S>(strip_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            strip_extensions: strip_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Bare title of a proposed name
    ///
    /// # Errors
    ///
    /// [`Error::InvalidName`] when nothing usable is left.
    pub fn sanitize(&self, proposed: &str) -> Result<String> {
        let stripped = self.strip_known_extensions(proposed.trim());
        let replaced = FORBIDDEN.replace_all(stripped, "-");
        let collapsed = DASH_RUNS.replace_all(&replaced, "-");
        let trimmed = trim_edges(&collapsed);
        let title = trim_edges(self.strip_known_extensions(trimmed));

        if title.is_empty() {
            return Err(Error::InvalidName(format!(
                "'{}' is empty after sanitizing",
                proposed
            )));
        }
        Ok(title.to_string())
    }

    /// Sanitized title plus `extension`, without checking the repository
    pub fn compose(&self, proposed: &str, extension: &str) -> Result<String> {
        Ok(format!(
            "{}.{}",
            self.sanitize(proposed)?,
            extension.trim_start_matches('.').to_ascii_lowercase()
        ))
    }

    /// First name not yet taken in `repository`
    pub async fn resolve(
        &self,
        proposed: &str,
        extension: &str,
        repository: &dyn Repository,
    ) -> Result<String> {
        let title = self.sanitize(proposed)?;
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();

        let first = format!("{}.{}", title, extension);
        if !repository.exists(&first).await? {
            return Ok(first);
        }

        for n in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = numbered_name(&title, n, Some(&extension));
            if !repository.exists(&candidate).await? {
                tracing::debug!(proposed, resolved = %candidate, "Target name taken, using numbered name");
                return Ok(candidate);
            }
        }

        Err(Error::InvalidName(format!(
            "no free name for '{}' after {} attempts",
            first, MAX_RENAME_ATTEMPTS
        )))
    }

    fn strip_known_extensions<'a>(&self, mut name: &'a str) -> &'a str {
        while let Some((stem, ext)) = name.rsplit_once('.') {
            if stem.is_empty() || !self.strip_extensions.contains(&ext.trim().to_ascii_lowercase()) {
                break;
            }
            name = stem.trim_end();
        }
        name
    }
}

fn trim_edges(name: &str) -> &str {
    name.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn resolver() -> NameResolver {
        NameResolver::new(["png", "jpg", "jpeg", "webm", "mp4"])
    }

    #[test]
    fn test_strips_repeated_known_extensions() {
        let r = resolver();
        assert_eq!(r.sanitize("Sunset.jpg.png").unwrap(), "Sunset");
        assert_eq!(r.sanitize("Clip.MP4").unwrap(), "Clip");
        assert_eq!(r.sanitize("Report.v2").unwrap(), "Report.v2");
    }

    #[test]
    fn test_forbidden_characters_replaced_and_collapsed() {
        let r = resolver();
        assert_eq!(
            r.sanitize("a#b<c>d[e]f|g{h}i/j\\k:l\"m?n*o").unwrap(),
            "a-b-c-d-e-f-g-h-i-j-k-l-m-n-o"
        );
        assert_eq!(r.sanitize("What?? Now: [draft].png").unwrap(), "What- Now- -draft");
        assert_eq!(r.sanitize("tab\there").unwrap(), "tab-here");
        assert_eq!(r.sanitize("--.Edge case.--").unwrap(), "Edge case");
    }

    #[test]
    fn test_empty_after_sanitizing_is_invalid() {
        let r = resolver();
        assert!(matches!(r.sanitize("???"), Err(Error::InvalidName(_))));
        assert!(matches!(r.sanitize("-.-"), Err(Error::InvalidName(_))));
        assert!(matches!(r.sanitize("   "), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_compose_single_extension() {
        assert_eq!(resolver().compose("MyClip.mp4", "webm").unwrap(), "MyClip.webm");
        assert_eq!(resolver().compose("Logo", ".PNG").unwrap(), "Logo.png");
    }

    #[tokio::test]
    async fn test_collisions_numbered_in_order() {
        let r = resolver();
        let repo = InMemoryRepository::new().with_existing(["Foo.png"]);
        assert_eq!(r.resolve("Foo", "png", &repo).await.unwrap(), "Foo (1).png");

        let repo = InMemoryRepository::new().with_existing(["Foo.png", "Foo (1).png"]);
        assert_eq!(
            r.resolve("Foo.png", "png", &repo).await.unwrap(),
            "Foo (2).png"
        );
    }

    #[tokio::test]
    async fn test_free_name_used_as_is() {
        let repo = InMemoryRepository::new();
        assert_eq!(
            resolver().resolve("Bar", "svg", &repo).await.unwrap(),
            "Bar.svg"
        );
    }
}
