//! HTTP methods and URL patterns shared by page assertions and API workflows.

use crate::result::{SondarError, SondarResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
}

impl HttpMethod {
    /// Parse from string (case-insensitive)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            "HEAD" => Some(Self::Head),
            _ => None,
        }
    }

    /// Convert to string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
        }
    }

    /// Whether requests with this method usually carry a body
    #[must_use]
    pub const fn has_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL pattern for matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum UrlPattern {
    /// Exact URL match
    Exact(String),
    /// Prefix match
    Prefix(String),
    /// Contains substring
    Contains(String),
    /// Regex match
    Regex(String),
    /// Glob pattern (e.g., "https://*.mercedes-benz.de/*")
    Glob(String),
    /// Match any URL
    Any,
}

impl UrlPattern {
    /// Reject patterns that can never be evaluated
    ///
    /// # Errors
    ///
    /// [`SondarError::InvalidPredicate`] for a regex that does not compile.
    pub fn validate(&self) -> SondarResult<()> {
        if let Self::Regex(pattern) = self {
            regex::Regex::new(pattern).map_err(|e| {
                SondarError::invalid_predicate(format!("invalid URL regex {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Check if a URL matches this pattern
    ///
    /// An invalid regex matches nothing; call [`validate`](Self::validate)
    /// first to surface it.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(pattern) => url == pattern,
            Self::Prefix(pattern) => url.starts_with(pattern.as_str()),
            Self::Contains(pattern) => url.contains(pattern.as_str()),
            Self::Regex(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(url))
                .unwrap_or(false),
            Self::Glob(pattern) => glob_matches(pattern, url),
            Self::Any => true,
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "url == {p:?}"),
            Self::Prefix(p) => write!(f, "url starts with {p:?}"),
            Self::Contains(p) => write!(f, "url contains {p:?}"),
            Self::Regex(p) => write!(f, "url =~ /{p}/"),
            Self::Glob(p) => write!(f, "url like {p:?}"),
            Self::Any => f.write_str("any url"),
        }
    }
}

/// `*` matches any run of characters, everything else is literal
fn glob_matches(pattern: &str, url: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match parts.split_first() {
        Some(split) => split,
        None => return url.is_empty(),
    };
    let Some(mut remaining) = url.strip_prefix(first) else {
        return false;
    };
    let Some((last, middle)) = rest.split_last() else {
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part) {
            Some(found) => remaining = &remaining[found + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod http_method_tests {
        use super::*;

        #[test]
        fn test_parse_and_display() {
            assert_eq!(HttpMethod::parse("delete"), Some(HttpMethod::Delete));
            assert_eq!(HttpMethod::parse("TRACE"), None);
            assert_eq!(HttpMethod::Post.to_string(), "POST");
            assert!(HttpMethod::Put.has_body());
            assert!(!HttpMethod::Get.has_body());
        }
    }

    mod url_pattern_tests {
        use super::*;

        #[test]
        fn test_simple_patterns() {
            let url = "https://www.mercedes-benz.de/passengercars.html";
            assert!(UrlPattern::Prefix("https://".into()).matches(url));
            assert!(UrlPattern::Contains("mercedes-benz".into()).matches(url));
            assert!(!UrlPattern::Exact("https://www.mercedes-benz.de".into()).matches(url));
            assert!(UrlPattern::Any.matches(url));
        }

        #[test]
        fn test_regex_pattern() {
            let pattern = UrlPattern::Regex(r"^https://www\.mercedes-benz\.(de|com)".into());
            pattern.validate().unwrap();
            assert!(pattern.matches("https://www.mercedes-benz.de/"));
            assert!(!pattern.matches("http://www.mercedes-benz.de/"));
        }

        #[test]
        fn test_invalid_regex_rejected() {
            let pattern = UrlPattern::Regex("(unclosed".into());
            assert!(matches!(
                pattern.validate(),
                Err(SondarError::InvalidPredicate { .. })
            ));
            assert!(!pattern.matches("(unclosed"));
        }

        #[test]
        fn test_glob_pattern() {
            let pattern = UrlPattern::Glob("https://*.mercedes-benz.de/*".into());
            assert!(pattern.matches("https://www.mercedes-benz.de/"));
            assert!(pattern.matches("https://shop.mercedes-benz.de/models/eq"));
            assert!(!pattern.matches("http://www.mercedes-benz.de/"));
            assert!(UrlPattern::Glob("*/api/*/1".into()).matches("https://x/api/posts/1"));
            assert!(!UrlPattern::Glob("*/api/*/1".into()).matches("https://x/api/posts/12"));
            assert!(UrlPattern::Glob("exact".into()).matches("exact"));
        }
    }
}
