/// Include/exclude URL patterns deciding which pages get the clicker at all.
///
/// Patterns are literal text where `*` matches any run of characters,
/// including none. A URL is accepted when it matches at least one include
/// pattern and no exclude pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlFilter {
    includes: Vec<String>,
    excludes: Vec<String>,
}

pub const DEFAULT_EXCLUDES: &[&str] = &["about:*", "file://*"];

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl UrlFilter {
    /// An empty include list means "every URL". The built-in excludes are
    /// always applied in addition to `excludes`.
    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Self {
        let includes = if includes.is_empty() {
            vec!["*".to_string()]
        } else {
            includes
        };
        let mut all_excludes: Vec<String> =
            DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        for pattern in excludes {
            if !all_excludes.contains(&pattern) {
                all_excludes.push(pattern);
            }
        }
        Self {
            includes,
            excludes: all_excludes,
        }
    }

    pub fn accepts(&self, url: &str) -> bool {
        self.includes.iter().any(|p| glob_match(p, url))
            && !self.excludes.iter().any(|p| glob_match(p, url))
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let remaining: Vec<&str> = parts.collect();
    let Some((last, middle)) = remaining.split_last() else {
        // No `*` at all: the whole text must equal the pattern.
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
