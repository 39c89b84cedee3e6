//! Pattern preparation and path normalization.
//!
//! A route pattern is turned into a regular expression in three steps:
//!
//! ```text
//! base + trim(pattern, '/') + '/'      "/user/{num}"   → "/user/{num}/"
//! collapse "//"                        "//a//b/"       → "/a/b/"
//! substitute shortcut tokens           "/user/{num}/"  → "/user/([0-9\.,]+)/"
//! ```
//!
//! Token substitution is a case-insensitive plain substring replacement,
//! token by token in table order. A token that appears inside the fragment
//! of an earlier token is substituted again.

use regex::{NoExpand, Regex, RegexBuilder};

use crate::routing::error::RouteError;

/// The built-in shortcut tokens, in substitution order.
pub const DEFAULT_SHORTCUTS: [(&str, &str); 7] = [
    ("{num}", r"([0-9\.,]+)"),
    ("{alpha}", r"([a-zA-Z]+)"),
    ("{alnum}", r"([a-zA-Z0-9\.\w]+)"),
    ("{str}", r"([a-zA-Z0-9_.\-\w]+)"),
    ("{any}", r"([^/]+)"),
    // Makes the slash before it optional, so `/files/{*}` also matches `/files/`.
    ("{*}", r"?(.*?)"),
    ("{date}", r"([0-9]+/[0-9]{2}/[0-9]{2})"),
];

/// Ordered token → regex fragment table.
#[derive(Debug, Clone)]
pub struct Shortcuts {
    entries: Vec<(String, String)>,
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            entries: DEFAULT_SHORTCUTS
                .iter()
                .map(|(token, fragment)| (token.to_string(), fragment.to_string()))
                .collect(),
        }
    }
}

impl Shortcuts {
    /// A table with no tokens at all.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a token, or replace the fragment of an existing one in place.
    pub fn set(&mut self, token: impl Into<String>, fragment: impl Into<String>) {
        let token = token.into();
        let fragment = fragment.into();
        match self.entries.iter_mut().find(|(t, _)| *t == token) {
            Some(entry) => entry.1 = fragment,
            None => self.entries.push((token, fragment)),
        }
    }

    /// Remove a token. Returns whether it was present.
    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(t, _)| t != token);
        self.entries.len() != before
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, f)| f.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, f)| (t.as_str(), f.as_str()))
    }

    /// Replace every token in `pattern`, in table order.
    pub fn apply(&self, pattern: &str) -> String {
        let mut out = pattern.to_string();
        for (token, fragment) in &self.entries {
            if token.is_empty() {
                continue;
            }
            let Ok(finder) = RegexBuilder::new(&regex::escape(token))
                .case_insensitive(true)
                .build()
            else {
                continue;
            };
            out = finder.replace_all(&out, NoExpand(fragment)).into_owned();
        }
        out
    }
}

/// Normalize a request path: no NUL bytes, exactly one leading and one
/// trailing slash, no doubled slashes. Applying it twice changes nothing.
pub fn normalize_path(path: &str) -> String {
    let cleaned: String = path.chars().filter(|c| *c != '\0').collect();
    collapse_slashes(&format!("/{}/", cleaned.trim_matches('/')))
}

/// `base + trim(pattern, '/') + '/'` with doubled slashes collapsed, then
/// shortcut substitution.
pub fn prepare(base: &str, pattern: &str, shortcuts: &Shortcuts) -> String {
    let joined = format!("{base}{}/", pattern.trim_matches('/'));
    shortcuts.apply(&collapse_slashes(&joined))
}

/// Compile a prepared pattern. `full` anchors both ends; otherwise only
/// the start is anchored and the match may stop anywhere in the path.
pub fn compile(prepared: &str, full: bool) -> Result<Regex, RouteError> {
    let anchored = if full {
        format!("^{prepared}$")
    } else {
        format!("^{prepared}")
    };
    Regex::new(&anchored).map_err(|source| RouteError::Pattern {
        pattern: prepared.to_string(),
        source,
    })
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("user/42"), "/user/42/");
        assert_eq!(normalize_path("//user///42//"), "/user/42/");
        assert_eq!(normalize_path("/a\0b/"), "/ab/");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for path in ["", "a", "/a/b", "///x////y///", "/\0/\0a//", "a b/c"] {
            let once = normalize_path(path);
            assert_eq!(normalize_path(&once), once, "input {path:?}");
        }
    }

    #[test]
    fn test_prepare_substitutes_shortcuts() {
        let shortcuts = Shortcuts::default();
        assert_eq!(
            prepare("/", "/user/{num}", &shortcuts),
            r"/user/([0-9\.,]+)/"
        );
        assert_eq!(prepare("/", "", &shortcuts), "/");
        assert_eq!(prepare("/blog/", "//post//", &shortcuts), "/blog/post/");
    }

    #[test]
    fn test_tokens_are_case_insensitive() {
        let shortcuts = Shortcuts::default();
        assert_eq!(prepare("/", "{NUM}", &shortcuts), r"/([0-9\.,]+)/");
    }

    #[test]
    fn test_token_inside_earlier_fragment_is_substituted_again() {
        let mut shortcuts = Shortcuts::empty();
        shortcuts.set("{id}", "({digit})");
        shortcuts.set("{digit}", "[0-9]+");
        assert_eq!(prepare("/", "{id}", &shortcuts), "/([0-9]+)/");
    }

    #[test]
    fn test_shortcut_set_keeps_position() {
        let mut shortcuts = Shortcuts::default();
        shortcuts.set("{num}", "(\\d+)");
        assert_eq!(shortcuts.iter().next(), Some(("{num}", "(\\d+)")));
        assert!(shortcuts.remove("{num}"));
        assert!(!shortcuts.remove("{num}"));
        assert_eq!(shortcuts.get("{num}"), None);
    }

    #[test]
    fn test_default_fragments_compile() {
        let shortcuts = Shortcuts::default();
        for (token, _) in DEFAULT_SHORTCUTS {
            let prepared = prepare("/", &format!("x/{token}"), &shortcuts);
            assert!(compile(&prepared, true).is_ok(), "{token}");
        }
    }

    #[test]
    fn test_compile_anchoring() {
        let full = compile("/a/", true).unwrap();
        let prefix = compile("/a/", false).unwrap();
        assert!(full.is_match("/a/"));
        assert!(!full.is_match("/a/b/"));
        assert!(prefix.is_match("/a/b/"));
        assert!(!prefix.is_match("/x/a/"));
    }

    #[test]
    fn test_date_shortcut() {
        let shortcuts = Shortcuts::default();
        let re = compile(&prepare("/", "archive/{date}", &shortcuts), true).unwrap();
        let caps = re.captures("/archive/2014/03/09/").unwrap();
        assert_eq!(&caps[1], "2014/03/09");
        assert!(!re.is_match("/archive/2014/3/09/"));
    }

    #[test]
    fn test_wildcard_tail_is_optional() {
        let shortcuts = Shortcuts::default();
        let re = compile(&prepare("/", "files/{*}", &shortcuts), true).unwrap();
        assert_eq!(&re.captures("/files/a/b/").unwrap()[1], "a/b");
        assert_eq!(&re.captures("/files/").unwrap()[1], "");
        assert!(!re.is_match("/filesx/"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            compile("/(unclosed/", true),
            Err(RouteError::Pattern { .. })
        ));
    }
}
