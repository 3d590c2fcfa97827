//! Allow/ignore path filtering.
//!
//! Patterns use `*` (any run of characters, including `/`) and `?` (one
//! character). A pattern ending in `/` matches everything under that
//! directory.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilter {
    /// When non-empty, only matching paths are kept.
    pub allow: Vec<String>,
    /// Matching paths are dropped, even if allowed.
    pub ignore: Vec<String>,
}

impl PathFilter {
    pub fn new(allow: Vec<String>, ignore: Vec<String>) -> Self {
        Self { allow, ignore }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.ignore.is_empty()
    }

    pub fn is_included(&self, path: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|p| pattern_matches(p, path));
        allowed && !self.ignore.iter().any(|p| pattern_matches(p, path))
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    if let Some(dir) = pattern.strip_suffix('/') {
        return path.starts_with(dir) && path[dir.len()..].starts_with('/');
    }
    wildcard_match(pattern, path)
}

/// Matches `text` against a `*`/`?` wildcard pattern.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
