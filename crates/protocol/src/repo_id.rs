//! Repository identifier parsing and migration direction resolution.

use crate::types::{DEFAULT_MS_DOMAIN, Platform};

/// Errors produced while interpreting user-supplied repository identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoIdError {
    #[error("invalid repo ID: '{0}'. Expected format: 'username/repo-name'")]
    InvalidFormat(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("cannot determine migration direction; use --to hf|ms or prefix the repo with hf:/ms:")]
    AmbiguousDirection,
}

const PLATFORM_PREFIXES: [(&str, Platform); 4] = [
    ("hf:", Platform::HuggingFace),
    ("huggingface:", Platform::HuggingFace),
    ("ms:", Platform::ModelScope),
    ("modelscope:", Platform::ModelScope),
];

/// Parses `[platform:]namespace/name`.
///
/// Accepted prefixes are `hf:`, `huggingface:`, `ms:` and `modelscope:`
/// (case-insensitive). Returns the bare `namespace/name` and the platform
/// hint, if any.
pub fn parse_repo_id(input: &str) -> Result<(String, Option<Platform>), RepoIdError> {
    let input = input.trim();
    let lower = input.to_ascii_lowercase();

    let mut platform = None;
    let mut rest = input;
    for (prefix, plat) in PLATFORM_PREFIXES {
        if lower.starts_with(prefix) {
            rest = &input[prefix.len()..];
            platform = Some(plat);
            break;
        }
    }

    let Some((namespace, name)) = rest.split_once('/') else {
        return Err(RepoIdError::InvalidFormat(rest.to_string()));
    };
    if !is_valid_segment(namespace) || !is_valid_segment(name) {
        return Err(RepoIdError::InvalidFormat(rest.to_string()));
    }

    Ok((rest.to_string(), platform))
}

/// Splits a validated `namespace/name` into its two parts.
pub fn split_repo_id(repo_id: &str) -> Result<(&str, &str), RepoIdError> {
    match repo_id.split_once('/') {
        Some((ns, name)) if is_valid_segment(ns) && is_valid_segment(name) => Ok((ns, name)),
        _ => Err(RepoIdError::InvalidFormat(repo_id.to_string())),
    }
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
}

/// Parses a destination flag (`hf`, `huggingface`, `ms`, `modelscope`).
pub fn parse_platform(flag: &str) -> Result<Platform, RepoIdError> {
    match flag.trim().to_ascii_lowercase().as_str() {
        "hf" | "huggingface" => Ok(Platform::HuggingFace),
        "ms" | "modelscope" => Ok(Platform::ModelScope),
        other => Err(RepoIdError::UnknownPlatform(other.to_string())),
    }
}

/// Resolves `(source, destination)` platforms.
///
/// An explicit destination wins; otherwise the destination is the opposite
/// of the prefixed source platform.
pub fn detect_direction(
    source_platform: Option<Platform>,
    to: Option<Platform>,
) -> Result<(Platform, Platform), RepoIdError> {
    if let Some(dest) = to {
        return Ok((dest.opposite(), dest));
    }
    if let Some(src) = source_platform {
        return Ok((src, src.opposite()));
    }
    Err(RepoIdError::AmbiguousDirection)
}

/// Strips scheme and trailing slashes from a ModelScope domain.
///
/// An empty input yields [`DEFAULT_MS_DOMAIN`].
pub fn normalize_ms_domain(domain: &str) -> String {
    let mut d = domain.trim().trim_end_matches('/');
    for scheme in ["https://", "http://"] {
        if let Some(stripped) = d.strip_prefix(scheme) {
            d = stripped;
            break;
        }
    }
    let d = d.trim_end_matches('/');
    if d.is_empty() {
        DEFAULT_MS_DOMAIN.to_string()
    } else {
        d.to_string()
    }
}
