use crate::TransferError;

/// Validates a `/`-separated repository path.
///
/// Repository paths are platform independent, so this never consults the
/// host's path rules. Rejected:
/// - empty paths and empty segments (`a//b`)
/// - a leading `/`
/// - backslashes
/// - `..` segments
/// - a drive letter as the first segment (`C:`)
pub fn validate_repo_path(file_path: &str) -> Result<(), TransferError> {
    let invalid = |reason: &str| Err(TransferError::InvalidPath(format!("{reason}: {file_path}")));

    if file_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }
    if file_path.contains('\\') {
        return invalid("backslash not allowed");
    }
    if file_path.starts_with('/') {
        return invalid("absolute path not allowed");
    }

    for (i, segment) in file_path.split('/').enumerate() {
        match segment {
            "" => return invalid("empty path segment"),
            ".." => return invalid("parent directory traversal not allowed"),
            s if i == 0 && is_drive(s) => return invalid("drive prefix not allowed"),
            _ => {}
        }
    }

    Ok(())
}

fn is_drive(segment: &str) -> bool {
    let b = segment.as_bytes();
    b.len() == 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Joins a destination prefix and a relative path with `/`.
///
/// An empty prefix leaves the path unchanged. Both parts are validated.
pub fn join_repo_path(prefix: &str, relative_path: &str) -> Result<String, TransferError> {
    validate_repo_path(relative_path)?;
    let relative_path = relative_path.trim_start_matches("./");

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return Ok(relative_path.to_string());
    }
    validate_repo_path(prefix)?;
    Ok(format!("{prefix}/{relative_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_repo_path("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_repo_path("../../../etc/passwd").is_err());
    }

    #[test]
    fn rejects_nested_parent_dir_traversal() {
        assert!(validate_repo_path("sub/../../../escape").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_repo_path("/tmp/malicious").is_err());
    }

    #[test]
    fn rejects_backslash_separators() {
        assert!(validate_repo_path("weights\\model.bin").is_err());
        assert!(validate_repo_path("..\\escape").is_err());
    }

    #[test]
    fn rejects_drive_prefix_and_empty_segments() {
        assert!(validate_repo_path("C:/Windows").is_err());
        assert!(validate_repo_path("a//b.bin").is_err());
        assert!(validate_repo_path("dir/").is_err());
    }

    #[test]
    fn accepts_colon_inside_names() {
        assert!(validate_repo_path("ckpt/step:100.bin").is_ok());
    }

    #[test]
    fn accepts_nested_weights() {
        assert!(validate_repo_path("unet/diffusion_pytorch_model.safetensors").is_ok());
    }

    #[test]
    fn accepts_dotfile() {
        assert!(validate_repo_path(".gitattributes").is_ok());
    }

    #[test]
    fn join_without_prefix() {
        assert_eq!(join_repo_path("", "a/b.bin").unwrap(), "a/b.bin");
        assert_eq!(join_repo_path("/", "./a.bin").unwrap(), "a.bin");
    }

    #[test]
    fn join_with_prefix() {
        assert_eq!(
            join_repo_path("/mirror/", "weights/model.bin").unwrap(),
            "mirror/weights/model.bin"
        );
    }

    #[test]
    fn join_rejects_traversal_in_either_part() {
        assert!(join_repo_path("ok", "../x").is_err());
        assert!(join_repo_path("../up", "x").is_err());
    }
}
