//! Large-object pointer files.
//!
//! A large object is kept out of the repository tree; the tree holds a
//! small text pointer instead:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393
//! size 12345
//! ```

use crate::TransferError;
use crate::checksum::normalize_hash;

const POINTER_VERSION_PREFIX: &str = "version https://git-lfs.github.com/spec/";

/// Pointers are tiny; anything larger is real content.
pub const MAX_POINTER_LEN: usize = 1024;

/// Size and content hash recovered from a pointer, without the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeObjectPointer {
    /// Lowercase SHA-256 hex digest of the payload.
    pub oid: String,
    pub size: u64,
}

impl LargeObjectPointer {
    pub fn new(oid: &str, size: u64) -> Self {
        Self {
            oid: normalize_hash(oid),
            size,
        }
    }

    /// Cheap check used before attempting a full parse.
    pub fn looks_like_pointer(data: &[u8]) -> bool {
        data.len() <= MAX_POINTER_LEN && data.starts_with(POINTER_VERSION_PREFIX.as_bytes())
    }

    /// Parses pointer text.
    pub fn parse(text: &str) -> Result<Self, TransferError> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.starts_with(POINTER_VERSION_PREFIX) => {}
            _ => return Err(TransferError::InvalidPointer("missing version line".into())),
        }

        let mut oid = None;
        let mut size = None;
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(' ') else {
                return Err(TransferError::InvalidPointer(format!("malformed line: {line}")));
            };
            match key {
                "oid" => {
                    let Some(hex) = value.strip_prefix("sha256:") else {
                        return Err(TransferError::InvalidPointer(format!(
                            "unsupported oid: {value}"
                        )));
                    };
                    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(TransferError::InvalidPointer(format!("bad oid: {value}")));
                    }
                    oid = Some(hex.to_ascii_lowercase());
                }
                "size" => {
                    let parsed = value
                        .parse::<u64>()
                        .map_err(|_| TransferError::InvalidPointer(format!("bad size: {value}")))?;
                    size = Some(parsed);
                }
                // Extension keys are allowed and ignored.
                _ => {}
            }
        }

        match (oid, size) {
            (Some(oid), Some(size)) => Ok(Self { oid, size }),
            (None, _) => Err(TransferError::InvalidPointer("missing oid".into())),
            (_, None) => Err(TransferError::InvalidPointer("missing size".into())),
        }
    }

    /// Parses raw bytes, rejecting anything that is not a pointer.
    pub fn parse_bytes(data: &[u8]) -> Result<Self, TransferError> {
        if !Self::looks_like_pointer(data) {
            return Err(TransferError::InvalidPointer("not a pointer file".into()));
        }
        let text = std::str::from_utf8(data)
            .map_err(|_| TransferError::InvalidPointer("pointer is not UTF-8".into()))?;
        Self::parse(text)
    }

    /// Renders the canonical pointer text.
    pub fn to_pointer_text(&self) -> String {
        format!(
            "version https://git-lfs.github.com/spec/v1\noid sha256:{}\nsize {}\n",
            self.oid, self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID: &str = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    #[test]
    fn parses_canonical_pointer() {
        let text = format!("version https://git-lfs.github.com/spec/v1\noid sha256:{OID}\nsize 12345\n");
        let ptr = LargeObjectPointer::parse(&text).unwrap();
        assert_eq!(ptr.oid, OID);
        assert_eq!(ptr.size, 12345);
    }

    #[test]
    fn rendered_text_parses_back() {
        let ptr = LargeObjectPointer::new(&OID.to_uppercase(), 7);
        let parsed = LargeObjectPointer::parse(&ptr.to_pointer_text()).unwrap();
        assert_eq!(parsed, ptr);
    }

    #[test]
    fn ignores_extension_keys() {
        let text = format!(
            "version https://git-lfs.github.com/spec/v1\next-0-foo sha256:{OID}\noid sha256:{OID}\nsize 1\n"
        );
        assert!(LargeObjectPointer::parse(&text).is_ok());
    }

    #[test]
    fn rejects_missing_version() {
        let text = format!("oid sha256:{OID}\nsize 1\n");
        assert!(LargeObjectPointer::parse(&text).is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let no_size = format!("version https://git-lfs.github.com/spec/v1\noid sha256:{OID}\n");
        assert!(LargeObjectPointer::parse(&no_size).is_err());

        let no_oid = "version https://git-lfs.github.com/spec/v1\nsize 3\n";
        assert!(LargeObjectPointer::parse(no_oid).is_err());
    }

    #[test]
    fn rejects_bad_oid_and_size() {
        let short = "version https://git-lfs.github.com/spec/v1\noid sha256:abc\nsize 3\n";
        assert!(LargeObjectPointer::parse(short).is_err());

        let bad_size = format!("version https://git-lfs.github.com/spec/v1\noid sha256:{OID}\nsize -1\n");
        assert!(LargeObjectPointer::parse(&bad_size).is_err());
    }

    #[test]
    fn content_is_not_a_pointer() {
        assert!(!LargeObjectPointer::looks_like_pointer(b"\x00\x01binary"));
        assert!(LargeObjectPointer::parse_bytes(&vec![b'v'; 4096]).is_err());
    }
}
