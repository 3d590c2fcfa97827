use std::fmt;

use serde::{Deserialize, Serialize};

/// Default ModelScope domain when none is configured.
pub const DEFAULT_MS_DOMAIN: &str = "modelscope.cn";

/// A storage platform hosting repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "hf")]
    HuggingFace,
    #[serde(rename = "ms")]
    ModelScope,
}

impl Platform {
    /// Short identifier used in repo prefixes (`hf`, `ms`).
    pub fn short_name(self) -> &'static str {
        match self {
            Self::HuggingFace => "hf",
            Self::ModelScope => "ms",
        }
    }

    /// The other platform of the pair.
    pub fn opposite(self) -> Self {
        match self {
            Self::HuggingFace => Self::ModelScope,
            Self::ModelScope => Self::HuggingFace,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HuggingFace => write!(f, "HuggingFace"),
            Self::ModelScope => write!(f, "ModelScope"),
        }
    }
}

/// Kind of repository on a platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    #[default]
    Model,
    Dataset,
    Space,
}

impl RepoKind {
    /// Probe order used when the kind is not known up front.
    pub const DETECTION_ORDER: [RepoKind; 3] = [RepoKind::Model, RepoKind::Dataset, RepoKind::Space];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Dataset => "dataset",
            Self::Space => "space",
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repository visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// Identifies one logical repository on one platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub platform: Platform,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub kind: RepoKind,
    #[serde(default)]
    pub visibility: Visibility,
}

impl RepoRef {
    pub fn new(platform: Platform, namespace: &str, name: &str, kind: RepoKind) -> Self {
        Self {
            platform,
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            visibility: Visibility::Public,
        }
    }

    /// Returns a copy with the given visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Returns the same repository identity on another platform.
    pub fn on_platform(&self, platform: Platform) -> Self {
        Self {
            platform,
            ..self.clone()
        }
    }

    /// `namespace/name`.
    pub fn repo_id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Browser URL of the repository.
    ///
    /// `ms_domain` is only consulted for ModelScope and is normalized first.
    pub fn web_url(&self, ms_domain: &str) -> String {
        match self.platform {
            Platform::HuggingFace => {
                let prefix = match self.kind {
                    RepoKind::Model => "",
                    RepoKind::Dataset => "datasets/",
                    RepoKind::Space => "spaces/",
                };
                format!("https://huggingface.co/{prefix}{}", self.repo_id())
            }
            Platform::ModelScope => {
                // ModelScope has no spaces; they are published as models.
                let prefix = match self.kind {
                    RepoKind::Dataset => "datasets/",
                    RepoKind::Model | RepoKind::Space => "models/",
                };
                let domain = crate::repo_id::normalize_ms_domain(ms_domain);
                format!("https://{domain}/{prefix}{}", self.repo_id())
            }
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{} ({})",
            self.platform.short_name(),
            self.namespace,
            self.name,
            self.kind
        )
    }
}
