use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Tag reported for artifacts and rows that carry no usable tag.
pub const UNTAGGED: &str = "<none>";

/// Basic credentials passed through to every registry call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One image/tag pair, from either the registry or the local runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub repository: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// Registry project as returned by the project listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "project_id")]
    pub id: Option<serde_json::Value>,
}

/// Registry repository. `name` is the full name, `"{project}/{path}"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    #[serde(default, rename = "name")]
    pub full_name: Option<String>,
}

/// Registry artifact. Tag entries stay raw so a malformed one only costs
/// that entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub digest: Option<serde_json::Value>,
    #[serde(default)]
    pub size: Option<serde_json::Value>,
    #[serde(default)]
    pub tags: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

impl Artifact {
    pub fn digest(&self) -> Option<String> {
        self.digest.as_ref().and_then(scalar_to_string)
    }

    pub fn size(&self) -> Option<String> {
        self.size.as_ref().and_then(scalar_to_string)
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identifiers excluded from the local inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    ids: HashSet<String>,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an identifier. Blank identifiers are not stored.
    pub fn insert(&mut self, id: &str) -> bool {
        let id = id.trim();
        if id.is_empty() {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    /// Exact match after trimming whitespace.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id.as_ref());
        }
        set
    }
}

/// One data row of the runtime's image table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTableRow {
    pub repository: String,
    pub tag: String,
    pub image_id: String,
    pub size: String,
}

impl From<ParsedTableRow> for ImageRecord {
    fn from(row: ParsedTableRow) -> Self {
        Self {
            repository: row.repository,
            tag: row.tag,
            image_id: Some(row.image_id).filter(|id| !id.is_empty()),
            digest: None,
            size: Some(row.size).filter(|size| !size.is_empty()),
            project: None,
        }
    }
}

/// Which traversal level a contained failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureScope {
    Project,
    Repository,
}

/// A failure confined to one project or repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub scope: FailureScope,
    pub unit: String,
    pub url: String,
    pub error: String,
}

/// Everything one source produced, including contained failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInventory {
    pub images: Vec<ImageRecord>,
    pub failures: Vec<UnitFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceErrorEntry {
    pub source: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Combined inventory of the local runtime and the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedInventory {
    pub containerd_images: Vec<ImageRecord>,
    pub harbor_images: Vec<ImageRecord>,
    pub errors: Vec<SourceErrorEntry>,
}
