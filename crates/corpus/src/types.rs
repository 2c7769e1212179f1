use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Origin category of a record, assigned at ingestion time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceType {
    SupportDoc,
    CuratedDoc,
    SkillDoc,
    SourceManifest,
    RepoFile,
    ProjectDoc,
    ProjectScript,
    BenchmarkSpec,
    SiteDoc,
    SiteData,
    #[default]
    Unknown,
}

impl SourceType {
    pub const ALL: [Self; 11] = [
        Self::SupportDoc,
        Self::CuratedDoc,
        Self::SkillDoc,
        Self::SourceManifest,
        Self::RepoFile,
        Self::ProjectDoc,
        Self::ProjectScript,
        Self::BenchmarkSpec,
        Self::SiteDoc,
        Self::SiteData,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SupportDoc => "support_doc",
            Self::CuratedDoc => "curated_doc",
            Self::SkillDoc => "skill_doc",
            Self::SourceManifest => "source_manifest",
            Self::RepoFile => "repo_file",
            Self::ProjectDoc => "project_doc",
            Self::ProjectScript => "project_script",
            Self::BenchmarkSpec => "benchmark_spec",
            Self::SiteDoc => "site_doc",
            Self::SiteData => "site_data",
            Self::Unknown => "unknown",
        }
    }

    /// Lenient parse: anything outside the closed set is `Unknown`
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == label)
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl Serialize for SourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SourceType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(label) => Self::from_label(&label),
            _ => Self::Unknown,
        })
    }
}

/// One retrievable text unit produced by ingestion.
///
/// Records are read-only once loaded. Every field tolerates being absent or
/// `null`, and scalar values where a string is expected are stringified, so a
/// partially filled record degrades to empty fields instead of failing the load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    #[serde(default)]
    pub source_type: SourceType,

    /// Corpus-relative location, also used as a scoring signal
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub path: Option<String>,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub content: String,
}

impl Record {
    #[must_use]
    pub fn new(id: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            id: id.into(),
            source_type,
            ..Default::default()
        }
    }

    /// Builder: set title
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Builder: set path
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Builder: set url
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Builder: add tag
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builder: set content
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn url_str(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    /// Key that identifies the underlying source: path, else url, else id.
    /// Chunks of the same file share it.
    #[must_use]
    pub fn identity_key(&self) -> &str {
        let path = self.path_str();
        if !path.is_empty() {
            return path;
        }
        let url = self.url_str();
        if !url.is_empty() {
            return url;
        }
        &self.id
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.trim().eq_ignore_ascii_case(tag))
    }
}

fn stringify(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(stringify(value).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(stringify(value).filter(|s| !s.is_empty()))
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.into_iter().filter_map(stringify).collect(),
        Value::Null => Vec::new(),
        scalar => stringify(scalar).into_iter().collect(),
    })
}
