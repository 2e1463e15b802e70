use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Unvalidated listing as reported by a collector. Every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(default, alias = "date_posted", deserialize_with = "lenient_string")]
    pub date_posted: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub compensation: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub segment: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub stage: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
}

impl RawCandidate {
    pub fn new(company: &str, title: &str) -> Self {
        Self {
            company: Some(company.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }
}

// LLM output is loose: numbers and booleans show up where strings belong.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Dedup key: `lowercase(trim(company)) | lowercase(trim(title))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn of(company: &str, title: &str) -> Self {
        Self(format!(
            "{}|{}",
            company.trim().to_lowercase(),
            title.trim().to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical listing. Company and title are fixed at construction so the
/// identity can never drift from them.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    identity: Identity,
    company: String,
    title: String,
    pub location: Option<String>,
    pub compensation: Option<String>,
    pub date_posted: Option<String>,
    pub url: Option<String>,
    pub segment: Option<String>,
    pub stage: Option<String>,
    pub sources: Vec<String>,
    pub is_new: bool,
}

impl Listing {
    /// Callers are expected to pass already trimmed, non-empty values;
    /// the normalizer is the usual way in.
    pub fn new(company: impl Into<String>, title: impl Into<String>) -> Self {
        let company = company.into();
        let title = title.into();
        Self {
            identity: Identity::of(&company, &title),
            company,
            title,
            location: None,
            compensation: None,
            date_posted: None,
            url: None,
            segment: None,
            stage: None,
            sources: Vec::new(),
            is_new: false,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Add a source tag unless one with the same case-folded text is present.
    pub fn add_source(&mut self, tag: &str) {
        let tag = tag.trim();
        if tag.is_empty() {
            return;
        }
        let folded = tag.to_lowercase();
        if !self.sources.iter().any(|s| s.to_lowercase() == folded) {
            self.sources.push(tag.to_string());
        }
    }

    pub fn source_label(&self) -> String {
        self.sources.join(", ")
    }
}
