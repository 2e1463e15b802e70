use crate::error::CollectError;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Dated JSON artifacts named `{name}_{YYYY-MM-DD}.json`.
#[derive(Debug, Clone)]
pub struct ResultsDir {
    root: PathBuf,
}

impl ResultsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{}_{}.json", name, date.format("%Y-%m-%d")))
    }

    /// Load the artifact for an exact date. A missing file is `Ok(None)`.
    pub async fn load(&self, name: &str, date: NaiveDate) -> Result<Option<Value>, CollectError> {
        let path = self.path_for(name, date);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_json(&path).await.map(Some)
    }

    /// Newest artifact for `name`, with the date it was written for.
    pub async fn latest(&self, name: &str) -> Result<Option<(Value, NaiveDate)>, CollectError> {
        let prefix = format!("{}_", name);
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CollectError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut newest: Option<(NaiveDate, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await.map_err(|source| CollectError::Io {
            path: self.root.clone(),
            source,
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(date) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| stem.strip_prefix(&prefix))
                .and_then(|rest| NaiveDate::parse_from_str(rest, "%Y-%m-%d").ok())
            else {
                continue;
            };
            if newest.as_ref().is_none_or(|(d, _)| date > *d) {
                newest = Some((date, path));
            }
        }

        match newest {
            Some((date, path)) => Ok(Some((read_json(&path).await?, date))),
            None => Ok(None),
        }
    }

    pub async fn save<T: Serialize>(
        &self,
        name: &str,
        date: NaiveDate,
        data: &T,
    ) -> Result<PathBuf, CollectError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| CollectError::Io {
                path: self.root.clone(),
                source,
            })?;

        let path = self.path_for(name, date);
        let json = serde_json::to_string_pretty(data).map_err(|source| CollectError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json)
            .await
            .map_err(|source| CollectError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }
}

async fn read_json(path: &Path) -> Result<Value, CollectError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| CollectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|source| CollectError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Company names from a research output file: either an array of strings
/// or an array of objects with a `company` field.
pub async fn load_company_list(path: &Path) -> Result<Vec<String>, CollectError> {
    let value = read_json(path).await?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name),
            Value::Object(mut obj) => match obj.remove("company") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            },
            _ => None,
        })
        .filter(|name| !name.trim().is_empty())
        .collect())
}
