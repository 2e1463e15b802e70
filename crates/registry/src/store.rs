use crate::{CommitEvent, Registry, RegistryEntry, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{info, warn};

/// One line of the commit log.
#[derive(Serialize, Deserialize)]
struct LogRecord {
    identity: String,
    entry: RegistryEntry,
    checksum: String,
}

/// Durable registry: a flat snapshot checkpoint plus an append-only JSONL
/// commit log replayed on top of it.
///
/// Loading never fails. Missing or unreadable files are a cold start, and
/// log lines that don't parse or fail their checksum (a torn write from an
/// interrupted run) are skipped. Writing is the only fallible path.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    log_path: PathBuf,
    snapshot_path: Option<PathBuf>,
}

impl RegistryStore {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            snapshot_path: None,
        }
    }

    /// Also read (and allow exporting to) a flat `identity -> entry` snapshot.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub async fn load(&self) -> Registry {
        let mut registry = Registry::new();

        if let Some(snapshot) = &self.snapshot_path {
            let imported = load_snapshot(snapshot, &mut registry).await;
            if imported > 0 {
                info!(path = %snapshot.display(), entries = imported, "Loaded registry snapshot");
            }
        }

        match fs::read(&self.log_path).await {
            Ok(bytes) => {
                let (applied, skipped) = replay(&bytes, &mut registry);
                if skipped > 0 {
                    warn!(
                        path = %self.log_path.display(),
                        skipped,
                        "Skipped unreadable commit log lines"
                    );
                }
                info!(
                    path = %self.log_path.display(),
                    applied,
                    total = registry.len(),
                    "Replayed registry commit log"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.log_path.display(), "No commit log yet, starting cold");
            }
            Err(e) => {
                warn!(
                    path = %self.log_path.display(),
                    error = %e,
                    "Commit log unreadable, starting cold"
                );
            }
        }

        registry
    }

    /// Append committed events and fsync before returning.
    pub async fn append(&self, events: &[CommitEvent]) -> Result<(), RegistryError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for event in events {
            let record = LogRecord {
                identity: event.identity.clone(),
                checksum: checksum(&event.identity, &event.entry)?,
                entry: event.entry.clone(),
            };
            buf.push_str(&serde_json::to_string(&record)?);
            buf.push('\n');
        }

        let unwritable = |source: std::io::Error| RegistryError::Unwritable {
            path: self.log_path.clone(),
            source,
        };

        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(unwritable)?;
            }
        }

        // an interrupted write leaves a partial last line; start on a fresh one
        if ends_mid_line(&self.log_path).await.map_err(unwritable)? {
            buf.insert(0, '\n');
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .map_err(unwritable)?;
        file.write_all(buf.as_bytes()).await.map_err(unwritable)?;
        file.flush().await.map_err(unwritable)?;
        file.sync_all().await.map_err(unwritable)?;

        info!(path = %self.log_path.display(), appended = events.len(), "Registry committed");
        Ok(())
    }

    /// Rewrite the snapshot checkpoint from `registry` (temp file + rename).
    /// No-op when the store has no snapshot path.
    pub async fn export_snapshot(&self, registry: &Registry) -> Result<(), RegistryError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let unwritable = |source: std::io::Error| RegistryError::Unwritable {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(registry.entries())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(unwritable)?;
            }
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(unwritable)?;
        fs::rename(&tmp, path).await.map_err(unwritable)?;

        info!(path = %path.display(), entries = registry.len(), "Registry snapshot written");
        Ok(())
    }
}

fn checksum(identity: &str, entry: &RegistryEntry) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(b"\n");
    hasher.update(serde_json::to_string(entry)?.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

async fn ends_mid_line(path: &Path) -> std::io::Result<bool> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

/// Apply log lines in order. Lines are decoded one at a time so a torn
/// multibyte character only costs its own line. Returns (applied, skipped).
fn replay(bytes: &[u8], registry: &mut Registry) -> (usize, usize) {
    let mut applied = 0;
    let mut skipped = 0;

    for line in bytes
        .split(|b| *b == b'\n')
        .filter(|l| !l.iter().all(u8::is_ascii_whitespace))
    {
        let record: LogRecord = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        match checksum(&record.identity, &record.entry) {
            Ok(sum) if sum == record.checksum => {}
            _ => {
                skipped += 1;
                continue;
            }
        }
        if registry.apply(CommitEvent {
            identity: record.identity,
            entry: record.entry,
        }) {
            applied += 1;
        }
    }

    (applied, skipped)
}

/// Entries that fail to parse are skipped individually so one bad record
/// doesn't discard the whole checkpoint.
async fn load_snapshot(path: &Path, registry: &mut Registry) -> usize {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Registry snapshot unreadable, ignoring");
            return 0;
        }
    };

    let map: BTreeMap<String, Value> = match serde_json::from_str(&text) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Registry snapshot is not a JSON object, ignoring");
            return 0;
        }
    };

    let mut imported = 0;
    for (identity, value) in map {
        match serde_json::from_value::<RegistryEntry>(value) {
            Ok(entry) => {
                if registry.apply(CommitEvent { identity, entry }) {
                    imported += 1;
                }
            }
            Err(e) => warn!(identity = %identity, error = %e, "Skipping snapshot entry"),
        }
    }
    imported
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use listings::Listing;
    use tempfile::tempdir;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[tokio::test]
    async fn test_missing_files_are_a_cold_start() {
        let temp = tempdir().unwrap();
        let store = RegistryStore::new(temp.path().join("registry.log"))
            .with_snapshot(temp.path().join("seen_roles.json"));

        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_then_replay() {
        let temp = tempdir().unwrap();
        let store = RegistryStore::new(temp.path().join("data/registry.log"));

        let mut registry = store.load().await;
        let events = registry.commit(
            &[Listing::new("Addepar", "VP Sales"), Listing::new("Orion", "Head of Growth")],
            day(19),
        );
        store.append(&events).await.unwrap();

        let reloaded = store.load().await;

        assert_eq!(reloaded, registry);
        assert_eq!(reloaded.get("addepar|vp sales").unwrap().first_seen, day(19));
    }

    #[tokio::test]
    async fn test_torn_and_tampered_lines_are_skipped() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("registry.log");
        let store = RegistryStore::new(&log);

        let mut registry = Registry::new();
        let events = registry.commit(&[Listing::new("Addepar", "VP Sales")], day(1));
        store.append(&events).await.unwrap();

        let tampered = std::fs::read_to_string(&log)
            .unwrap()
            .replace("addepar|vp sales", "addepar|vp marketing");
        let mut text = std::fs::read_to_string(&log).unwrap();
        text.push_str(&tampered);
        text.push_str(r#"{"identity": "orion|head of growth", "entry": {"comp"#);
        std::fs::write(&log, text).unwrap();

        let reloaded = store.load().await;

        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("addepar|vp sales"));
    }

    #[tokio::test]
    async fn test_flat_snapshot_is_imported_and_exported() {
        let temp = tempdir().unwrap();
        let snapshot = temp.path().join("seen_roles.json");
        std::fs::write(
            &snapshot,
            r#"{
                "orion|head of growth": {"company": "Orion", "title": "Head of Growth",
                    "first_seen": "2026-02-10", "url": null, "segment": "Advisor Tech"},
                "broken|entry": {"company": null}
            }"#,
        )
        .unwrap();
        let store =
            RegistryStore::new(temp.path().join("registry.log")).with_snapshot(&snapshot);

        let mut registry = store.load().await;
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("orion|head of growth").unwrap().first_seen,
            day(10)
        );

        let events = registry.commit(&[Listing::new("Addepar", "VP Sales")], day(19));
        store.append(&events).await.unwrap();
        store.export_snapshot(&registry).await.unwrap();

        let written: BTreeMap<String, RegistryEntry> =
            serde_json::from_str(&std::fs::read_to_string(&snapshot).unwrap()).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(store.load().await.len(), 2);
    }

    #[tokio::test]
    async fn test_append_after_torn_tail_starts_a_new_line() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("registry.log");
        let store = RegistryStore::new(&log);

        let mut registry = store.load().await;
        let events = registry.commit(&[Listing::new("Addepar", "VP Sales")], day(1));
        store.append(&events).await.unwrap();

        let mut text = std::fs::read_to_string(&log).unwrap();
        text.push_str(r#"{"identity": "orion|head of gro"#);
        std::fs::write(&log, text).unwrap();

        let mut registry = store.load().await;
        assert_eq!(registry.len(), 1);
        let events = registry.commit(&[Listing::new("Pontera", "VP Partnerships")], day(2));
        store.append(&events).await.unwrap();

        let reloaded = store.load().await;

        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("pontera|vp partnerships").unwrap().first_seen,
            day(2)
        );
    }

    #[tokio::test]
    async fn test_write_torn_mid_character_keeps_earlier_lines() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("registry.log");
        let store = RegistryStore::new(&log);

        let mut registry = Registry::new();
        let events = registry.commit(
            &[
                Listing::new("Addepar", "VP Sales"),
                Listing::new("Société Générale", "Head of Sales"),
            ],
            day(1),
        );
        store.append(&events).await.unwrap();

        let bytes = std::fs::read(&log).unwrap();
        let cut = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        std::fs::write(&log, &bytes[..cut]).unwrap();

        let reloaded = store.load().await;

        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("addepar|vp sales"));
    }

    #[tokio::test]
    async fn test_invalid_bytes_skip_only_their_line() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("registry.log");
        let store = RegistryStore::new(&log);

        let mut registry = Registry::new();
        let first = registry.commit(&[Listing::new("Addepar", "VP Sales")], day(1));
        store.append(&first).await.unwrap();
        let mut bytes = std::fs::read(&log).unwrap();
        bytes.extend_from_slice(&[0xFF, 0xFE, 0x00, b'\n']);
        std::fs::write(&log, bytes).unwrap();
        let second = registry.commit(&[Listing::new("Orion", "Head of Growth")], day(2));
        store.append(&second).await.unwrap();

        let reloaded = store.load().await;

        assert_eq!(reloaded, registry);
    }

    #[tokio::test]
    async fn test_unreadable_log_is_a_cold_start() {
        let temp = tempdir().unwrap();
        let log = temp.path().join("registry.log");
        std::fs::create_dir_all(&log).unwrap();

        assert!(RegistryStore::new(&log).load().await.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_log_is_an_error() {
        let temp = tempdir().unwrap();
        // a directory where the log file should be
        let log = temp.path().join("registry.log");
        std::fs::create_dir_all(&log).unwrap();
        let store = RegistryStore::new(&log);

        let mut registry = Registry::new();
        let events = registry.commit(&[Listing::new("Addepar", "VP Sales")], day(1));
        let err = store.append(&events).await.unwrap_err();

        assert!(matches!(err, RegistryError::Unwritable { .. }));
    }
}
