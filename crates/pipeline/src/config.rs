use crate::coordinator::RunCoordinator;
use crate::error::PipelineError;
use crate::retry::{DEFAULT_BACKOFF_SECS, RetryPolicy};
use collect::{Collector, FileCollector, LlmCollector, ResultsDir, load_company_list};
use listings::{
    DEFAULT_WATCHLIST, KeywordTables, KnownCompanies, ListingNormalizer, MergeEngine, MergePolicy,
    RelevanceClassifier, SearchScope,
};
use registry::RegistryStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "ROLEWATCH_CONFIG";
pub const DATA_DIR_ENV: &str = "ROLEWATCH_DATA_DIR";
pub const DEFAULT_CONFIG_PATH: &str = "rolewatch.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/results`
    pub results_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/registry.log`
    pub registry_log: Option<PathBuf>,
    /// Defaults to `<data_dir>/seen_roles.json`
    pub registry_snapshot: Option<PathBuf>,
    pub export_snapshot: bool,
    pub persist_results: bool,
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
    pub relevance: RelevanceConfig,
    pub merge: MergePolicy,
    pub sentinels: Vec<String>,
    pub server: ServerConfig,
    pub collectors: Vec<CollectorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub backoff_secs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_concurrent_collectors: usize,
    pub collector_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    pub enabled: bool,
    /// JSON file with `seniority`/`function`/`exclude`/`domainAllow`/`domainDeny`
    /// lists; built-in tables when unset
    pub keyword_tables: Option<PathBuf>,
    pub known_companies: Vec<String>,
    /// Research output listing in-domain companies
    pub known_companies_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectorConfig {
    Llm {
        label: String,
        base_url: String,
        model: String,
        prompt: String,
        #[serde(default)]
        scope: SearchScope,
        #[serde(default)]
        request_timeout_secs: Option<u64>,
    },
    File {
        label: String,
        /// Artifact prefix in the results directory
        name: String,
        #[serde(default)]
        scope: SearchScope,
    },
}

impl CollectorConfig {
    pub fn label(&self) -> &str {
        match self {
            CollectorConfig::Llm { label, .. } | CollectorConfig::File { label, .. } => label,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            results_dir: None,
            registry_log: None,
            registry_snapshot: None,
            export_snapshot: true,
            persist_results: true,
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            relevance: RelevanceConfig::default(),
            merge: MergePolicy::default(),
            sentinels: listings::normalizer::DEFAULT_SENTINELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            server: ServerConfig::default(),
            // replay whatever the career-page and job-board searches saved
            collectors: vec![
                CollectorConfig::File {
                    label: "career-pages".to_string(),
                    name: "agent2".to_string(),
                    scope: SearchScope::CompanyTargeted,
                },
                CollectorConfig::File {
                    label: "job-boards".to_string(),
                    name: "agent3".to_string(),
                    scope: SearchScope::Broad,
                },
            ],
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_BACKOFF_SECS.len(),
            backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_collectors: 2,
            collector_timeout_secs: 600,
        }
    }
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keyword_tables: None,
            known_companies: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            known_companies_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// `$ROLEWATCH_CONFIG` (or `rolewatch.json`) if present, defaults otherwise.
    /// `$ROLEWATCH_DATA_DIR` overrides `data_dir`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let path = std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            info!(path = %path.display(), "Loading configuration");
            Self::load(&path)?
        } else {
            info!(path = %path.display(), "No configuration file, using defaults");
            Self::default()
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.concurrency.max_concurrent_collectors == 0 {
            return Err(PipelineError::Config(
                "concurrency.max_concurrent_collectors must be at least 1".into(),
            ));
        }
        let mut labels = HashSet::new();
        for collector in &self.collectors {
            let label = collector.label().trim();
            if label.is_empty() {
                return Err(PipelineError::Config("collector label is empty".into()));
            }
            if !labels.insert(label.to_lowercase()) {
                return Err(PipelineError::Config(format!(
                    "duplicate collector label '{}'",
                    label
                )));
            }
        }
        Ok(())
    }

    pub fn results_dir(&self) -> PathBuf {
        self.results_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("results"))
    }

    pub fn registry_log(&self) -> PathBuf {
        self.registry_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join("registry.log"))
    }

    pub fn registry_snapshot(&self) -> PathBuf {
        self.registry_snapshot
            .clone()
            .unwrap_or_else(|| self.data_dir.join("seen_roles.json"))
    }

    pub fn registry_store(&self) -> RegistryStore {
        RegistryStore::new(self.registry_log()).with_snapshot(self.registry_snapshot())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_secs(self.retry.max_retries, &self.retry.backoff_secs)
    }

    pub fn keyword_tables(&self) -> Result<KeywordTables, PipelineError> {
        let Some(path) = &self.relevance.keyword_tables else {
            return Ok(KeywordTables::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        KeywordTables::from_json(&text).map_err(|source| PipelineError::ConfigParse {
            path: path.clone(),
            source,
        })
    }

    /// Static watchlist plus the research file, if one is configured and
    /// readable.
    pub async fn known_companies(&self) -> KnownCompanies {
        let mut known = KnownCompanies::new(&self.relevance.known_companies);

        if let Some(path) = &self.relevance.known_companies_file {
            match load_company_list(path).await {
                Ok(names) => {
                    info!(path = %path.display(), companies = names.len(), "Loaded researched companies");
                    known.extend(names);
                }
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load researched companies, using watchlist only"
                ),
            }
        }

        known
    }

    /// Collectors in declared priority order.
    pub fn collectors(&self) -> Result<Vec<Arc<dyn Collector>>, PipelineError> {
        let results = ResultsDir::new(self.results_dir());

        self.collectors
            .iter()
            .map(|cfg| -> Result<Arc<dyn Collector>, PipelineError> {
                let collector: Arc<dyn Collector> = match cfg {
                    CollectorConfig::Llm {
                        label,
                        base_url,
                        model,
                        prompt,
                        scope,
                        request_timeout_secs,
                    } => {
                        let mut collector =
                            LlmCollector::new(label, base_url, model, prompt).with_scope(*scope);
                        if let Some(secs) = request_timeout_secs {
                            collector = collector
                                .with_request_timeout(Duration::from_secs(*secs))
                                .map_err(|e| PipelineError::Config(e.to_string()))?;
                        }
                        Arc::new(collector)
                    }
                    CollectorConfig::File { label, name, scope } => Arc::new(
                        FileCollector::new(label, name, results.clone()).with_scope(*scope),
                    ),
                };
                Ok(collector)
            })
            .collect()
    }

    pub async fn coordinator(&self) -> Result<RunCoordinator, PipelineError> {
        let classifier = RelevanceClassifier::new(self.keyword_tables()?);
        let known = self.known_companies().await;

        let mut coordinator = RunCoordinator::new(self.collectors()?)
            .with_retry(self.retry_policy())
            .with_concurrency(self.concurrency.max_concurrent_collectors)
            .with_collector_timeout(Duration::from_secs(self.concurrency.collector_timeout_secs))
            .with_relevance(self.relevance.enabled, classifier, known)
            .with_normalizer(ListingNormalizer::new(&self.sentinels))
            .with_merge(MergeEngine::new(self.merge.clone()))
            .with_snapshot_export(self.export_snapshot);

        if self.persist_results {
            coordinator = coordinator.with_results(ResultsDir::new(self.results_dir()));
        }

        Ok(coordinator)
    }
}
