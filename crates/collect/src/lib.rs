pub mod error;
pub mod file;
pub mod json;
pub mod llm;
pub mod reader;

pub use error::CollectError;
pub use file::FileCollector;
pub use json::{CandidateBatch, extract_json, parse_candidates};
pub use llm::LlmCollector;
pub use reader::{ResultsDir, load_company_list};

use async_trait::async_trait;
use listings::{RawCandidate, SearchScope};

/// One upstream source of raw listings.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Tag used for logging, saved batches and as the fallback source tag
    fn label(&self) -> &str;

    fn scope(&self) -> SearchScope {
        SearchScope::Broad
    }

    /// True when the output is an earlier run's saved batch, which must not
    /// be saved again.
    fn is_replay(&self) -> bool {
        false
    }

    async fn collect(&self) -> Result<Vec<RawCandidate>, CollectError>;
}
