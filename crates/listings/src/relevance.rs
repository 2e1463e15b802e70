use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Keyword table categories. Title checks use the first three, the company
/// domain check uses the last two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeywordCategory {
    Seniority,
    Function,
    Exclude,
    DomainAllow,
    DomainDeny,
}

/// Whether a batch came from a broad search or one aimed at known companies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Broad,
    CompanyTargeted,
}

/// Category -> set of lowercase substrings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<KeywordCategory, BTreeSet<String>>")]
#[serde(into = "BTreeMap<KeywordCategory, BTreeSet<String>>")]
pub struct KeywordTables {
    tables: BTreeMap<KeywordCategory, BTreeSet<String>>,
}

impl From<BTreeMap<KeywordCategory, BTreeSet<String>>> for KeywordTables {
    fn from(raw: BTreeMap<KeywordCategory, BTreeSet<String>>) -> Self {
        let tables = raw
            .into_iter()
            .map(|(category, terms)| {
                let terms = terms
                    .iter()
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect();
                (category, terms)
            })
            .collect();
        Self { tables }
    }
}

impl From<KeywordTables> for BTreeMap<KeywordCategory, BTreeSet<String>> {
    fn from(tables: KeywordTables) -> Self {
        tables.tables
    }
}

impl Default for KeywordTables {
    fn default() -> Self {
        let mut raw: BTreeMap<KeywordCategory, BTreeSet<String>> = BTreeMap::new();
        let mut put = |category: KeywordCategory, terms: &[&str]| {
            raw.insert(category, terms.iter().map(|t| t.to_string()).collect());
        };

        put(
            KeywordCategory::Seniority,
            &[
                "director", "vp", "vice president", "svp", "evp", "head of", "chief",
                "managing director", "general manager",
            ],
        );
        put(
            KeywordCategory::Function,
            &[
                "sales", "revenue", "partnership", "business development", "gtm",
                "go-to-market", "client", "growth", "commercial", "distribution",
                "account management", "strategic accounts", "general manager",
            ],
        );
        put(
            KeywordCategory::Exclude,
            &[
                "engineer", "developer", "designer", "design", "compliance", "legal",
                "counsel", "human resources", "people operations", "recruit",
                "talent acquisition", "product manager", "product management",
                "accounting", "controller", "data scientist", "operations",
            ],
        );
        put(
            KeywordCategory::DomainAllow,
            &[
                "wealth", "invest", "asset", "advisor", "adviser", "capital", "fintech",
                "financial", "retirement", "portfolio", "robo", "securities", "fund",
                "brokerage", "trust",
            ],
        );
        put(
            KeywordCategory::DomainDeny,
            &[
                "staffing", "recruiting", "recruitment", "consulting", "insurance",
                "healthcare", "hospital", "real estate", "realty", "university",
            ],
        );

        Self::from(raw)
    }
}

impl KeywordTables {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn terms(&self, category: KeywordCategory) -> impl Iterator<Item = &str> {
        self.tables
            .get(&category)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Case-insensitive substring match of any term in the category.
    pub fn matches(&self, category: KeywordCategory, text: &str) -> bool {
        let text = text.to_lowercase();
        self.terms(category).any(|term| text.contains(term))
    }
}

/// Normalized set of company names that are always in-domain.
#[derive(Debug, Clone, Default)]
pub struct KnownCompanies(HashSet<String>);

impl KnownCompanies {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            names
                .into_iter()
                .map(|n| Self::normalize(n.as_ref()))
                .filter(|n| !n.is_empty())
                .collect(),
        )
    }

    fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn contains(&self, company: &str) -> bool {
        self.0.contains(&Self::normalize(company))
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.0.extend(
            names
                .into_iter()
                .map(|n| Self::normalize(n.as_ref()))
                .filter(|n| !n.is_empty()),
        );
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyVerdict {
    Known,
    Denied,
    DomainMatch,
    Unrecognized,
}

impl CompanyVerdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, CompanyVerdict::Known | CompanyVerdict::DomainMatch)
    }
}

pub struct RelevanceClassifier {
    tables: KeywordTables,
}

impl Default for RelevanceClassifier {
    fn default() -> Self {
        Self::new(KeywordTables::default())
    }
}

impl RelevanceClassifier {
    pub fn new(tables: KeywordTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &KeywordTables {
        &self.tables
    }

    /// Seniority and function markers present, no exclusion marker.
    pub fn classify_title(&self, title: &str) -> bool {
        if self.tables.matches(KeywordCategory::Exclude, title) {
            return false;
        }
        self.tables.matches(KeywordCategory::Seniority, title)
            && self.tables.matches(KeywordCategory::Function, title)
    }

    /// Closed-world company check: unknown names without a domain keyword
    /// are rejected.
    pub fn classify_company(&self, company: &str, known: &KnownCompanies) -> CompanyVerdict {
        if known.contains(company) {
            CompanyVerdict::Known
        } else if self.tables.matches(KeywordCategory::DomainDeny, company) {
            CompanyVerdict::Denied
        } else if self.tables.matches(KeywordCategory::DomainAllow, company) {
            CompanyVerdict::DomainMatch
        } else {
            CompanyVerdict::Unrecognized
        }
    }

    pub fn classify(&self, title: &str, company: &str, known: &KnownCompanies) -> bool {
        self.classify_title(title) && self.classify_company(company, known).is_accepted()
    }

    /// Company-targeted searches already vetted the company, so only the
    /// title is checked.
    pub fn classify_scoped(
        &self,
        title: &str,
        company: &str,
        known: &KnownCompanies,
        scope: SearchScope,
    ) -> bool {
        match scope {
            SearchScope::Broad => self.classify(title, company, known),
            SearchScope::CompanyTargeted => self.classify_title(title),
        }
    }
}
