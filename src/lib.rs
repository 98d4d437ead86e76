// Yelp Enrichment - Core Library
// Exposes all modules for use in the CLI and tests

pub mod cnpj;
pub mod dataset;
pub mod cache;
pub mod batch;
pub mod search;
pub mod config;
pub mod enrich;

// Re-export commonly used types
pub use dataset::{
    CompanyRecord, ReimbursementRecord, MEAL_SUBQUOTA,
    load_companies, load_reimbursements, meal_cnpjs, select_companies,
};
pub use cache::{FetchedRow, FetchedTable, CNPJ_COLUMN, SCRAPED_AT_COLUMN};
pub use batch::{remaining_companies, DEFAULT_BATCH_SIZE};
pub use search::{
    Business, BusinessSearch, SearchError, SearchOutcome, YelpClient,
    parse_search_response, DEFAULT_API_URL,
};
pub use config::{ConfigError, Credentials, RunConfig};
pub use enrich::{stamp, Enricher, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
