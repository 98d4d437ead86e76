// 🍽️ Enrichment Run - select, diff, fetch, accumulate
// Single-threaded: one company at a time, one request at a time

use crate::batch::remaining_companies;
use crate::cache::{FetchedRow, FetchedTable, CNPJ_COLUMN, SCRAPED_AT_COLUMN};
use crate::config::RunConfig;
use crate::dataset::{load_companies, load_reimbursements, meal_cnpjs, select_companies, CompanyRecord};
use crate::search::{Business, BusinessSearch, SearchOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, warn};

/// Timestamp format written to `scraped_at` (ISO 8601, UTC, no offset suffix)
pub const SCRAPED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Companies with meal reimbursements and a trade name
    pub selected: usize,
    /// Rows in the cache before this run
    pub cached_before: usize,
    pub attempted: usize,
    pub matched: usize,
    pub not_found: usize,
    /// Requests that failed (network, non-200, rate limit, bad body)
    pub failed: usize,
    /// Rows in the cache after this run
    pub total_rows: usize,
}

/// Flatten a business into CSV cells and stamp it with `scraped_at` and `cnpj`.
///
/// Nested values are kept as compact JSON; `null` becomes an empty cell.
pub fn stamp(business: &Business, cnpj: &str, scraped_at: DateTime<Utc>) -> FetchedRow {
    let mut row: FetchedRow = business
        .iter()
        .filter_map(|(key, value)| cell(value).map(|text| (key.clone(), text)))
        .collect();

    row.insert(
        SCRAPED_AT_COLUMN.to_string(),
        scraped_at.format(SCRAPED_AT_FORMAT).to_string(),
    );
    row.insert(CNPJ_COLUMN.to_string(), cnpj.to_string());
    row
}

fn cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// RUN LOOP
// ============================================================================

pub struct Enricher<S: BusinessSearch> {
    config: RunConfig,
    search: S,
    clock: Box<dyn Fn() -> DateTime<Utc>>,
}

impl<S: BusinessSearch> Enricher<S> {
    pub fn new(config: RunConfig, search: S) -> Self {
        Enricher {
            config,
            search,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock used for `scraped_at`
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Companies with meal reimbursements, before the cache is consulted
    pub fn select(&self) -> Result<Vec<CompanyRecord>> {
        let reimbursements = load_reimbursements(&self.config.reimbursements_path)?;
        let cnpjs = meal_cnpjs(&reimbursements, &self.config.category);
        info!(reimbursements = reimbursements.len(), cnpjs = cnpjs.len(), "filtered reimbursements");

        let companies = load_companies(&self.config.companies_path)?;
        let total = companies.len();
        let selected = select_companies(companies, &cnpjs);
        info!(companies = total, selected = selected.len(), "selected companies");

        Ok(selected)
    }

    /// Companies this run would fetch, without touching the network
    pub fn plan(&self) -> Result<Vec<CompanyRecord>> {
        let selected = self.select()?;
        let cache = FetchedTable::load(&self.config.output_path)?;
        Ok(remaining_companies(&cache, &selected, self.config.batch_size)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Fetch one batch and persist the cache.
    ///
    /// The table is checkpointed after every match and written once more at
    /// the end, even when nothing new was found.
    pub fn run(&self) -> Result<RunSummary> {
        let output = &self.config.output_path;

        let selected = self.select()?;
        let mut fetched = FetchedTable::load(output)
            .with_context(|| format!("Failed to load cached results from {}", output.display()))?;

        let mut summary = RunSummary {
            selected: selected.len(),
            cached_before: fetched.len(),
            ..RunSummary::default()
        };

        let batch = remaining_companies(&fetched, &selected, self.config.batch_size);
        info!(cached = fetched.len(), batch = batch.len(), "computed batch");

        for company in batch {
            // Blank names never reach the batch; the API gets the name as stored
            let trade_name = company.trade_name.as_deref().unwrap_or_default();
            let zip_code = company.zip_code.as_deref().unwrap_or_default();

            println!("🔎 Fetching {} - CNPJ: {} (zip {})", trade_name, company.cnpj, zip_code);
            summary.attempted += 1;

            match self.search.search(trade_name, zip_code) {
                Ok(SearchOutcome::Match(business)) => {
                    let name = business
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or("<unnamed>");
                    println!("   ✓ Successfully matched {}", name);

                    let row = stamp(&business, &company.cnpj, (self.clock)());
                    fetched.append(row);
                    summary.matched += 1;

                    fetched.persist(output)?;
                }
                Ok(SearchOutcome::NoMatch) => {
                    println!("   ✗ Not found");
                    summary.not_found += 1;
                }
                Err(e) => {
                    println!("   ⚠️  Lookup failed, will retry on a later run");
                    warn!(cnpj = %company.cnpj, error = %e, "search failed");
                    summary.failed += 1;
                }
            }
        }

        fetched.persist(output)?;
        summary.total_rows = fetched.len();

        info!(
            matched = summary.matched,
            not_found = summary.not_found,
            failed = summary.failed,
            total = summary.total_rows,
            "run finished"
        );
        Ok(summary)
    }
}
