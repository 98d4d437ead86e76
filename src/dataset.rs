// 📂 Dataset Loader - reimbursements + companies
// Reads the two input tables (xz-compressed or plain CSV) and joins them by CNPJ

use crate::cnpj;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;
use xz2::read::XzDecoder;

/// Expense category the enrichment is restricted to
pub const MEAL_SUBQUOTA: &str = "Congressperson meal";

// ============================================================================
// RECORDS
// ============================================================================

/// One reimbursement row. Only the columns the join needs are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReimbursementRecord {
    /// Raw identifier of the supplier (CNPJ for companies, CPF for people)
    #[serde(default)]
    pub cnpj_cpf: Option<String>,

    /// Expense category label, e.g. "Congressperson meal"
    #[serde(default)]
    pub subquota_description: Option<String>,
}

/// One company row from the companies dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Raw identifier as published ("13.347.016/0001-17")
    pub cnpj: String,

    #[serde(default)]
    pub trade_name: Option<String>,

    #[serde(default)]
    pub zip_code: Option<String>,

    /// Digits-only identifier, derived after loading
    #[serde(skip)]
    pub clean_cnpj: String,
}

impl CompanyRecord {
    pub fn new(cnpj: &str, trade_name: Option<&str>, zip_code: Option<&str>) -> Self {
        CompanyRecord {
            cnpj: cnpj.to_string(),
            trade_name: trade_name.map(|s| s.to_string()),
            zip_code: zip_code.map(|s| s.to_string()),
            clean_cnpj: cnpj::normalize(cnpj),
        }
    }

    /// Trade name when present and not blank
    pub fn usable_trade_name(&self) -> Option<&str> {
        self.trade_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Open a table for reading. Files ending in `.xz` are decompressed on the fly.
pub fn open_table(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    if is_xz(path) {
        Ok(Box::new(XzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub(crate) fn is_xz(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("xz"))
        .unwrap_or(false)
}

/// Deserialize every row of a table, dropping rows that don't fit `T`.
///
/// I/O failures (including corrupt compression) are fatal; bad rows are not.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = open_table(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    let mut dropped = 0usize;

    for (line_num, result) in rdr.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
            Err(e) => {
                dropped += 1;
                debug!(line = line_num + 2, error = %e, "dropping malformed row");
            }
        }
    }

    debug!(path = %path.display(), rows = rows.len(), dropped, "loaded table");
    Ok(rows)
}

pub fn load_reimbursements(path: &Path) -> Result<Vec<ReimbursementRecord>> {
    read_rows(path).context("Failed to load reimbursements dataset")
}

/// Load companies and derive `clean_cnpj` for each row
pub fn load_companies(path: &Path) -> Result<Vec<CompanyRecord>> {
    let mut companies: Vec<CompanyRecord> =
        read_rows(path).context("Failed to load companies dataset")?;

    for company in &mut companies {
        company.clean_cnpj = cnpj::normalize(&company.cnpj);
    }

    Ok(companies)
}

// ============================================================================
// SELECTION
// ============================================================================

/// Unique identifiers of reimbursements whose category is exactly `category`.
///
/// Identifiers are normalized so they compare against `clean_cnpj`.
pub fn meal_cnpjs(reimbursements: &[ReimbursementRecord], category: &str) -> HashSet<String> {
    reimbursements
        .iter()
        .filter(|r| r.subquota_description.as_deref() == Some(category))
        .filter_map(|r| r.cnpj_cpf.as_deref())
        .map(cnpj::normalize)
        .filter(|id| cnpj::is_normalized(id))
        .collect()
}

/// Companies with a trade name whose normalized CNPJ appears in `cnpjs`
pub fn select_companies(companies: Vec<CompanyRecord>, cnpjs: &HashSet<String>) -> Vec<CompanyRecord> {
    companies
        .into_iter()
        .filter(|c| c.usable_trade_name().is_some())
        .filter(|c| cnpjs.contains(&c.clean_cnpj))
        .collect()
}
