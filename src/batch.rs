// 📦 Batch Selection - companies still missing from the cache
// Each run drains the backlog a fixed number of companies at a time

use crate::cache::FetchedTable;
use crate::dataset::CompanyRecord;
use std::collections::HashSet;

/// Companies fetched per run unless the caller asks otherwise
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Companies not yet in `cache`, in selection order, capped at `batch_size`.
///
/// Identifiers compare as stored (raw CNPJ), and a CNPJ listed twice in
/// `companies` is only queued once.
pub fn remaining_companies<'a>(
    cache: &FetchedTable,
    companies: &'a [CompanyRecord],
    batch_size: usize,
) -> Vec<&'a CompanyRecord> {
    let fetched = cache.cnpjs();
    let mut queued: HashSet<&str> = HashSet::new();

    companies
        .iter()
        .filter(|c| !fetched.contains(c.cnpj.as_str()))
        .filter(|c| queued.insert(c.cnpj.as_str()))
        .take(batch_size)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FetchedRow;

    fn company(cnpj: &str) -> CompanyRecord {
        CompanyRecord::new(cnpj, Some("RESTAURANTE"), Some("70000-000"))
    }

    fn cached(cnpjs: &[&str]) -> FetchedTable {
        let mut table = FetchedTable::empty();
        for cnpj in cnpjs {
            let mut row = FetchedRow::new();
            row.insert("cnpj".to_string(), cnpj.to_string());
            table.append(row);
        }
        table
    }

    fn ids(batch: &[&CompanyRecord]) -> Vec<String> {
        batch.iter().map(|c| c.cnpj.clone()).collect()
    }

    #[test]
    fn test_excludes_exactly_the_cached_identifiers() {
        let cache = cached(&["A", "B"]);
        let companies = vec![company("A"), company("B"), company("C"), company("D")];

        let batch = remaining_companies(&cache, &companies, DEFAULT_BATCH_SIZE);

        assert_eq!(ids(&batch), vec!["C", "D"]);
    }

    #[test]
    fn test_empty_cache_keeps_everything() {
        let cache = FetchedTable::empty();
        let companies = vec![company("A"), company("B")];

        let batch = remaining_companies(&cache, &companies, DEFAULT_BATCH_SIZE);

        assert_eq!(ids(&batch), vec!["A", "B"]);
    }

    #[test]
    fn test_batch_never_exceeds_its_size() {
        let cache = cached(&["0"]);
        let companies: Vec<CompanyRecord> = (0..57).map(|i| company(&i.to_string())).collect();

        let batch = remaining_companies(&cache, &companies, DEFAULT_BATCH_SIZE);

        assert_eq!(batch.len(), 20);
        assert_eq!(batch[0].cnpj, "1", "order follows the selection");
    }

    #[test]
    fn test_duplicate_companies_are_queued_once() {
        let cache = FetchedTable::empty();
        let companies = vec![company("A"), company("A"), company("B")];

        let batch = remaining_companies(&cache, &companies, 10);

        assert_eq!(ids(&batch), vec!["A", "B"]);
    }

    #[test]
    fn test_fully_cached_selection_is_empty() {
        let cache = cached(&["A", "B"]);
        let companies = vec![company("A"), company("B")];

        assert!(remaining_companies(&cache, &companies, 20).is_empty());
    }
}
