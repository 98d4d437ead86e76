// 🗃️ Fetched Companies Cache
// Flat-file table of API results keyed by CNPJ; loaded at start, rewritten on every checkpoint

use crate::dataset::{is_xz, open_table};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::write::XzEncoder;

/// Column holding the originating company identifier
pub const CNPJ_COLUMN: &str = "cnpj";

/// Column holding the UTC fetch time
pub const SCRAPED_AT_COLUMN: &str = "scraped_at";

const XZ_LEVEL: u32 = 6;

/// A single fetched business, flattened to text cells
pub type FetchedRow = HashMap<String, String>;

/// In-memory copy of the fetched-companies table.
///
/// Headers keep first-seen order so columns are stable across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedTable {
    headers: Vec<String>,
    rows: Vec<FetchedRow>,
}

impl FetchedTable {
    /// Empty table with only the identifier column
    pub fn empty() -> Self {
        FetchedTable {
            headers: vec![CNPJ_COLUMN.to_string()],
            rows: Vec::new(),
        }
    }

    /// Load the table at `path`, or start empty when no file exists yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no cached results yet");
            return Ok(Self::empty());
        }

        let reader = open_table(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read headers of {}", path.display()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        if !headers.iter().any(|h| h == CNPJ_COLUMN) {
            headers.push(CNPJ_COLUMN.to_string());
        }

        let mut rows = Vec::new();
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
            })?;

            let row: FetchedRow = headers
                .iter()
                .zip(record.iter())
                .filter(|(_, value)| !value.is_empty())
                .map(|(key, value)| (key.clone(), value.to_string()))
                .collect();

            rows.push(row);
        }

        Ok(FetchedTable { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[FetchedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Identifiers already fetched
    pub fn cnpjs(&self) -> HashSet<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get(CNPJ_COLUMN))
            .map(|s| s.as_str())
            .collect()
    }

    pub fn contains(&self, cnpj: &str) -> bool {
        self.rows
            .iter()
            .any(|row| row.get(CNPJ_COLUMN).map(|s| s.as_str()) == Some(cnpj))
    }

    /// Append a row; unseen keys become new trailing columns (sorted for determinism)
    pub fn append(&mut self, row: FetchedRow) {
        let mut new_keys: Vec<&String> = row
            .keys()
            .filter(|key| !self.headers.contains(key))
            .collect();
        new_keys.sort();

        let new_keys: Vec<String> = new_keys.into_iter().cloned().collect();
        self.headers.extend(new_keys);
        self.rows.push(row);
    }

    /// Write the whole table to `path`, replacing any previous file.
    ///
    /// Data goes to a sibling temp file first and is renamed into place,
    /// so an interrupted write never leaves a truncated table behind.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = temp_path_for(path);
        let written = self.write_file(&temp_path, is_xz(path)).and_then(|()| {
            std::fs::rename(&temp_path, path)
                .with_context(|| format!("Failed to move {} into place", temp_path.display()))
        });

        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        debug!(path = %path.display(), rows = self.rows.len(), "persisted fetched companies");
        Ok(())
    }

    fn write_file(&self, target: &Path, compress: bool) -> Result<()> {
        let file = File::create(target)
            .with_context(|| format!("Failed to create file: {}", target.display()))?;

        if compress {
            let mut encoder = XzEncoder::new(BufWriter::new(file), XZ_LEVEL);
            self.write_csv(&mut encoder)?;
            let mut inner = encoder.finish().context("Failed to finalize xz stream")?;
            inner.flush()?;
            inner.get_ref().sync_all()?;
        } else {
            let mut writer = BufWriter::new(file);
            self.write_csv(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        Ok(())
    }

    fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(out);

        wtr.write_record(&self.headers)
            .context("Failed to write CSV header")?;

        for row in &self.rows {
            let record: Vec<&str> = self
                .headers
                .iter()
                .map(|h| row.get(h).map(|s| s.as_str()).unwrap_or(""))
                .collect();
            wtr.write_record(&record)
                .context("Failed to write CSV row")?;
        }

        wtr.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }
}

impl Default for FetchedTable {
    fn default() -> Self {
        Self::empty()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("fetched-companies");
    path.with_file_name(format!(".{}.tmp", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(pairs: &[(&str, &str)]) -> FetchedRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_missing_file_yields_empty_table() {
        let dir = TempDir::new().unwrap();
        let table = FetchedTable::load(&dir.path().join("yelp-companies.xz")).unwrap();

        assert!(table.is_empty());
        assert_eq!(table.headers(), &["cnpj".to_string()]);
    }

    #[test]
    fn test_append_extends_headers_in_first_seen_order() {
        let mut table = FetchedTable::empty();
        table.append(row(&[("cnpj", "1"), ("name", "Bar do Zé"), ("id", "abc")]));
        table.append(row(&[("cnpj", "2"), ("name", "Padaria"), ("rating", "4.5")]));

        assert_eq!(table.headers(), &["cnpj", "id", "name", "rating"]);
        assert_eq!(table.len(), 2);
        assert!(table.contains("2"));
        assert!(!table.contains("3"));
    }

    #[test]
    fn test_persist_then_load_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("yelp-companies.xz");

        let mut table = FetchedTable::empty();
        table.append(row(&[
            ("cnpj", "13.347.016/0001-17"),
            ("name", "Restaurante, Bom"),
            ("location", r#"{"city":"Brasília","zip_code":"70000-000"}"#),
        ]));
        table.append(row(&[("cnpj", "08.209.000/0001-94"), ("phone", "+556133333333")]));
        table.persist(&path).unwrap();

        let loaded = FetchedTable::load(&path).unwrap();

        assert_eq!(loaded.headers(), table.headers());
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.rows()[0].get("name").unwrap(), "Restaurante, Bom");
        assert_eq!(loaded.rows()[1].get("name"), None, "empty cells stay absent");

        let ids = loaded.cnpjs();
        assert!(ids.contains("13.347.016/0001-17"));
        assert!(ids.contains("08.209.000/0001-94"));
    }

    #[test]
    fn test_persist_empty_table_writes_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yelp-companies.csv");

        FetchedTable::empty().persist(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "cnpj");
        assert!(!temp_path_for(&path).exists(), "temp file should be renamed away");
    }

    #[test]
    fn test_persist_overwrites_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("yelp-companies.csv");

        let mut first = FetchedTable::empty();
        first.append(row(&[("cnpj", "1")]));
        first.append(row(&[("cnpj", "2")]));
        first.persist(&path).unwrap();

        let mut second = FetchedTable::empty();
        second.append(row(&[("cnpj", "3")]));
        second.persist(&path).unwrap();

        let loaded = FetchedTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("3"));
    }

    #[test]
    fn test_failed_persist_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        // A non-empty directory can't be replaced by a file
        let path = dir.path().join("yelp-companies.csv");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let mut table = FetchedTable::empty();
        table.append(row(&[("cnpj", "1")]));

        assert!(table.persist(&path).is_err());
        assert!(!temp_path_for(&path).exists(), "temp file should be cleaned up");
        assert!(path.join("keep").exists());
    }
}
