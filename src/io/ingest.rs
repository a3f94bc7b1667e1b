//! CSV ingest and validation.
//!
//! Turns up to three CSV files into one [`GrowthData`]:
//!
//! | file | required columns |
//! | --- | --- |
//! | census | `site`, `length` |
//! | recaptures | `site`, `initial_length`, `days`, `recapture_length` |
//! | covariates | `site`, `temperature`, `effort` |
//!
//! Design goals:
//! - **Strict schema**: missing columns fail with exit code 2
//! - **Row-level validation**: every bad row is reported with its line number;
//!   any bad row fails the load (values are never silently corrected or dropped)
//! - **Deterministic site order**: covariates file first, then census, then
//!   recaptures, in order of first appearance
//! - **Standardized covariates**: `(x - mean) / (2 sd)` across sites

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use log::info;

use crate::data::standardize_covariates;
use crate::domain::{
    CensusObservation, FitConfig, GrowthData, RecaptureObservation, Site, SiteCovariates, Sites,
};
use crate::error::AppError;

/// Errors listed in full before the load fails.
const MAX_REPORTED_ROWS: usize = 10;

/// Summary stats about the loaded dataset.
#[derive(Debug, Clone)]
pub struct DatasetStats {
    pub n_sites: usize,
    pub n_census: usize,
    pub n_recaptures: usize,
    pub length_min: f64,
    pub length_max: f64,
    pub days_min: Option<f64>,
    pub days_max: Option<f64>,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub file: &'static str,
    pub line: usize,
    pub site: Option<String>,
    pub message: String,
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.site {
            Some(site) => write!(f, "{} line {} (site {site}): {}", self.file, self.line, self.message),
            None => write!(f, "{} line {}: {}", self.file, self.line, self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestedData {
    pub data: GrowthData,
    pub stats: DatasetStats,
    pub rows_read: usize,
}

struct CensusRow {
    site: String,
    length: f64,
}

struct RecaptureRow {
    site: String,
    initial: f64,
    days: f64,
    recapture: f64,
}

struct CovariateRow {
    site: String,
    covariates: SiteCovariates,
}

/// Load every configured CSV into a validated dataset.
pub fn load_growth_data(config: &FitConfig) -> Result<IngestedData, AppError> {
    if config.census_csv.is_none() && config.recapture_csv.is_none() {
        return Err(AppError::new(
            2,
            "At least one of `--census` or `--recaptures` is required.",
        ));
    }

    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    let covariate_rows = match &config.covariates_csv {
        Some(path) => read_rows(path, "covariates", &["site", "temperature", "effort"], &mut row_errors, &mut rows_read, |r, h| {
            Ok(CovariateRow {
                site: get_required(r, h, "site")?.to_string(),
                covariates: SiteCovariates {
                    temperature: parse_f64(r, h, "temperature")?,
                    effort: parse_f64(r, h, "effort")?,
                },
            })
        })?,
        None => Vec::new(),
    };
    let census_rows = match &config.census_csv {
        Some(path) => read_rows(path, "census", &["site", "length"], &mut row_errors, &mut rows_read, |r, h| {
            Ok(CensusRow {
                site: get_required(r, h, "site")?.to_string(),
                length: parse_f64(r, h, "length")?,
            })
        })?,
        None => Vec::new(),
    };
    let recapture_rows = match &config.recapture_csv {
        Some(path) => read_rows(
            path,
            "recaptures",
            &["site", "initial_length", "days", "recapture_length"],
            &mut row_errors,
            &mut rows_read,
            |r, h| {
                Ok(RecaptureRow {
                    site: get_required(r, h, "site")?.to_string(),
                    initial: parse_f64(r, h, "initial_length")?,
                    days: parse_f64(r, h, "days")?,
                    recapture: parse_f64(r, h, "recapture_length")?,
                })
            },
        )?,
        None => Vec::new(),
    };

    // Site order: first appearance across covariates, census, recaptures.
    let mut order: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let site_ids = covariate_rows
        .iter()
        .map(|(_, r)| &r.site)
        .chain(census_rows.iter().map(|(_, r)| &r.site))
        .chain(recapture_rows.iter().map(|(_, r)| &r.site));
    for id in site_ids {
        if !index.contains_key(id) {
            index.insert(id.clone(), order.len());
            order.push(id.clone());
        }
    }

    let mut covariates: Vec<Option<SiteCovariates>> = vec![None; order.len()];
    let mut seen_covariates = Vec::with_capacity(covariate_rows.len());
    for (line, row) in &covariate_rows {
        let idx = index[&row.site];
        if covariates[idx].is_some() {
            row_errors.push(RowError {
                file: "covariates",
                line: *line,
                site: Some(row.site.clone()),
                message: "duplicate site".to_string(),
            });
            continue;
        }
        covariates[idx] = Some(row.covariates);
        seen_covariates.push(idx);
    }
    if !seen_covariates.is_empty() {
        let raw: Vec<SiteCovariates> = seen_covariates
            .iter()
            .filter_map(|&i| covariates[i])
            .collect();
        for (&i, c) in seen_covariates.iter().zip(standardize_covariates(&raw)) {
            covariates[i] = Some(c);
        }
    }

    let mut census = Vec::with_capacity(census_rows.len());
    for (line, row) in &census_rows {
        match CensusObservation::new(index[&row.site], row.length) {
            Ok(obs) => census.push(obs),
            Err(e) => row_errors.push(RowError {
                file: "census",
                line: *line,
                site: Some(row.site.clone()),
                message: e.to_string(),
            }),
        }
    }
    let mut recaptures = Vec::with_capacity(recapture_rows.len());
    for (line, row) in &recapture_rows {
        match RecaptureObservation::new(index[&row.site], row.initial, row.days, row.recapture) {
            Ok(obs) => recaptures.push(obs),
            Err(e) => row_errors.push(RowError {
                file: "recaptures",
                line: *line,
                site: Some(row.site.clone()),
                message: e.to_string(),
            }),
        }
    }

    if !row_errors.is_empty() {
        let mut message = format!("{} invalid input row(s):", row_errors.len());
        for e in row_errors.iter().take(MAX_REPORTED_ROWS) {
            message.push_str(&format!("\n  {e}"));
        }
        if row_errors.len() > MAX_REPORTED_ROWS {
            message.push_str(&format!("\n  ... and {} more", row_errors.len() - MAX_REPORTED_ROWS));
        }
        return Err(AppError::new(2, message));
    }
    if census.is_empty() && recaptures.is_empty() {
        return Err(AppError::new(3, "No observations found in the input files."));
    }

    let sites = Sites::new(
        order
            .into_iter()
            .zip(covariates)
            .map(|(id, covariates)| Site { id, covariates })
            .collect(),
    )?;
    let data = GrowthData::new(sites, census, recaptures)?;
    let stats = compute_stats(&data);
    info!(
        "loaded {} census and {} recapture rows across {} sites",
        stats.n_census, stats.n_recaptures, stats.n_sites
    );

    Ok(IngestedData {
        data,
        stats,
        rows_read,
    })
}

fn read_rows<T>(
    path: &Path,
    file_label: &'static str,
    required: &[&str],
    row_errors: &mut Vec<RowError>,
    rows_read: &mut usize,
    parse: impl Fn(&StringRecord, &HashMap<String, usize>) -> Result<T, String>,
) -> Result<Vec<(usize, T)>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open {file_label} CSV '{}': {e}", path.display()),
        )
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read {file_label} CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for col in required {
        if !header_map.contains_key(*col) {
            return Err(AppError::new(
                2,
                format!("Missing required column in {file_label} CSV: `{col}`"),
            ));
        }
    }

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; CSV lines are 1-based.
        let line = idx + 2;
        *rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    file: file_label,
                    line,
                    site: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        match parse(&record, &header_map) {
            Ok(row) => rows.push((line, row)),
            Err(message) => row_errors.push(RowError {
                file: file_label,
                line,
                site: get_optional(&record, &header_map, "site").map(str::to_string),
                message,
            }),
        }
    }
    Ok(rows)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn compute_stats(data: &GrowthData) -> DatasetStats {
    let lengths = data
        .census
        .iter()
        .map(|c| c.length())
        .chain(data.recaptures.iter().flat_map(|r| [r.initial_length(), r.recapture_length()]));
    let (length_min, length_max) = lengths.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let days_min = data.recaptures.iter().map(|r| r.days()).reduce(f64::min);
    let days_max = data.recaptures.iter().map(|r| r.days()).reduce(f64::max);

    DatasetStats {
        n_sites: data.sites.len(),
        n_census: data.census.len(),
        n_recaptures: data.recaptures.len(),
        length_min,
        length_max,
        days_min,
        days_max,
    }
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(record: &StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<f64, String> {
    let raw = get_required(record, header_map, name)?;
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("Invalid number for `{name}`: '{raw}'"))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite value for `{name}`: '{raw}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    use crate::domain::{Hyperparameters, ModelVariant, Priors};

    fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn config(census: Option<PathBuf>, recaptures: Option<PathBuf>, covariates: Option<PathBuf>) -> FitConfig {
        FitConfig {
            census_csv: census,
            recapture_csv: recaptures,
            covariates_csv: covariates,
            hyper: Hyperparameters {
                variant: ModelVariant::Integrated,
                n_ages: 3,
                alpha: vec![1.0; 3],
                eta: 2.0,
                prior_only: false,
                use_covariates: false,
                priors: Priors::default(),
            },
            chains: 1,
            iterations: 10,
            warmup: 10,
            seed: 1,
            pit_reference_sets: 10,
            export_pointwise: None,
            export_replicates: None,
            export_diagnostics: None,
        }
    }

    #[test]
    fn loads_all_three_files_in_site_order() {
        let dir = tempfile::tempdir().unwrap();
        let cov = write_csv(&dir, "cov.csv", "\u{feff}Site,Temperature,Effort\nB,10,1\nA,14,3\n");
        let census = write_csv(&dir, "census.csv", "site,length\nA,30.5\nB,120\nC,88\n");
        let cmr = write_csv(
            &dir,
            "cmr.csv",
            "site,initial_length,days,recapture_length\nA,100,200,130\n",
        );
        let out = load_growth_data(&config(Some(census), Some(cmr), Some(cov))).unwrap();
        let ids: Vec<&str> = out.data.sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert_eq!(out.stats.n_census, 3);
        assert_eq!(out.stats.n_recaptures, 1);
        assert_eq!(out.rows_read, 6);
        let b = out.data.sites.get(0).unwrap().covariates.unwrap();
        let a = out.data.sites.get(1).unwrap().covariates.unwrap();
        assert!((b.temperature + a.temperature).abs() < 1e-12);
        assert!(out.data.sites.get(2).unwrap().covariates.is_none());
        assert_eq!(out.stats.length_max, 130.0);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let census = write_csv(&dir, "census.csv", "site,len\nA,30\n");
        let err = load_growth_data(&config(Some(census), None, None)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("`length`"));
    }

    #[test]
    fn non_positive_values_fail_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let cmr = write_csv(
            &dir,
            "cmr.csv",
            "site,initial_length,days,recapture_length\nA,100,0,130\nA,100,30,abc\n",
        );
        let err = load_growth_data(&config(None, Some(cmr), None)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let msg = err.to_string();
        assert!(msg.contains("2 invalid input row(s)"), "{msg}");
        assert!(msg.contains("recaptures line 2"), "{msg}");
        assert!(msg.contains("recaptures line 3"), "{msg}");
    }

    #[test]
    fn no_inputs_is_a_usage_error() {
        let err = load_growth_data(&config(None, None, None)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
