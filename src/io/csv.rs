//! Delimited-text design files and coefficient export

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use super::results::CoefficientReport;
use crate::data::{CompressedColumn, DesignMatrix};
use crate::error::{CcdError, Result};

/// Which columns of a design file carry per-row data rather than covariates
#[derive(Debug, Clone)]
pub struct DesignFileSpec {
    pub outcome: String,
    /// Contiguous stratum ids for conditional models
    pub stratum: Option<String>,
    /// Exposure or survival time
    pub time: Option<String>,
    /// Covariate whose coefficient is fixed at 1; moved to column 0
    pub offset: Option<String>,
}

impl DesignFileSpec {
    pub fn new(outcome: impl Into<String>) -> Self {
        Self {
            outcome: outcome.into(),
            stratum: None,
            time: None,
            offset: None,
        }
    }

    pub fn with_stratum(mut self, name: impl Into<String>) -> Self {
        self.stratum = Some(name.into());
        self
    }

    pub fn with_time(mut self, name: impl Into<String>) -> Self {
        self.time = Some(name.into());
        self
    }

    pub fn with_offset(mut self, name: impl Into<String>) -> Self {
        self.offset = Some(name.into());
        self
    }
}

/// Tab if the header line contains one, otherwise comma
fn detect_delimiter(path: &Path) -> Result<u8> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    if header.trim().is_empty() {
        return Err(CcdError::EmptyData {
            reason: format!("Empty design file: {}", path.display()),
        });
    }
    Ok(if header.contains('\t') { b'\t' } else { b',' })
}

fn find_column(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| CcdError::InvalidDesignMatrix {
            reason: format!("Column '{}' not found in header", name),
        })
}

fn parse_field(record: &StringRecord, row: usize, col: usize, header: &str) -> Result<f64> {
    let raw = record.get(col).unwrap_or("").trim().trim_matches('"');
    raw.parse::<f64>().map_err(|_| CcdError::InvalidDesignMatrix {
        reason: format!("Invalid value '{}' at row {}, column '{}'", raw, row + 1, header),
    })
}

/// Read a design matrix from a delimited file with a header row.
///
/// Every column not named in `layout` becomes a covariate, stored as an
/// indicator, sparse or dense column depending on its values.
pub fn read_design_matrix<P: AsRef<Path>>(path: P, layout: &DesignFileSpec) -> Result<DesignMatrix> {
    let path = path.as_ref();
    let delimiter = detect_delimiter(path)?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_matches('"').to_string())
        .collect();

    let outcome_col = find_column(&headers, &layout.outcome)?;
    let stratum_col = layout.stratum.as_deref().map(|s| find_column(&headers, s)).transpose()?;
    let time_col = layout.time.as_deref().map(|s| find_column(&headers, s)).transpose()?;
    let offset_col = layout.offset.as_deref().map(|s| find_column(&headers, s)).transpose()?;

    let mut covariate_cols: Vec<usize> = (0..headers.len())
        .filter(|&c| c != outcome_col && Some(c) != stratum_col && Some(c) != time_col)
        .collect();
    if let Some(offset) = offset_col {
        covariate_cols.retain(|&c| c != offset);
        covariate_cols.insert(0, offset);
    }
    if covariate_cols.is_empty() {
        return Err(CcdError::InvalidDesignMatrix {
            reason: "Design file has no covariate columns".to_string(),
        });
    }

    let mut outcomes = Vec::new();
    let mut strata = Vec::new();
    let mut times = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); covariate_cols.len()];

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        outcomes.push(parse_field(&record, row, outcome_col, &headers[outcome_col])?);
        if let Some(col) = stratum_col {
            let raw = record.get(col).unwrap_or("").trim_matches('"');
            let id = raw.parse::<i64>().map_err(|_| CcdError::InvalidDesignMatrix {
                reason: format!("Invalid stratum id '{}' at row {}", raw, row + 1),
            })?;
            strata.push(id);
        }
        if let Some(col) = time_col {
            times.push(parse_field(&record, row, col, &headers[col])?);
        }
        for (slot, &col) in values.iter_mut().zip(&covariate_cols) {
            slot.push(parse_field(&record, row, col, &headers[col])?);
        }
    }

    if outcomes.is_empty() {
        return Err(CcdError::EmptyData {
            reason: "No rows found in design file".to_string(),
        });
    }

    let columns: Vec<CompressedColumn> = covariate_cols
        .iter()
        .zip(values)
        .map(|(&col, v)| CompressedColumn::from_dense_auto(headers[col].clone(), v))
        .collect();

    log::info!(
        "Read design with {} rows and {} covariates from {}",
        outcomes.len(),
        columns.len(),
        path.display()
    );
    for column in &columns {
        log::debug!("Covariate '{}' stored as {}", column.label(), column.format_type());
    }

    let mut design = DesignMatrix::new(columns, outcomes)?;
    if stratum_col.is_some() {
        design = design.with_strata(strata)?;
    }
    if time_col.is_some() {
        design = design.with_times(times)?;
    }
    if offset_col.is_some() {
        design = design.with_offset_covariate()?;
    }
    Ok(design)
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| format!("{:.6e}", v))
}

/// Write one row per coefficient as CSV; error columns only when present
pub fn write_results<P: AsRef<Path>>(path: P, report: &CoefficientReport) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path)?;
    let with_ase = report.has_standard_errors();

    if with_ase {
        writer.write_record(["label", "estimate", "ase", "z", "pvalue"])?;
    } else {
        writer.write_record(["label", "estimate"])?;
    }
    for row in &report.coefficients {
        let estimate = format!("{:.10}", row.estimate);
        if with_ase {
            writer.write_record([
                row.label.as_str(),
                estimate.as_str(),
                format_optional(row.standard_error).as_str(),
                format_optional(row.z_score).as_str(),
                format_optional(row.p_value).as_str(),
            ])?;
        } else {
            writer.write_record([row.label.as_str(), estimate.as_str()])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write the full report as pretty-printed JSON
pub fn write_results_json<P: AsRef<Path>>(path: P, report: &CoefficientReport) -> Result<()> {
    let mut file = File::create(path)?;
    let payload = serde_json::to_string_pretty(report)?;
    writeln!(file, "{}", payload)?;
    Ok(())
}
