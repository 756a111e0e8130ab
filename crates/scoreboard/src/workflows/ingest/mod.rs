//! Merges the case-activity and report-count exports into one record per employee.

mod normalizer;
mod parser;

pub(crate) use normalizer::normalize_header;

use crate::workflows::scoring::{EmployeeRecordSet, FieldMapping};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// The two exports a reporting period is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Activity,
    Reports,
}

impl SourceTable {
    pub const fn label(self) -> &'static str {
        match self {
            SourceTable::Activity => "activity export",
            SourceTable::Reports => "report export",
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Column layout of the two exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub activity_id_column: String,
    pub report_id_column: String,
    /// Preamble rows above the activity export's header row.
    pub activity_skip_rows: usize,
    pub report_skip_rows: usize,
    /// Count columns to read; everything else is ignored.
    pub count_fields: Vec<String>,
}

impl IngestOptions {
    pub fn for_fields(fields: &FieldMapping) -> Self {
        Self {
            count_fields: fields.all(),
            ..Self::default()
        }
    }

    pub fn with_activity_skip_rows(mut self, rows: usize) -> Self {
        self.activity_skip_rows = rows;
        self
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            activity_id_column: "OWNER ID".to_string(),
            report_id_column: "TEAM MEMBER".to_string(),
            activity_skip_rows: 0,
            report_skip_rows: 0,
            count_fields: FieldMapping::default().all(),
        }
    }
}

/// Reasons an export could not be ingested. Ingestion is all-or-nothing.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("failed to read {table}: {source}")]
    Io {
        table: SourceTable,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV data in {table}: {source}")]
    Csv {
        table: SourceTable,
        #[source]
        source: csv::Error,
    },
    #[error("{table} has no header row")]
    EmptyTable { table: SourceTable },
    #[error("{table} is missing required column '{column}'")]
    MissingColumn { table: SourceTable, column: String },
    #[error("{table} line {line}, column '{column}': '{value}' is not a number")]
    InvalidCell {
        table: SourceTable,
        line: u64,
        column: String,
        value: String,
    },
    #[error("{table} line {line}, column '{column}': negative count {value}")]
    NegativeCell {
        table: SourceTable,
        line: u64,
        column: String,
        value: f64,
    },
}

pub struct ActivityImporter;

impl ActivityImporter {
    pub fn from_paths<A: AsRef<Path>, B: AsRef<Path>>(
        activity: A,
        reports: B,
        options: &IngestOptions,
    ) -> Result<EmployeeRecordSet, IngestionError> {
        let activity = File::open(activity).map_err(|source| IngestionError::Io {
            table: SourceTable::Activity,
            source,
        })?;
        let reports = File::open(reports).map_err(|source| IngestionError::Io {
            table: SourceTable::Reports,
            source,
        })?;
        Self::from_readers(activity, reports, options)
    }

    /// Outer-joins both exports on the normalized employee id. Employees present in
    /// only one export still get a record; absent counts read as zero.
    pub fn from_readers<A: Read, B: Read>(
        activity: A,
        reports: B,
        options: &IngestOptions,
    ) -> Result<EmployeeRecordSet, IngestionError> {
        let count_fields: Vec<String> = options
            .count_fields
            .iter()
            .map(|field| normalize_header(field))
            .collect();

        let activity_rows = parser::parse_table(
            activity,
            SourceTable::Activity,
            &options.activity_id_column,
            &count_fields,
            options.activity_skip_rows,
        )?;
        let report_rows = parser::parse_table(
            reports,
            SourceTable::Reports,
            &options.report_id_column,
            &count_fields,
            options.report_skip_rows,
        )?;

        debug!(
            activity_rows = activity_rows.len(),
            report_rows = report_rows.len(),
            "parsed source exports"
        );

        let mut merged = EmployeeRecordSet::new();
        for row in activity_rows.into_iter().chain(report_rows) {
            let record = merged.entry(row.id);
            for (field, value) in row.counts {
                record.add_count(&field, value);
            }
        }

        Ok(merged)
    }
}
