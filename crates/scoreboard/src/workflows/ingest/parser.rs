use super::normalizer::{normalize_header, parse_count};
use super::{IngestionError, SourceTable};
use crate::workflows::scoring::EmployeeId;
use std::io::Read;

#[derive(Debug)]
pub(crate) struct ParsedRow {
    pub(crate) id: EmployeeId,
    pub(crate) counts: Vec<(String, f64)>,
}

/// Reads one export: skips `skip_rows` preamble lines, takes the next row as the
/// header, then yields the id and configured count columns of every non-blank row.
pub(crate) fn parse_table<R: Read>(
    reader: R,
    table: SourceTable,
    id_column: &str,
    count_fields: &[String],
    skip_rows: usize,
) -> Result<Vec<ParsedRow>, IngestionError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = csv_reader.records().skip(skip_rows);

    let header = match records.next() {
        Some(row) => row.map_err(|source| IngestionError::Csv { table, source })?,
        None => return Err(IngestionError::EmptyTable { table }),
    };
    let header: Vec<String> = header.iter().map(normalize_header).collect();

    let wanted_id = normalize_header(id_column);
    let id_index = header
        .iter()
        .position(|column| *column == wanted_id)
        .ok_or_else(|| IngestionError::MissingColumn {
            table,
            column: wanted_id.clone(),
        })?;

    let count_columns: Vec<(usize, &String)> = count_fields
        .iter()
        .filter_map(|field| {
            header
                .iter()
                .position(|column| column == field)
                .map(|index| (index, field))
        })
        .collect();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|source| IngestionError::Csv { table, source })?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|position| position.line()).unwrap_or(0);

        let id = EmployeeId::new(record.get(id_index).unwrap_or(""));
        let mut counts = Vec::with_capacity(count_columns.len());
        for (index, field) in &count_columns {
            let raw = record.get(*index).unwrap_or("");
            let value = parse_count(raw).ok_or_else(|| IngestionError::InvalidCell {
                table,
                line,
                column: (*field).clone(),
                value: raw.to_string(),
            })?;
            if value < 0.0 {
                return Err(IngestionError::NegativeCell {
                    table,
                    line,
                    column: (*field).clone(),
                    value,
                });
            }
            counts.push(((*field).clone(), value));
        }

        rows.push(ParsedRow { id, counts });
    }

    Ok(rows)
}
