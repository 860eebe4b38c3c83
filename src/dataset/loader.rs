// Tabular dataset loading (CSV/TSV via csv, spreadsheets via calamine)

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::errors::file_not_found_error;
use crate::optimizer::{Dataset, TestCase};

const INPUT_COLUMN: &str = "input_data";
const OUTPUT_COLUMN: &str = "expected_output";
const REASON_COLUMN: &str = "reason";

/// Header row plus data rows, every cell as trimmed text.
#[derive(Debug, Default)]
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn cell(&self, row: &[String], column: usize) -> String {
        row.get(column).cloned().unwrap_or_default()
    }
}

/// Load labeled test cases from a `.csv`, `.tsv`, `.xlsx`, `.xls` or `.ods` file.
///
/// Columns are `input_data` / `expected_output` when both exist; otherwise the
/// first header containing "input" (else column 0) and the first containing
/// "output" or "expected" (else column 1). An optional `reason` column is kept.
/// Rows with an empty or `nan` input or output are skipped.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let table = read_table(path)?;
    let (input, output) = resolve_labeled_columns(&table.headers)?;
    let reason = find_column(&table.headers, |h| h == REASON_COLUMN);

    let mut skipped = 0;
    let dataset: Dataset = table
        .rows
        .iter()
        .filter_map(|row| {
            let input_text = table.cell(row, input);
            let output_text = table.cell(row, output);
            if is_missing(&input_text) || is_missing(&output_text) {
                skipped += 1;
                return None;
            }
            let mut case = TestCase::new(input_text, output_text);
            if let Some(col) = reason {
                let reason_text = table.cell(row, col);
                if !is_missing(&reason_text) {
                    case.reason = Some(reason_text);
                }
            }
            Some(case)
        })
        .collect();

    if skipped > 0 {
        tracing::debug!(skipped, "Skipped rows with missing input or output");
    }
    tracing::info!("Loaded {} test cases from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Load only the input column, for prediction over unlabeled data.
pub fn load_inputs(path: &Path) -> Result<Vec<String>> {
    let table = read_table(path)?;
    let input = find_column(&table.headers, |h| h == INPUT_COLUMN)
        .or_else(|| find_column(&table.headers, |h| h.contains("input")))
        .with_context(|| {
            format!(
                "No '{}' column found in {} (columns: {})",
                INPUT_COLUMN,
                path.display(),
                table.headers.join(", ")
            )
        })?;

    let inputs: Vec<String> = table
        .rows
        .iter()
        .map(|row| table.cell(row, input))
        .filter(|text| !is_missing(text))
        .collect();

    tracing::info!("Loaded {} records from {}", inputs.len(), path.display());
    Ok(inputs)
}

fn resolve_labeled_columns(headers: &[String]) -> Result<(usize, usize)> {
    let exact_input = find_column(headers, |h| h == INPUT_COLUMN);
    let exact_output = find_column(headers, |h| h == OUTPUT_COLUMN);
    if let (Some(input), Some(output)) = (exact_input, exact_output) {
        return Ok((input, output));
    }

    if headers.len() < 2 {
        bail!(
            "Dataset needs an input and an expected output column, found: {}",
            headers.join(", ")
        );
    }

    let input = find_column(headers, |h| h.contains("input")).unwrap_or(0);
    let output = find_column(headers, |h| h.contains("output") || h.contains("expected"))
        .unwrap_or(1);
    tracing::warn!(
        "Columns '{}' and '{}' not found; using '{}' and '{}'",
        INPUT_COLUMN,
        OUTPUT_COLUMN,
        headers[input],
        headers[output]
    );
    Ok((input, output))
}

/// First column whose lowercased header satisfies `pred`
fn find_column(headers: &[String], pred: impl Fn(&str) -> bool) -> Option<usize> {
    headers.iter().position(|h| pred(&h.to_lowercase()))
}

fn is_missing(text: &str) -> bool {
    text.is_empty() || text.eq_ignore_ascii_case("nan")
}

fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        bail!(file_not_found_error(&path.display().to_string(), "Dataset file"));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_delimited(path, b','),
        "tsv" => read_delimited(path, b'\t'),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(path),
        other => bail!(
            "Unsupported dataset format '{}' for {} (expected csv, tsv, xlsx, xls or ods)",
            other,
            path.display()
        ),
    }
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed row {} in {}", line + 2, path.display()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table { headers, rows })
}

fn read_spreadsheet(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open spreadsheet {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} contains no worksheets", path.display()))?
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());
    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        // Integral floats read back the way they were typed
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}
