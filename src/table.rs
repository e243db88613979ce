//! Spreadsheet parsing and the plain-text report built from it.
//!
//! CSV goes through the `csv` crate; `.xlsx` and legacy `.xls` workbooks
//! through `calamine` (first worksheet only). All of them land in a
//! [`Table`]: the first row is the header, every following row is data.
//!
//! [`Table::report`] renders the column list, row count, a five-row sample
//! and descriptive statistics for the numeric columns.

use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xls, Xlsx};

/// Rows shown in the report's sample section.
pub const SAMPLE_ROWS: usize = 5;

/// Excel's sheet limits; references beyond them come from corrupt files.
const MAX_SHEET_ROWS: u32 = 1_048_576;
const MAX_SHEET_COLUMNS: u32 = 16_384;
/// Maximum cells in the rebuilt grid, counting the blanks between used cells.
const MAX_GRID_CELLS: u64 = 1_000_000;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Workbook(String),
    #[error("{0}")]
    Sheet(String),
    #[error("No columns to parse from file")]
    NoColumns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Interpret a raw field: blank → `Empty`, finite number → `Number`,
    /// anything else → `Text`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(raw.to_string()),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table from a grid whose first row is the header. Short rows
    /// are padded with `Empty`; blank header cells become `Unnamed: <i>`.
    pub fn from_grid(grid: Vec<Vec<Cell>>) -> Result<Self, TableError> {
        let mut grid = grid.into_iter();
        let header = grid.next().ok_or(TableError::NoColumns)?;
        let body: Vec<Vec<Cell>> = grid.collect();

        let width = body
            .iter()
            .map(|r| r.len())
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(0);
        if width == 0 {
            return Err(TableError::NoColumns);
        }

        let columns = (0..width)
            .map(|i| match header.get(i) {
                Some(Cell::Text(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Cell::Number(v)) => format_number(*v),
                _ => format!("Unnamed: {}", i),
            })
            .collect();

        let rows = body
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();

        Ok(Self { columns, rows })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, TableError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(record.iter().map(Cell::parse).collect());
        }
        Self::from_grid(grid)
    }

    /// Read the first worksheet of an `.xlsx` workbook.
    pub fn from_xlsx_path(path: &Path) -> Result<Self, TableError> {
        let workbook: Xlsx<_> =
            open_workbook(path).map_err(|e: calamine::XlsxError| TableError::Workbook(e.to_string()))?;
        Self::from_xlsx_workbook(workbook)
    }

    pub fn from_xlsx_reader<RS: Read + Seek>(reader: RS) -> Result<Self, TableError> {
        let workbook = Xlsx::new(reader).map_err(|e| TableError::Workbook(e.to_string()))?;
        Self::from_xlsx_workbook(workbook)
    }

    /// Cells are streamed and bounds-checked one by one, so a corrupt
    /// reference is rejected before any grid is allocated for it.
    fn from_xlsx_workbook<RS: Read + Seek>(mut workbook: Xlsx<RS>) -> Result<Self, TableError> {
        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| TableError::Workbook("workbook contains no worksheets".to_string()))?;

        let mut sheet = SparseSheet::default();
        let mut cells = workbook
            .worksheet_cells_reader(&name)
            .map_err(|e| TableError::Workbook(e.to_string()))?;
        while let Some(cell) = cells
            .next_cell()
            .map_err(|e| TableError::Workbook(e.to_string()))?
        {
            let (row, column) = cell.get_position();
            let data = Data::from(cell.get_value().clone());
            sheet.insert(row, column, cell_from_data(&data))?;
        }
        Self::from_grid(sheet.into_grid()?)
    }

    /// Read the first worksheet of a legacy `.xls` workbook.
    pub fn from_xls_path(path: &Path) -> Result<Self, TableError> {
        let mut workbook: Xls<_> =
            open_workbook(path).map_err(|e: calamine::XlsError| TableError::Workbook(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| TableError::Workbook("workbook contains no worksheets".to_string()))?
            .map_err(|e| TableError::Workbook(e.to_string()))?;

        let (first_row, first_column) = range.start().unwrap_or((0, 0));
        let mut sheet = SparseSheet::default();
        for (row, column, data) in range.used_cells() {
            sheet.insert(
                first_row.saturating_add(row as u32),
                first_column.saturating_add(column as u32),
                cell_from_data(data),
            )?;
        }
        Self::from_grid(sheet.into_grid()?)
    }

    /// Indices of columns whose non-empty cells are all numbers (and that
    /// have at least one number).
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&c| {
                let mut any = false;
                for row in &self.rows {
                    match &row[c] {
                        Cell::Number(_) => any = true,
                        Cell::Empty => {}
                        Cell::Text(_) => return false,
                    }
                }
                any
            })
            .collect()
    }

    /// The full report for a file called `file_name`.
    pub fn report(&self, file_name: &str) -> String {
        let mut text = format!("File: {}\n", file_name);
        text.push_str(&format!("Columns: {}\n", self.columns.join(", ")));
        text.push_str(&format!("Rows: {}\n\n", self.rows.len()));

        text.push_str("Sample data:\n");
        text.push_str(&self.render_head(SAMPLE_ROWS));
        text.push_str("\n\n");

        text.push_str("Summary statistics:\n");
        if let Some(stats) = self.describe() {
            text.push_str(&stats);
        }
        text
    }

    /// First `n` rows as an aligned text table with a row index.
    pub fn render_head(&self, n: usize) -> String {
        if self.rows.is_empty() {
            return format!(
                "Empty DataFrame\nColumns: [{}]\nIndex: []",
                self.columns.join(", ")
            );
        }

        let shown = &self.rows[..n.min(self.rows.len())];
        let numeric = self.numeric_columns();
        let body: Vec<Vec<String>> = shown
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(c, cell)| self.render_cell(c, cell, numeric.contains(&c)))
                    .collect()
            })
            .collect();
        let index: Vec<String> = (0..shown.len()).map(|i| i.to_string()).collect();

        render_grid(&self.columns, &index, &body)
    }

    /// count / mean / std / min / quartiles / max for every numeric column.
    pub fn describe(&self) -> Option<String> {
        let numeric = self.numeric_columns();
        if numeric.is_empty() {
            return None;
        }

        let labels = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
        let stats: Vec<ColumnStats> = numeric
            .iter()
            .map(|&c| {
                ColumnStats::from_values(self.rows.iter().filter_map(|r| r[c].as_number()).collect())
            })
            .collect();

        let header: Vec<String> = numeric.iter().map(|&c| self.columns[c].clone()).collect();
        let index: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let body: Vec<Vec<String>> = (0..labels.len())
            .map(|row| stats.iter().map(|s| format_stat(s.row(row))).collect())
            .collect();

        Some(render_grid(&header, &index, &body))
    }

    fn render_cell(&self, column: usize, cell: &Cell, numeric: bool) -> String {
        match cell {
            Cell::Empty => "NaN".to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Number(v) if numeric && !self.is_integral_column(column) => format_float(*v),
            Cell::Number(v) => format_number(*v),
        }
    }

    fn is_integral_column(&self, column: usize) -> bool {
        self.rows.iter().all(|r| match &r[column] {
            Cell::Number(v) => v.fract() == 0.0 && v.abs() < 1e15,
            _ => false,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnStats {
    count: usize,
    mean: f64,
    std: f64,
    min: f64,
    q1: f64,
    median: f64,
    q3: f64,
    max: f64,
}

impl ColumnStats {
    fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = values.len();
        let n = count as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if count > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            f64::NAN
        };
        Self {
            count,
            mean,
            std,
            min: values.first().copied().unwrap_or(f64::NAN),
            q1: quantile(&values, 0.25),
            median: quantile(&values, 0.5),
            q3: quantile(&values, 0.75),
            max: values.last().copied().unwrap_or(f64::NAN),
        }
    }

    fn row(&self, i: usize) -> f64 {
        match i {
            0 => self.count as f64,
            1 => self.mean,
            2 => self.std,
            3 => self.min,
            4 => self.q1,
            5 => self.median,
            6 => self.q3,
            _ => self.max,
        }
    }
}

/// Linear-interpolation quantile over sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn format_stat(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.6}", v)
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

fn format_float(v: f64) -> String {
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') {
        s
    } else {
        format!("{}.0", s)
    }
}

/// Left-aligned index column, right-aligned data columns, two-space gutters.
fn render_grid(header: &[String], index: &[String], body: &[Vec<String>]) -> String {
    let index_width = index.iter().map(|s| s.chars().count()).max().unwrap_or(0);
    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(c, h)| {
            body.iter()
                .map(|r| r[c].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(body.len() + 1);
    let mut head_line = " ".repeat(index_width);
    for (h, w) in header.iter().zip(&widths) {
        head_line.push_str(&format!("  {:>w$}", h, w = *w));
    }
    lines.push(head_line);

    for (label, row) in index.iter().zip(body) {
        let mut line = format!("{:<w$}", label, w = index_width);
        for (v, w) in row.iter().zip(&widths) {
            line.push_str(&format!("  {:>w$}", v, w = *w));
        }
        lines.push(line);
    }
    lines.join("\n")
}

// ============ Workbooks ============

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) if f.is_finite() => Cell::Number(*f),
        Data::Float(_) => Cell::Empty,
        Data::String(s) => Cell::parse(s),
        Data::Bool(b) => Cell::Text(if *b { "True" } else { "False" }.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

/// Non-empty worksheet cells keyed by absolute (row, column).
#[derive(Debug, Default)]
struct SparseSheet {
    rows: BTreeMap<u32, BTreeMap<u32, Cell>>,
    width: u32,
}

impl SparseSheet {
    fn insert(&mut self, row: u32, column: u32, cell: Cell) -> Result<(), TableError> {
        if row >= MAX_SHEET_ROWS || column >= MAX_SHEET_COLUMNS {
            return Err(TableError::Sheet(format!(
                "cell reference out of range (row {}, column {})",
                u64::from(row) + 1,
                u64::from(column) + 1
            )));
        }
        if cell.is_empty() {
            return Ok(());
        }
        self.width = self.width.max(column + 1);
        self.rows.entry(row).or_default().insert(column, cell);
        Ok(())
    }

    /// Dense rows from the first used row to the last; columns start at A.
    fn into_grid(self) -> Result<Vec<Vec<Cell>>, TableError> {
        let (Some(&first), Some(&last)) = (self.rows.keys().next(), self.rows.keys().next_back())
        else {
            return Ok(Vec::new());
        };
        let height = u64::from(last - first) + 1;
        if height * u64::from(self.width) > MAX_GRID_CELLS {
            return Err(TableError::Sheet(format!(
                "worksheet too large ({} rows x {} columns)",
                height, self.width
            )));
        }

        let mut rows = self.rows;
        Ok((first..=last)
            .map(|r| match rows.remove(&r) {
                Some(cells) => {
                    let width = cells.keys().next_back().map_or(0, |c| *c as usize + 1);
                    let mut out = vec![Cell::Empty; width];
                    for (c, cell) in cells {
                        out[c as usize] = cell;
                    }
                    out
                }
                None => Vec::new(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_csv_reader("name,score,city\nada,1.5,london\nbob,2.5,\ncy,3.5,paris\n".as_bytes())
            .unwrap()
    }

    #[test]
    fn csv_header_and_rows() {
        let t = sample();
        assert_eq!(t.columns, vec!["name", "score", "city"]);
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[1][2], Cell::Empty);
    }

    #[test]
    fn numeric_column_detection() {
        assert_eq!(sample().numeric_columns(), vec![1]);
    }

    #[test]
    fn describe_matches_sample_statistics() {
        let stats = ColumnStats::from_values(vec![1.5, 2.5, 3.5]);
        assert_eq!(stats.count, 3);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        assert!((stats.std - 1.0).abs() < 1e-12);
        assert!((stats.q1 - 2.0).abs() < 1e-12);
        assert!((stats.median - 2.5).abs() < 1e-12);
        assert!((stats.q3 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn describe_renders_labels() {
        let text = sample().describe().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 9);
        assert!(lines[0].trim_end().ends_with("score"));
        assert!(lines[1].starts_with("count"));
        assert!(lines[1].ends_with("3.000000"));
        assert!(lines[2].ends_with("2.500000"));
        assert!(lines[8].starts_with("max"));
    }

    #[test]
    fn no_numeric_columns_means_no_describe() {
        let t = Table::from_csv_reader("a,b\nx,y\n".as_bytes()).unwrap();
        assert!(t.describe().is_none());
        assert!(t.report("t.csv").ends_with("Summary statistics:\n"));
    }

    #[test]
    fn head_is_limited_to_five_rows() {
        let mut csv = String::from("n\n");
        for i in 0..12 {
            csv.push_str(&format!("{}\n", i));
        }
        let t = Table::from_csv_reader(csv.as_bytes()).unwrap();
        let head = t.render_head(SAMPLE_ROWS);
        assert_eq!(head.lines().count(), 6);
        assert!(head.lines().last().unwrap().starts_with('4'));
    }

    #[test]
    fn head_alignment() {
        let head = sample().render_head(SAMPLE_ROWS);
        let lines: Vec<&str> = head.lines().collect();
        assert_eq!(lines[0], "   name  score    city");
        assert_eq!(lines[1], "0   ada    1.5  london");
        assert_eq!(lines[2], "1   bob    2.5     NaN");
    }

    #[test]
    fn report_layout() {
        let report = sample().report("scores.csv");
        assert!(report.starts_with("File: scores.csv\nColumns: name, score, city\nRows: 3\n\nSample data:\n"));
        assert!(report.contains("\n\nSummary statistics:\n"));
    }

    #[test]
    fn empty_csv_has_no_columns() {
        let err = Table::from_csv_reader("".as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::NoColumns));
    }

    #[test]
    fn blank_header_cells_are_named() {
        let t = Table::from_csv_reader(",b\n1,2\n".as_bytes()).unwrap();
        assert_eq!(t.columns, vec!["Unnamed: 0", "b"]);
    }

    #[test]
    fn sparse_sheet_rebuilds_from_first_used_row() {
        let mut sheet = SparseSheet::default();
        sheet.insert(2, 0, Cell::parse("name")).unwrap();
        sheet.insert(2, 2, Cell::parse("qty")).unwrap();
        sheet.insert(4, 1, Cell::parse("7")).unwrap();
        sheet.insert(4, 2, Cell::Empty).unwrap();

        let grid = sheet.into_grid().unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0], vec![Cell::parse("name"), Cell::Empty, Cell::parse("qty")]);
        assert!(grid[1].is_empty());
        assert_eq!(grid[2], vec![Cell::Empty, Cell::Number(7.0)]);
    }

    #[test]
    fn references_beyond_excel_limits_are_rejected() {
        let mut sheet = SparseSheet::default();
        let err = sheet.insert(0, MAX_SHEET_COLUMNS, Cell::parse("x")).unwrap_err();
        assert!(matches!(err, TableError::Sheet(_)));
        assert!(err.to_string().contains("column 16385"));
        assert!(sheet.insert(MAX_SHEET_ROWS, 0, Cell::parse("x")).is_err());
        assert!(sheet.insert(u32::MAX, u32::MAX, Cell::Empty).is_err());
        assert!(sheet.insert(MAX_SHEET_ROWS - 1, MAX_SHEET_COLUMNS - 1, Cell::Empty).is_ok());
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let mut sheet = SparseSheet::default();
        sheet.insert(0, 0, Cell::parse("a")).unwrap();
        sheet.insert(0, MAX_SHEET_COLUMNS - 1, Cell::parse("b")).unwrap();
        sheet.insert(MAX_SHEET_ROWS - 1, 0, Cell::parse("c")).unwrap();
        let err = sheet.into_grid().unwrap_err();
        assert!(err.to_string().starts_with("worksheet too large"));
    }

    #[test]
    fn header_only_sheet_renders_empty_frame() {
        let t = Table::from_csv_reader("a,b\n".as_bytes()).unwrap();
        assert_eq!(t.render_head(SAMPLE_ROWS), "Empty DataFrame\nColumns: [a, b]\nIndex: []");
        assert!(t.report("t.csv").contains("Rows: 0\n\nSample data:\nEmpty DataFrame\n"));
    }

    #[test]
    fn workbook_values_map_to_cells() {
        assert_eq!(cell_from_data(&Data::Float(2.5)), Cell::Number(2.5));
        assert_eq!(cell_from_data(&Data::Int(3)), Cell::Number(3.0));
        assert_eq!(cell_from_data(&Data::Bool(true)), Cell::Text("True".to_string()));
        assert_eq!(cell_from_data(&Data::String(" ".to_string())), Cell::Empty);
        assert_eq!(cell_from_data(&Data::Float(f64::NAN)), Cell::Empty);
    }

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&v, 0.5) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_xlsx_is_an_error() {
        let err = Table::from_xlsx_reader(std::io::Cursor::new(b"not a zip".to_vec())).unwrap_err();
        assert!(matches!(err, TableError::Workbook(_)));
    }
}
