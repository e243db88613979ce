//! Per-file text extraction, dispatched on the file extension.
//!
//! [`extract`] never fails: every error becomes an inline descriptive
//! string so one bad file cannot abort a batch. The recognised formats form
//! the closed [`FileKind`] enum.

use std::path::Path;

use tracing::{debug, warn};

use crate::table::{Table, TableError};

/// Extensions the dispatcher understands, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] =
    &["pdf", "csv", "xlsx", "xls", "txt", "md", "json", "xml", "html"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Csv,
    Xlsx,
    Xls,
    PlainText,
    /// Anything else. Holds the extension with its leading dot (`".docx"`),
    /// or an empty string for files without one.
    Unsupported(String),
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => FileKind::Unsupported(String::new()),
        }
    }

    /// Classify an extension given with or without its leading dot.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "pdf" => FileKind::Pdf,
            "csv" => FileKind::Csv,
            "xlsx" => FileKind::Xlsx,
            "xls" => FileKind::Xls,
            "txt" | "md" | "json" | "xml" | "html" => FileKind::PlainText,
            "" => FileKind::Unsupported(String::new()),
            other => FileKind::Unsupported(format!(".{}", other)),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, FileKind::Unsupported(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Pdf(String),
    #[error("{0}")]
    Table(#[from] TableError),
}

/// The base name shown in banners and error strings.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Text representation of one file. Never fails.
pub fn extract(path: &Path) -> String {
    let name = display_name(path);
    let kind = FileKind::from_path(path);
    debug!(file = %name, ?kind, "extracting");

    let result = match &kind {
        FileKind::Pdf => match extract_pdf(path) {
            Ok(text) => return format!("File: {}\n\n{}", name, text),
            Err(e) => {
                warn!(file = %name, error = %e, "PDF extraction failed");
                return format!(
                    "File: {}\n\nError extracting text from PDF {}: {}",
                    name, name, e
                );
            }
        },
        FileKind::Csv => Table::from_csv_path(path)
            .map(|t| t.report(&name))
            .map_err(ExtractError::from),
        FileKind::Xlsx => read_workbook(path, Table::from_xlsx_path).map(|t| t.report(&name)),
        FileKind::Xls => read_workbook(path, Table::from_xls_path).map(|t| t.report(&name)),
        FileKind::PlainText => read_text_lossy(path).map(|text| format!("File: {}\n\n{}", name, text)),
        FileKind::Unsupported(ext) => {
            return format!("Unsupported file type: {} for file {}", ext, name);
        }
    };

    result.unwrap_or_else(|e| {
        warn!(file = %name, error = %e, "extraction failed");
        format!("Error processing file {}: {}", name, e)
    })
}

/// Page texts, each followed by a newline. Panics inside the PDF parser are
/// caught and reported as errors.
fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let text = catch_parser_panic(|| pdf_extract::extract_text_from_mem(&bytes))
        .map_err(ExtractError::Pdf)?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut out = String::with_capacity(text.len() + 16);
    for page in text.trim_end_matches('\x0C').split('\x0C') {
        out.push_str(page);
        out.push('\n');
    }
    Ok(out)
}

/// Spreadsheet parsing with the same panic guard as PDFs.
fn read_workbook(
    path: &Path,
    parse: fn(&Path) -> Result<Table, TableError>,
) -> Result<Table, ExtractError> {
    catch_parser_panic(|| parse(path))
        .map_err(TableError::Workbook)?
        .map_err(ExtractError::from)
}

/// Run a third-party parser, turning a panic inside it into an error.
fn catch_parser_panic<T>(parse: impl FnOnce() -> T) -> Result<T, String> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(parse))
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "parser panicked".to_string()
    }
}

/// Read a file as UTF-8, dropping undecodable bytes and normalising line
/// endings to `\n`.
fn read_text_lossy(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    if text.contains('\r') {
        text = text.replace("\r\n", "\n").replace('\r', "\n");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn kind_from_extension() {
        assert_eq!(FileKind::from_extension("PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_extension(".csv"), FileKind::Csv);
        assert_eq!(FileKind::from_extension("md"), FileKind::PlainText);
        assert_eq!(
            FileKind::from_extension("docx"),
            FileKind::Unsupported(".docx".to_string())
        );
        for ext in SUPPORTED_EXTENSIONS {
            assert!(FileKind::from_extension(ext).is_supported(), "{}", ext);
        }
    }

    #[test]
    fn plain_text_gets_banner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world").unwrap();
        assert_eq!(extract(&path), "File: a.txt\n\nhello world");
    }

    #[test]
    fn invalid_utf8_bytes_are_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, b"ab\xff\xfecd\r\nef").unwrap();
        assert_eq!(extract(&path), "File: notes.md\n\nabcd\nef");
    }

    #[test]
    fn unsupported_type_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        fs::write(&path, b"whatever").unwrap();
        assert_eq!(
            extract(&path),
            "Unsupported file type: .pptx for file deck.pptx"
        );
    }

    #[test]
    fn corrupt_pdf_reports_inline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4 this is not really a pdf").unwrap();
        let out = extract(&path);
        assert!(out.starts_with("File: broken.pdf\n\nError extracting text from PDF broken.pdf: "));
    }

    #[test]
    fn missing_text_file_reports_inline() {
        let out = extract(Path::new("/nonexistent/dir/gone.txt"));
        assert!(out.starts_with("Error processing file gone.txt: "));
    }

    #[test]
    fn csv_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,x\n2,y\n").unwrap();
        let out = extract(&path);
        assert!(out.starts_with("File: data.csv\nColumns: a, b\nRows: 2\n\nSample data:\n"));
        assert!(out.contains("Summary statistics:\n"));
        assert!(out.contains("count"));
    }

    #[test]
    fn corrupt_xlsx_reports_inline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sheet.xlsx");
        fs::write(&path, b"garbage").unwrap();
        assert!(extract(&path).starts_with("Error processing file sheet.xlsx: "));
    }

    #[test]
    fn corrupt_xls_reports_inline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.xls");
        fs::write(&path, b"garbage").unwrap();
        assert!(extract(&path).starts_with("Error processing file old.xls: "));
    }
}
