//! Corpus assembly: extract every file, join the blocks, split into chunks.
//!
//! ```text
//! paths ──► expand_paths ──► extract (per file) ──► join with delimiter
//!                                                        │
//!                                                        ▼
//!                                           CharacterSplitter ──► Vec<Chunk>
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::CharacterSplitter;
use crate::config::ChunkingConfig;
use crate::extract::extract;
use crate::models::Chunk;

/// Directories skipped when a directory is expanded.
const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("No text content was extracted from the files")]
    NoTextExtracted,
}

/// The visual rule placed between consecutive file blocks.
pub fn block_delimiter() -> String {
    format!("\n\n{}\n\n", "-".repeat(50))
}

/// Replace every directory in `paths` by the files under it, sorted.
/// Plain files (existing or not) are kept as given, in order.
pub fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(path).into_iter().filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
        });
        for entry in walker {
            let entry = entry?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        out.extend(files);
    }
    Ok(out)
}

/// Extract every path and join the blocks in input order.
pub fn assemble_corpus<P: AsRef<Path>>(paths: &[P]) -> String {
    let blocks: Vec<String> = paths.iter().map(|p| extract(p.as_ref())).collect();
    blocks.join(&block_delimiter())
}

/// Assemble `paths` and split the corpus into numbered chunks.
pub fn build_chunks<P: AsRef<Path>>(
    paths: &[P],
    chunking: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let corpus = assemble_corpus(paths);
    let chunks = CharacterSplitter::from_config(chunking).split_chunks(&corpus);

    if chunks.is_empty() {
        warn!(files = paths.len(), "no text extracted");
        return Err(IngestError::NoTextExtracted);
    }

    info!(
        files = paths.len(),
        corpus_chars = corpus.chars().count(),
        chunks = chunks.len(),
        "assembled corpus"
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn single_text_file_is_one_chunk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "hello world").unwrap();

        let chunks = build_chunks(&[path], &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "File: a.txt\n\nhello world");
    }

    #[test]
    fn blocks_are_separated_by_rule() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.md");
        fs::write(&a, "alpha").unwrap();
        fs::write(&b, "beta").unwrap();

        let corpus = assemble_corpus(&[&a, &b]);
        let rule = "-".repeat(50);
        assert_eq!(
            corpus,
            format!("File: a.txt\n\nalpha\n\n{}\n\nFile: b.md\n\nbeta", rule)
        );
    }

    #[test]
    fn input_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "first").unwrap();
        fs::write(&b, "second").unwrap();

        let corpus = assemble_corpus(&[&b, &a]);
        assert!(corpus.find("second").unwrap() < corpus.find("first").unwrap());
    }

    #[test]
    fn empty_file_list_fails() {
        let paths: Vec<PathBuf> = Vec::new();
        assert_eq!(
            build_chunks(&paths, &ChunkingConfig::default()).unwrap_err(),
            IngestError::NoTextExtracted
        );
    }

    #[test]
    fn unsupported_files_still_produce_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.bin");
        fs::write(&path, [0u8, 1, 2]).unwrap();
        let chunks = build_chunks(&[path], &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks[0].text, "Unsupported file type: .bin for file x.bin");
    }

    #[test]
    fn directories_expand_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("sub/c.txt"), "c").unwrap();
        fs::write(dir.path().join(".git/config"), "x").unwrap();

        let files = expand_paths(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub/c.txt"]);
    }

    #[test]
    fn long_corpus_splits_into_many_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.txt");
        let body: String = (0..200).map(|i| format!("line number {}\n", i)).collect();
        fs::write(&path, &body).unwrap();

        let chunks = build_chunks(&[path], &ChunkingConfig::default()).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 1000);
        }
    }
}
