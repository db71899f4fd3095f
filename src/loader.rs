//! Filesystem document loading.
//!
//! Walks the configured document root, filters by include/exclude globs,
//! and dispatches on file extension: Markdown files become a single
//! document, PDFs go through structure-aware extraction, and Python
//! sources are split into one document per top-level definition.
//!
//! Files are enumerated in sorted path order so downstream chunk IDs are
//! stable across runs. Unreadable or unparseable files are skipped and
//! reported, never fatal; an empty result after the full walk is.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::extract;
use crate::models::Document;

/// Outcome of a document-root walk.
#[derive(Debug)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub files_loaded: usize,
    /// `(source, reason)` for every file that could not be read or parsed.
    pub files_skipped: Vec<(String, String)>,
}

pub fn load_documents(config: &DocumentsConfig) -> Result<LoadReport> {
    let root = &config.root;
    if !root.exists() {
        bail!("Document root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push((path.to_path_buf(), rel_str));
    }

    // Sort for deterministic ordering; chunk IDs depend on it.
    paths.sort_by(|a, b| a.1.cmp(&b.1));

    let mut documents = Vec::new();
    let mut files_loaded = 0usize;
    let mut files_skipped = Vec::new();

    for (path, rel_str) in paths {
        match load_file(&path, &rel_str) {
            Ok(mut docs) => {
                files_loaded += 1;
                documents.append(&mut docs);
            }
            Err(e) => {
                eprintln!("skipping {}: {}", rel_str, e);
                files_skipped.push((rel_str, e.to_string()));
            }
        }
    }

    if documents.is_empty() {
        bail!(
            "No supported documents found under {}. Only .md, .pdf, and .py are supported.",
            root.display()
        );
    }

    Ok(LoadReport {
        documents,
        files_loaded,
        files_skipped,
    })
}

fn load_file(path: &Path, source: &str) -> Result<Vec<Document>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    match extension {
        "md" => {
            let content = std::fs::read_to_string(path)?;
            Ok(vec![Document::new(content, source, None)])
        }
        "pdf" => {
            let bytes = std::fs::read(path)?;
            Ok(extract::extract_pdf_documents(&bytes, source)?)
        }
        "py" => {
            let content = std::fs::read_to_string(path)?;
            Ok(split_python_source(&content, source))
        }
        other => bail!("unsupported extension: .{}", other),
    }
}

/// Split a Python module into one document per top-level definition.
///
/// The module preamble (imports, constants, docstring) becomes the first
/// document; each `def`/`class` at column 0 starts a new one. Decorator
/// lines stay attached to the definition they annotate.
fn split_python_source(content: &str, source: &str) -> Vec<Document> {
    let is_boundary = |line: &str| {
        line.starts_with("def ")
            || line.starts_with("async def ")
            || line.starts_with("class ")
            || line.starts_with('@')
    };
    // A buffer holding nothing but decorators is a pending header, not a
    // finished segment.
    let only_decorators = |buf: &str| {
        buf.lines()
            .all(|l| l.trim().is_empty() || l.starts_with('@'))
    };

    let mut docs = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        if is_boundary(line) && !current.trim().is_empty() && !only_decorators(&current) {
            docs.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.trim().is_empty() {
        docs.push(current);
    }

    docs.into_iter()
        .map(|text| Document::code(text.trim_end().to_string(), source, None))
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentKind;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn docs_config(root: PathBuf) -> DocumentsConfig {
        DocumentsConfig {
            root,
            include_globs: vec![
                "**/*.md".to_string(),
                "**/*.pdf".to_string(),
                "**/*.py".to_string(),
            ],
            exclude_globs: vec![],
        }
    }

    #[test]
    fn test_markdown_is_single_document() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("guide.md"), "# Guide\n\nSome prose.").unwrap();

        let report = load_documents(&docs_config(tmp.path().to_path_buf())).unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].source, "guide.md");
        assert_eq!(report.documents[0].page, None);
        assert_eq!(report.documents[0].kind, ContentKind::Prose);
    }

    #[test]
    fn test_empty_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_documents(&docs_config(tmp.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("No supported documents"));
    }

    #[test]
    fn test_corrupt_pdf_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(tmp.path().join("ok.md"), "still here").unwrap();

        let report = load_documents(&docs_config(tmp.path().to_path_buf())).unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.files_skipped.len(), 1);
        assert_eq!(report.files_skipped[0].0, "broken.pdf");
    }

    #[test]
    fn test_files_load_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.md"), "second").unwrap();
        fs::write(tmp.path().join("a.md"), "first").unwrap();

        let report = load_documents(&docs_config(tmp.path().to_path_buf())).unwrap();
        let sources: Vec<&str> = report.documents.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_python_splits_on_top_level_defs() {
        let src = "import cadquery as cq\n\nSIZE = 4\n\ndef plate():\n    return cq.Workplane().box(SIZE, SIZE, 1)\n\n@cache\ndef lid():\n    return plate().shell(0.1)\n";
        let docs = split_python_source(src, "parts.py");
        assert_eq!(docs.len(), 3);
        assert!(docs[0].content.starts_with("import cadquery"));
        assert!(docs[1].content.starts_with("def plate"));
        assert!(docs[2].content.starts_with("@cache\ndef lid"));
        assert!(docs.iter().all(|d| d.kind == ContentKind::Code));
    }
}
