//! Notebook artifact writer.
//!
//! Generated code is persisted as cells of a Jupyter notebook
//! (nbformat 4). Every successful query run appends exactly one code
//! cell: the query rendered as comment lines, the cleaned code, and a
//! `display(result)` invocation so the shape renders when the cell is
//! executed. The file is rewritten whole on every append.
//!
//! A notebook that exists but fails to parse is treated as corrupt and
//! replaced with a fresh empty one rather than failing the run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level nbformat-4 document. Cells are kept as raw JSON values so
/// existing markdown/raw cells survive a round-trip untouched.
#[derive(Debug, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub cells: Vec<serde_json::Value>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default = "nbformat_major")]
    pub nbformat: u32,
    #[serde(default = "nbformat_minor")]
    pub nbformat_minor: u32,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}
fn nbformat_major() -> u32 {
    4
}
fn nbformat_minor() -> u32 {
    5
}

impl Notebook {
    fn empty() -> Self {
        Self {
            cells: Vec::new(),
            metadata: empty_object(),
            nbformat: nbformat_major(),
            nbformat_minor: nbformat_minor(),
        }
    }
}

/// Appends generated code cells to a notebook file.
pub struct NotebookWriter {
    path: PathBuf,
}

impl NotebookWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one code cell for `(query, code)` and rewrite the file.
    /// Returns the resulting cell count. Calling twice with the same
    /// input appends two cells; no deduplication at this layer.
    pub fn append(&self, query: &str, code: &str) -> Result<usize> {
        let mut notebook = self.load_or_fresh();

        let cleaned = strip_code_fences(code);

        let mut body = String::new();
        for line in query.lines() {
            body.push_str("# ");
            body.push_str(line);
            body.push('\n');
        }
        body.push_str(&cleaned);
        body.push_str("\ndisplay(result)");

        notebook.cells.push(code_cell(&body));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&notebook)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write notebook: {}", self.path.display()))?;

        Ok(notebook.cells.len())
    }

    fn load_or_fresh(&self) -> Notebook {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|_| {
                eprintln!(
                    "notebook {} is not valid nbformat, starting fresh",
                    self.path.display()
                );
                Notebook::empty()
            }),
            Err(_) => Notebook::empty(),
        }
    }
}

/// Drop Markdown fence markers, keeping the code between them.
fn strip_code_fences(code: &str) -> String {
    code.replace("```python", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Build an nbformat-4 code cell. `source` is the conventional list of
/// lines, each keeping its trailing newline.
fn code_cell(body: &str) -> serde_json::Value {
    let source: Vec<&str> = body.split_inclusive('\n').collect();
    serde_json::json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {},
        "outputs": [],
        "source": source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(tmp: &TempDir) -> NotebookWriter {
        NotebookWriter::new(tmp.path().join("result.ipynb"))
    }

    fn read_notebook(writer: &NotebookWriter) -> Notebook {
        let text = std::fs::read_to_string(writer.path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_two_appends_yield_two_cells_in_order() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        writer.append("make a box", "```python\nfirst = 1\n```").unwrap();
        let count = writer.append("make a lid", "second = 2").unwrap();
        assert_eq!(count, 2);

        let notebook = read_notebook(&writer);
        assert_eq!(notebook.cells.len(), 2);
        let first = notebook.cells[0]["source"].to_string();
        let second = notebook.cells[1]["source"].to_string();
        assert!(first.contains("first = 1"));
        assert!(second.contains("second = 2"));
    }

    #[test]
    fn test_cell_contains_comment_code_and_display() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        writer
            .append("hex nut\n0.25 inch", "```python\nresult = nut()\n```")
            .unwrap();

        let notebook = read_notebook(&writer);
        let source = notebook.cells[0]["source"].to_string();
        assert!(source.contains("# hex nut"));
        assert!(source.contains("# 0.25 inch"));
        assert!(source.contains("result = nut()"));
        assert!(source.contains("display(result)"));
        assert!(!source.contains("```"));
    }

    #[test]
    fn test_corrupt_notebook_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);
        std::fs::write(writer.path(), "{ not json").unwrap();

        let count = writer.append("q", "result = 1").unwrap();
        assert_eq!(count, 1);

        let notebook = read_notebook(&writer);
        assert_eq!(notebook.nbformat, 4);
        assert_eq!(notebook.cells.len(), 1);
    }

    #[test]
    fn test_existing_cells_are_preserved() {
        let tmp = TempDir::new().unwrap();
        let writer = writer(&tmp);

        writer.append("first", "a = 1").unwrap();
        writer.append("second", "b = 2").unwrap();
        writer.append("third", "c = 3").unwrap();

        let notebook = read_notebook(&writer);
        assert_eq!(notebook.cells.len(), 3);
        assert!(notebook.cells[0]["source"].to_string().contains("a = 1"));
        assert!(notebook.cells[2]["source"].to_string().contains("c = 3"));
    }
}
