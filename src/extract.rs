//! Structure-aware PDF extraction.
//!
//! PDF pages are pulled out as text (via `pdf-extract`), scanned block by
//! block, and each block is classified as code or prose. Prose blocks are
//! buffered and merged with the next code block into one [`Document`] so
//! the explanatory text stays attached to the snippet it describes;
//! trailing prose with no following code becomes its own document.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Document;

/// Extraction error. The loader skips the file and reports it in the
/// ingest summary rather than aborting the run.
#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

static CODE_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

/// A block is code when it is a fenced run (``` ... ```) or starts an
/// indented (>= 4 spaces) line run.
pub fn is_code_block(text: &str) -> bool {
    let re = CODE_BLOCK_RE.get_or_init(|| {
        Regex::new(r"(?s)^(```.*?```|(?:[ \t]{4}.*(?:\n|\r?))+)").unwrap()
    });
    re.is_match(text)
}

/// Extract one or more documents from raw PDF bytes.
pub fn extract_pdf_documents(bytes: &[u8], source: &str) -> Result<Vec<Document>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(merge_page_blocks(&pages, source))
}

/// Scan page blocks in order, merging buffered prose into the next code
/// block. The buffer deliberately carries across page boundaries: a
/// description at the bottom of one page belongs to the snippet at the
/// top of the next.
fn merge_page_blocks(pages: &[String], source: &str) -> Vec<Document> {
    let mut merged = Vec::new();
    let mut buffer = String::new();
    let mut buffer_page: Option<i64> = None;

    for (page_num, page_text) in pages.iter().enumerate() {
        let page = Some(page_num as i64 + 1);

        for block in page_text.split("\n\n") {
            let text = block.trim();
            if text.is_empty() {
                continue;
            }

            if is_code_block(text) {
                if buffer.is_empty() {
                    merged.push(Document::code(text, source, page));
                } else {
                    let content = format!("{}\n\n{}", buffer, text);
                    merged.push(Document::code(content, source, page));
                    buffer.clear();
                }
            } else {
                if !buffer.is_empty() {
                    buffer.push_str("\n\n");
                }
                buffer.push_str(text);
                buffer_page = page;
            }
        }
    }

    if !buffer.is_empty() {
        merged.push(Document::new(buffer, source, buffer_page));
    }

    merged
}
