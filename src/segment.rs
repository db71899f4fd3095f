//! Fence-aware document splitting.
//!
//! Splits document text into chunks bounded by a per-kind window size
//! (prose vs code, see [`ChunkingConfig`]), carrying a configurable
//! overlap from the tail of each chunk into the next. Separators are
//! tried coarsest-first (blank line, newline, space), and a toggle on
//! ``` lines keeps fenced code blocks intact: no chunk boundary is ever
//! placed between a fence's opening and closing markers.

use crate::config::ChunkingConfig;
use crate::models::{ContentKind, Document};

/// Split every document into bounded chunks, preserving provenance.
pub fn split_documents(docs: &[Document], config: &ChunkingConfig) -> Vec<Document> {
    let mut out = Vec::new();
    for doc in docs {
        let (size, overlap) = match doc.kind {
            ContentKind::Prose => (config.prose_chunk_size, config.prose_overlap),
            ContentKind::Code => (config.code_chunk_size, config.code_overlap),
        };
        for piece in split_text(&doc.content, size, overlap) {
            out.push(Document {
                content: piece,
                source: doc.source.clone(),
                page: doc.page,
                kind: doc.kind,
            });
        }
    }
    out
}

/// Split `text` into pieces of at most `chunk_size` characters. Fenced
/// blocks may exceed it; they are never split.
fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_code_block = false;

    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("```") {
            // Fence markers append unconditionally so a boundary can
            // never separate them from the block they delimit.
            current.push_str(line);
            in_code_block = !in_code_block;
            continue;
        }

        if in_code_block {
            current.push_str(line);
            continue;
        }

        if line.len() > chunk_size {
            flush(&mut chunks, &mut current);
            current = hard_split(line, chunk_size, &mut chunks);
            continue;
        }

        if current.len() + line.len() > chunk_size && !current.is_empty() {
            let tail = overlap_tail(&current, overlap);
            flush(&mut chunks, &mut current);
            current = tail;
        }
        current.push_str(line);
    }

    flush(&mut chunks, &mut current);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        chunks.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Split a single oversized line at space boundaries. All complete
/// pieces are pushed; the remainder is returned as the new accumulator.
fn hard_split(line: &str, chunk_size: usize, chunks: &mut Vec<String>) -> String {
    let mut remaining = line;
    while remaining.len() > chunk_size {
        let mut split_at = chunk_size;
        while !remaining.is_char_boundary(split_at) {
            split_at -= 1;
        }
        if split_at == 0 {
            // A single char wider than the window; take it whole.
            split_at = remaining
                .chars()
                .next()
                .map(|c| c.len_utf8())
                .unwrap_or(remaining.len());
        }
        let split_at = remaining[..split_at]
            .rfind(' ')
            .map(|pos| pos + 1)
            .unwrap_or(split_at);
        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }
    remaining.to_string()
}

/// The trailing `overlap` characters of the previous chunk, aligned to a
/// line (or space) boundary. An overlap that would re-open a fence is
/// dropped entirely.
fn overlap_tail(prev: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let mut start = prev.len().saturating_sub(overlap);
    while start < prev.len() && !prev.is_char_boundary(start) {
        start += 1;
    }
    let tail = &prev[start..];
    let tail = match tail.find('\n') {
        Some(i) => &tail[i + 1..],
        None => match tail.find(' ') {
            Some(i) => &tail[i + 1..],
            None => tail,
        },
    };
    if tail.contains("```") {
        return String::new();
    }
    tail.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(prose: (usize, usize), code: (usize, usize)) -> ChunkingConfig {
        ChunkingConfig {
            prose_chunk_size: prose.0,
            prose_overlap: prose.1,
            code_chunk_size: code.0,
            code_overlap: code.1,
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("A short paragraph.", 500, 100);
        assert_eq!(chunks, vec!["A short paragraph.".to_string()]);
    }

    #[test]
    fn test_chunks_respect_size_bound() {
        let text = (0..60)
            .map(|i| format!("line number {:02}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text(&text, 120, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 120, "chunk over budget: {:?}", chunk);
        }
    }

    #[test]
    fn test_never_splits_inside_fence() {
        let mut text = String::from("Intro paragraph before the snippet.\n");
        text.push_str("```python\n");
        for i in 0..40 {
            text.push_str(&format!("step_{} = wp.extrude({})\n", i, i));
        }
        text.push_str("```\n");
        text.push_str("Closing remark after the snippet.\n");

        let chunks = split_text(&text, 200, 50);
        for chunk in &chunks {
            let fences = chunk.matches("```").count();
            assert!(
                fences % 2 == 0,
                "fence marker split across chunks: {:?}",
                chunk
            );
        }
        // The whole fenced block lands in one chunk.
        let holder = chunks
            .iter()
            .find(|c| c.contains("step_0"))
            .expect("fenced content missing");
        assert!(holder.contains("step_39"));
    }

    #[test]
    fn test_overlap_carries_tail_forward() {
        let text = (0..30)
            .map(|i| format!("sentence {:02}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_text(&text, 100, 40);
        assert!(chunks.len() > 1);
        let last_line_of_first = chunks[0].lines().last().unwrap();
        assert!(
            chunks[1].contains(last_line_of_first),
            "expected {:?} to reappear at the start of {:?}",
            last_line_of_first,
            chunks[1]
        );
    }

    #[test]
    fn test_oversized_line_hard_splits_at_spaces() {
        let text = "word ".repeat(100);
        let chunks = split_text(&text, 80, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 80);
        }
    }

    #[test]
    fn test_code_documents_use_code_window() {
        let body = (0..20)
            .map(|i| format!("call_{}()", i))
            .collect::<Vec<_>>()
            .join("\n");
        let docs = vec![
            Document::new(body.clone(), "prose.md", None),
            Document::code(body, "snippets.py", None),
        ];
        // Prose window comfortably fits everything; code window does not.
        let split = split_documents(&docs, &config((4000, 0), (60, 10)));
        let prose_chunks = split.iter().filter(|d| d.source == "prose.md").count();
        let code_chunks = split.iter().filter(|d| d.source == "snippets.py").count();
        assert_eq!(prose_chunks, 1);
        assert!(code_chunks > 1);
    }

    #[test]
    fn test_provenance_preserved() {
        let docs = vec![Document::new("text ".repeat(50), "a.pdf", Some(2))];
        let split = split_documents(&docs, &config((100, 20), (100, 20)));
        assert!(split.len() > 1);
        for piece in &split {
            assert_eq!(piece.source, "a.pdf");
            assert_eq!(piece.page, Some(2));
        }
    }
}
