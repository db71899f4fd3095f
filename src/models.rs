//! Core data models used throughout cadsmith.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipelines.

/// How a loader classified a document's content.
///
/// The segmenter picks its window size from this: code benefits from a
/// wider overlap so a retrieved chunk carries enough surrounding calls
/// to be reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Prose,
    Code,
}

/// A unit of loaded text with its provenance, before ID assignment.
///
/// Produced by the loaders (one per Markdown file, one per merged PDF
/// block group, one per top-level Python definition) and again by the
/// segmenter (one per split piece). `(source, page)` identify where the
/// text came from.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    /// Path of the originating file, relative to the document root.
    pub source: String,
    /// 1-based page number for paginated formats, `None` otherwise.
    pub page: Option<i64>,
    pub kind: ContentKind,
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: Option<i64>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page,
            kind: ContentKind::Prose,
        }
    }

    pub fn code(content: impl Into<String>, source: impl Into<String>, page: Option<i64>) -> Self {
        Self {
            kind: ContentKind::Code,
            ..Self::new(content, source, page)
        }
    }
}

/// A segmented document piece with its stable identity.
///
/// The `id` has the form `source:page:index` and is deterministic given
/// the enumeration order of the chunks (see [`crate::identity`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub source: String,
    pub page: Option<i64>,
}

/// A chunk returned from similarity search with its relevance score.
///
/// Higher score = more similar. The retrieval adapter guarantees
/// descending order.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Token used in chunk IDs when a document has no page number.
pub const NO_PAGE_TOKEN: &str = "none";

/// Render the `source:page` prefix shared by all chunks of one page.
pub fn page_key(source: &str, page: Option<i64>) -> String {
    match page {
        Some(p) => format!("{}:{}", source, p),
        None => format!("{}:{}", source, NO_PAGE_TOKEN),
    }
}
