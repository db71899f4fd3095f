//! Query flow assembly and execution.
//!
//! Wires the concrete pipeline:
//!
//! ```text
//! analyze ≫ decompose ≫ retrieve ≫ evaluate ≫ generate ≫ verify ≫ save
//!                           ▲  insufficient_context │
//!                           └──────────────────────┘
//!                                       ▲  invalid_code │ (verify → generate)
//! ```
//!
//! The two back-edges are part of the topology; today every node
//! returns the default action, so they are never taken.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::embedding;
use crate::flow::Flow;
use crate::llm::{self, LanguageModel};
use crate::nodes::{
    AnalyzeNode, DecomposeNode, EvaluateNode, GenerateNode, QueryContext, RetrieveNode, SaveNode,
    VerifyNode,
};
use crate::notebook::NotebookWriter;
use crate::retrieval::Retriever;
use crate::store::{SqliteStore, VectorStore};

/// Build the query flow over the given collaborators.
pub fn build_query_flow(
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<Retriever>,
    writer: Arc<NotebookWriter>,
    top_k: usize,
    temperature: f32,
) -> Flow<QueryContext> {
    let mut flow = Flow::new("analyze");

    flow.add_node("analyze", AnalyzeNode::new(llm.clone()));
    flow.add_node("decompose", DecomposeNode::new(llm.clone()));
    flow.add_node("retrieve", RetrieveNode::new(retriever, top_k));
    flow.add_node("evaluate", EvaluateNode::new(llm.clone()));
    flow.add_node("generate", GenerateNode::new(llm.clone(), temperature));
    flow.add_node("verify", VerifyNode::new(llm));
    flow.add_node("save", SaveNode::new(writer));

    flow.chain("analyze", "decompose");
    flow.chain("decompose", "retrieve");
    flow.chain("retrieve", "evaluate");
    flow.chain("evaluate", "generate");
    flow.chain("generate", "verify");
    flow.chain("verify", "save");
    // Retry loops, driven entirely by postprocess labels.
    flow.branch("evaluate", "insufficient_context", "retrieve");
    flow.branch("verify", "invalid_code", "generate");

    flow
}

/// Run one query through the flow and report the outcome.
pub async fn run_query(config: &Config, query: &str) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.store).await?);
    if store.count().await? == 0 {
        eprintln!(
            "warning: collection '{}' is empty, run `cadsmith ingest` first",
            config.store.collection
        );
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let model = llm::create_language_model(&config.llm)?;
    let retriever = Arc::new(Retriever::new(store.clone(), embedder));
    let writer = Arc::new(NotebookWriter::new(config.notebook.path.clone()));

    let flow = build_query_flow(
        model,
        retriever,
        writer,
        config.retrieval.top_k,
        config.llm.temperature,
    );

    let mut ctx = QueryContext::new(query);
    flow.run(&mut ctx)
        .await
        .with_context(|| format!("query flow failed for: {}", query))?;

    println!("query: {}", query);
    if !ctx.sources.is_empty() {
        println!("  sources:");
        for source in &ctx.sources {
            println!("    {}", source);
        }
    }
    if let Some(cells) = ctx.notebook_cells {
        println!(
            "  notebook: {} ({} cells)",
            config.notebook.path.display(),
            cells
        );
    }
    println!("ok");

    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, HashingEmbedder};
    use crate::models::Chunk;
    use crate::store::InMemoryStore;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers each prompt by keyword, recording every call.
    struct ScriptedLm {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedLm {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl crate::llm::LanguageModel for ScriptedLm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, prompt: &str, _temperature: f32) -> Result<String> {
            self.calls.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("You are triaging") {
                Ok("A hexagonal nut, 0.25 inch across flats.".to_string())
            } else if prompt.starts_with("Decompose") {
                Ok("1. Sketch hexagon\n2. Extrude\n3. Cut hole".to_string())
            } else if prompt.starts_with("Rate how well") {
                Ok("sufficient: polygon and hole are both covered".to_string())
            } else if prompt.starts_with("Write Python CadQuery") {
                Ok("```python\nimport cadquery as cq\nresult = cq.Workplane(\"XY\").polygon(6, 0.25).extrude(0.125)\n```".to_string())
            } else if prompt.starts_with("Review this CadQuery") {
                Ok("valid".to_string())
            } else {
                Err(anyhow!("unexpected prompt: {}", prompt))
            }
        }
    }

    async fn seeded_retriever() -> Arc<Retriever> {
        let embedder = Arc::new(HashingEmbedder::new(128));
        let store = Arc::new(InMemoryStore::new());
        let chunks = vec![
            Chunk {
                id: "sheet.pdf:1:0".to_string(),
                content: "polygon(nSides, diameter) sketches a regular polygon".to_string(),
                source: "sheet.pdf".to_string(),
                page: Some(1),
            },
            Chunk {
                id: "sheet.pdf:2:0".to_string(),
                content: "hole(diameter) cuts a through hole".to_string(),
                source: "sheet.pdf".to_string(),
                page: Some(2),
            },
        ];
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed(&texts).await.unwrap();
        store.add(&chunks, &vectors, "hashing").await.unwrap();
        Arc::new(Retriever::new(store, embedder))
    }

    #[tokio::test]
    async fn test_full_flow_populates_context_and_notebook() {
        let tmp = TempDir::new().unwrap();
        let notebook_path = tmp.path().join("result.ipynb");

        let llm = Arc::new(ScriptedLm::new());
        let retriever = seeded_retriever().await;
        let writer = Arc::new(NotebookWriter::new(notebook_path.clone()));

        let flow = build_query_flow(llm.clone(), retriever, writer, 2, 0.2);
        let mut ctx = QueryContext::new("make a hexagonal nut with a polygon sketch and a hole");
        flow.run(&mut ctx).await.unwrap();

        assert!(ctx.analysis.as_deref().unwrap().contains("hexagonal nut"));
        assert!(ctx.steps.as_deref().unwrap().contains("Extrude"));
        assert_eq!(ctx.sources.len(), 2);
        assert!(ctx.context.contains("polygon"));
        assert!(ctx.relevance.as_deref().unwrap().starts_with("sufficient"));
        assert!(ctx.code_response.as_deref().unwrap().contains("result ="));
        assert_eq!(ctx.verification.as_deref(), Some("valid"));
        assert_eq!(ctx.notebook_cells, Some(1));

        // Five LLM calls: analyze, decompose, evaluate, generate, verify.
        assert_eq!(llm.calls.lock().unwrap().len(), 5);

        let notebook: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&notebook_path).unwrap()).unwrap();
        assert_eq!(notebook["cells"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_llm_fault_aborts_without_artifact() {
        struct BrokenLm;

        #[async_trait]
        impl crate::llm::LanguageModel for BrokenLm {
            fn model_name(&self) -> &str {
                "broken"
            }
            async fn invoke(&self, _prompt: &str, _temperature: f32) -> Result<String> {
                Err(anyhow!("model endpoint unreachable"))
            }
        }

        let tmp = TempDir::new().unwrap();
        let notebook_path = tmp.path().join("result.ipynb");

        let retriever = seeded_retriever().await;
        let writer = Arc::new(NotebookWriter::new(notebook_path.clone()));
        let flow = build_query_flow(Arc::new(BrokenLm), retriever, writer, 2, 0.2);

        let mut ctx = QueryContext::new("anything");
        assert!(flow.run(&mut ctx).await.is_err());
        assert!(!notebook_path.exists(), "no artifact on aborted run");
    }
}
