//! Concrete pipeline nodes for the query flow.
//!
//! Each node is one step of the retrieval/generation pipeline over a
//! shared [`QueryContext`]: the LLM-backed nodes build a task prompt in
//! `prepare`, make a single `invoke` call in `execute`, and record the
//! response in `postprocess`; the retrieve node goes through the
//! [`Retriever`] and the save node through the [`NotebookWriter`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::flow::{Node, DEFAULT_ACTION};
use crate::llm::LanguageModel;
use crate::models::ScoredChunk;
use crate::notebook::NotebookWriter;
use crate::retrieval::Retriever;

/// Shared mutable state for one query flow run.
///
/// Key ownership: `query` is set by the caller; `analysis` is written
/// by Analyze, `steps` by Decompose, `context`/`sources` by Retrieve,
/// `relevance` by Evaluate, `code_response` by Generate, `verification`
/// by Verify, and `notebook_cells` by Save. Nodes read only keys
/// written earlier in the pipeline.
#[derive(Debug, Default)]
pub struct QueryContext {
    pub query: String,
    pub analysis: Option<String>,
    pub steps: Option<String>,
    pub context: String,
    pub sources: Vec<String>,
    pub relevance: Option<String>,
    pub code_response: Option<String>,
    pub verification: Option<String>,
    pub notebook_cells: Option<usize>,
}

impl QueryContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }
}

const ANALYZE_TEMPERATURE: f32 = 0.0;
const DECOMPOSE_TEMPERATURE: f32 = 0.2;
const EVALUATE_TEMPERATURE: f32 = 0.0;
const VERIFY_TEMPERATURE: f32 = 0.0;

fn input_str(input: &Value) -> Result<&str> {
    input
        .as_str()
        .ok_or_else(|| anyhow!("expected string input, got: {}", input))
}

fn result_string(result: Value) -> Result<String> {
    match result {
        Value::String(s) => Ok(s),
        other => Err(anyhow!("expected string result, got: {}", other)),
    }
}

// ============ Analyze ============

/// Classifies the request so later prompts know what kind of geometry
/// and parameters to expect.
pub struct AnalyzeNode {
    llm: Arc<dyn LanguageModel>,
}

impl AnalyzeNode {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<QueryContext> for AnalyzeNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let prompt = format!(
            "You are triaging a CAD modeling request before code generation.\n\
             Identify the kind of part being asked for, the geometric primitives \
             involved, and every dimension or parameter mentioned (including \
             units). Answer in a short factual summary, no code.\n\n\
             Request:\n{}",
            ctx.query
        );
        Ok(Value::String(prompt))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let response = self.llm.invoke(input_str(&input)?, ANALYZE_TEMPERATURE).await?;
        Ok(Value::String(response))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        ctx.analysis = Some(result_string(result)?);
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Decompose ============

/// Breaks the request into ordered construction steps.
pub struct DecomposeNode {
    llm: Arc<dyn LanguageModel>,
}

impl DecomposeNode {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<QueryContext> for DecomposeNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let analysis = ctx.analysis.as_deref().unwrap_or("");
        let prompt = format!(
            "Decompose this CAD modeling request into a short numbered list of \
             construction steps (workplane, sketch, extrude, cut, finish). \
             Keep each step to one line.\n\n\
             Request:\n{}\n\nAnalysis:\n{}",
            ctx.query, analysis
        );
        Ok(Value::String(prompt))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let response = self
            .llm
            .invoke(input_str(&input)?, DECOMPOSE_TEMPERATURE)
            .await?;
        Ok(Value::String(response))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        ctx.steps = Some(result_string(result)?);
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Retrieve ============

/// Pulls the most relevant reference chunks for the request and the
/// decomposed steps, and folds them into the shared context.
pub struct RetrieveNode {
    retriever: Arc<Retriever>,
    top_k: usize,
}

impl RetrieveNode {
    pub fn new(retriever: Arc<Retriever>, top_k: usize) -> Self {
        Self { retriever, top_k }
    }
}

fn format_reference(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .map(|hit| format!("[{}]\n{}", hit.chunk.id, hit.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[async_trait]
impl Node<QueryContext> for RetrieveNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        // Steps sharpen the lookup: "polygon", "extrude", "hole" pull in
        // the right cheatsheet sections even when the request itself is
        // phrased loosely.
        let search_text = match &ctx.steps {
            Some(steps) => format!("{}\n{}", ctx.query, steps),
            None => ctx.query.clone(),
        };
        Ok(Value::String(search_text))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let hits = self.retriever.retrieve(input_str(&input)?, self.top_k).await?;
        let sources: Vec<String> = hits.iter().map(|h| h.chunk.id.clone()).collect();
        Ok(json!({
            "context": format_reference(&hits),
            "sources": sources,
        }))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        ctx.context = result["context"].as_str().unwrap_or_default().to_string();
        ctx.sources = result["sources"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Evaluate ============

/// Scores how well the retrieved context covers the request.
pub struct EvaluateNode {
    llm: Arc<dyn LanguageModel>,
}

impl EvaluateNode {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<QueryContext> for EvaluateNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let prompt = format!(
            "Rate how well the reference material below covers what is needed \
             to write CadQuery code for the request. Reply with a rating \
             (sufficient / partial / insufficient) and one sentence of \
             justification.\n\n\
             Request:\n{}\n\nReference material:\n{}",
            ctx.query, ctx.context
        );
        Ok(Value::String(prompt))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let response = self
            .llm
            .invoke(input_str(&input)?, EVALUATE_TEMPERATURE)
            .await?;
        Ok(Value::String(response))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        // The verdict is recorded but not yet branched on; the
        // "insufficient_context" edge back to retrieve stays dormant
        // until this returns it.
        ctx.relevance = Some(result_string(result)?);
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Generate ============

/// Writes the CadQuery code for the request from the retrieved context.
pub struct GenerateNode {
    llm: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl GenerateNode {
    pub fn new(llm: Arc<dyn LanguageModel>, temperature: f32) -> Self {
        Self { llm, temperature }
    }
}

#[async_trait]
impl Node<QueryContext> for GenerateNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let steps = ctx.steps.as_deref().unwrap_or("");
        let prompt = format!(
            "Write Python CadQuery code for the request below. Follow the \
             construction steps, prefer API calls shown in the reference \
             material, and assign the finished solid to a variable named \
             `result`. Return only a single fenced python code block.\n\n\
             Request:\n{}\n\nConstruction steps:\n{}\n\nReference material:\n{}",
            ctx.query, steps, ctx.context
        );
        Ok(Value::String(prompt))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let response = self.llm.invoke(input_str(&input)?, self.temperature).await?;
        Ok(Value::String(response))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        ctx.code_response = Some(result_string(result)?);
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Verify ============

/// Checks the generated code for obvious validity problems.
pub struct VerifyNode {
    llm: Arc<dyn LanguageModel>,
}

impl VerifyNode {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node<QueryContext> for VerifyNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let code = ctx
            .code_response
            .as_deref()
            .ok_or_else(|| anyhow!("no generated code to verify"))?;
        let prompt = format!(
            "Review this CadQuery code. Check that it is syntactically valid \
             Python, calls only plausible CadQuery API, and assigns the final \
             shape to `result`. Reply with a verdict (valid / invalid) and any \
             problems found.\n\n{}",
            code
        );
        Ok(Value::String(prompt))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let response = self.llm.invoke(input_str(&input)?, VERIFY_TEMPERATURE).await?;
        Ok(Value::String(response))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        // Same dormant-edge arrangement as Evaluate: "invalid_code"
        // routes back to generate once this inspects the verdict.
        ctx.verification = Some(result_string(result)?);
        Ok(DEFAULT_ACTION.to_string())
    }
}

// ============ Save ============

/// Appends the generated code to the notebook artifact.
pub struct SaveNode {
    writer: Arc<NotebookWriter>,
}

impl SaveNode {
    pub fn new(writer: Arc<NotebookWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Node<QueryContext> for SaveNode {
    fn prepare(&self, ctx: &QueryContext) -> Result<Value> {
        let code = ctx
            .code_response
            .as_deref()
            .ok_or_else(|| anyhow!("no code response to save"))?;
        Ok(json!({ "query": ctx.query, "code": code }))
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = input["query"]
            .as_str()
            .ok_or_else(|| anyhow!("save input missing query"))?;
        let code = input["code"]
            .as_str()
            .ok_or_else(|| anyhow!("save input missing code"))?;
        let cells = self.writer.append(query, code)?;
        Ok(json!({ "cells": cells }))
    }

    fn postprocess(&self, ctx: &mut QueryContext, _input: Value, result: Value) -> Result<String> {
        ctx.notebook_cells = result["cells"].as_u64().map(|n| n as usize);
        Ok(DEFAULT_ACTION.to_string())
    }
}
