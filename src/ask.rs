//! Query commands: `ask`, `retrieve` and the `chat` REPL.
//!
//! Each command builds one [`QueryPipeline`] from config and reuses it for
//! every question the process handles.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use grounded_core::answer::Answerer;
use grounded_core::pipeline::{Answer, QueryPipeline, Retrieval};
use grounded_core::rerank::RerankStage;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::llm::{create_answerer, DisabledAnswerer};
use crate::migrate;
use crate::rerank::create_reranker;
use crate::sqlite_store::SqliteStore;

const PROMPT: &str = ">> ";

/// Build the full pipeline, answerer included.
pub async fn build_pipeline(config: &Config) -> Result<QueryPipeline> {
    let answerer = create_answerer(&config.llm)?;
    build_with_answerer(config, answerer).await
}

/// Build a pipeline for retrieval only; the LLM is never contacted.
pub async fn build_retriever(config: &Config) -> Result<QueryPipeline> {
    build_with_answerer(config, Arc::new(DisabledAnswerer)).await
}

async fn build_with_answerer(
    config: &Config,
    answerer: Arc<dyn Answerer>,
) -> Result<QueryPipeline> {
    if !config.embedding.is_enabled() {
        bail!("queries require an embedding provider; set [embedding].provider in the config");
    }
    let embedder = create_embedder(&config.embedding)?;

    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = Arc::new(SqliteStore::new(pool));

    let reranker = RerankStage::new(create_reranker(&config.reranker));

    Ok(QueryPipeline::new(
        embedder,
        store,
        reranker,
        answerer,
        config.retrieval.pipeline_params(),
    ))
}

pub async fn run_ask(config: &Config, question: &str, as_json: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let answer = pipeline.answer(question).await?;
    if as_json {
        println!("{}", answer_json(&answer)?);
    } else {
        println!("{}", format_answer(&answer));
    }
    Ok(())
}

pub async fn run_retrieve(config: &Config, question: &str) -> Result<()> {
    let pipeline = build_retriever(config).await?;
    let retrieval = pipeline.retrieve(question).await?;
    println!("{}", format_retrieval(&retrieval));
    Ok(())
}

pub async fn run_chat(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    println!("Ask a question about the indexed documents. Type 'exit' to quit.");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    chat_loop(&pipeline, stdin, &mut stdout).await
}

/// Read questions line by line until `exit`, `quit` or end of input.
///
/// A failed question is reported and the loop keeps going.
pub async fn chat_loop<R, W>(pipeline: &QueryPipeline, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match pipeline.answer(question).await {
            Ok(answer) => writeln!(out, "{}\n", format_answer(&answer))?,
            Err(e) => writeln!(out, "error: {}\n", e)?,
        }
    }
    Ok(())
}

/// Answer text followed by a `Sources:` list when there are citations.
pub fn format_answer(answer: &Answer) -> String {
    let mut out = answer.text.clone();
    if !answer.citations.is_empty() {
        out.push_str("\n\nSources:");
        for source in &answer.citations {
            out.push_str("\n- ");
            out.push_str(source);
        }
    }
    out
}

pub fn answer_json(answer: &Answer) -> Result<String> {
    let value = json!({
        "answer": answer.text,
        "citations": answer.citations,
        "outcome": answer.outcome,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn format_retrieval(retrieval: &Retrieval) -> String {
    if retrieval.chunks.is_empty() {
        return "No context above the score threshold.".to_string();
    }
    let mut out = retrieval.context.text.clone();
    out.push_str(&format!(
        "\n\n{} chunks, {} chars",
        retrieval.chunks.len(),
        retrieval.context.char_len()
    ));
    if !retrieval.context.citations.is_empty() {
        out.push_str("\nSources:");
        for source in &retrieval.context.citations {
            out.push_str("\n- ");
            out.push_str(source);
        }
    }
    out
}
