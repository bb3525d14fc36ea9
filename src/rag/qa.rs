use std::sync::Arc;

use anyhow::Result;

use crate::llm::{ChatMessage, CompletionModel};
use crate::models::{AnswerResponse, ScoredChunk};
use super::RAGEngine;

pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been indexed yet. Upload a PDF before asking questions.";

const SYSTEM_PROMPT: &str = "You answer questions using only the extracts of documents you are given. \
If the extracts do not contain the answer, say that you don't know; do not make one up.";

const SOURCES_MARKER: &str = "SOURCES:";

/// Retrieval-augmented QA over the vector store.
pub struct QAChain {
    rag: Arc<RAGEngine>,
    llm: Arc<dyn CompletionModel>,
    top_k: usize,
}

impl QAChain {
    pub fn new(rag: Arc<RAGEngine>, llm: Arc<dyn CompletionModel>, top_k: usize) -> Self {
        Self { rag, llm, top_k }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub async fn answer_question(&self, query: &str) -> Result<AnswerResponse> {
        let retrieved = self.rag.retrieve(query, self.top_k).await?;
        if retrieved.is_empty() {
            tracing::info!("Question asked against an empty index");
            return Ok(AnswerResponse {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                sources: Vec::new(),
            });
        }

        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(query, &retrieved)),
        ];
        tracing::debug!("Sending {} chunks to {}", retrieved.len(), self.llm.model_name());

        let reply = self.llm.complete(&messages).await?;
        Ok(parse_reply(&reply, &retrieved))
    }
}

fn build_prompt(query: &str, chunks: &[ScoredChunk]) -> String {
    let mut prompt = String::from(
        "Given the following extracted parts of long documents and a question, create a final answer \
         with references (\"SOURCES\"). Always finish with a line of the form \
         \"SOURCES: <source>, <source>\" naming the sources you used, exactly as written below.\n\n",
    );
    prompt.push_str(&format!("QUESTION: {}\n=========\n", query));
    for scored in chunks {
        prompt.push_str(&format!(
            "Content: {}\nSource: {}\n\n",
            scored.chunk.text,
            scored.chunk.source_label()
        ));
    }
    prompt.push_str("=========\nFINAL ANSWER:");
    prompt
}

fn dedup_push(out: &mut Vec<String>, value: String) {
    if !value.is_empty() && !out.contains(&value) {
        out.push(value);
    }
}

/// Entries after the marker, one per comma or line, with list bullets removed.
fn cited_sources(tail: &str) -> Vec<String> {
    let mut sources = Vec::new();
    for item in tail.split(|c| c == ',' || c == '\n') {
        let item = item.trim().trim_start_matches(['-', '*']).trim();
        if item.eq_ignore_ascii_case("none") || item.eq_ignore_ascii_case("n/a") {
            continue;
        }
        dedup_push(&mut sources, item.to_string());
    }
    sources
}

/// Split the model reply into answer text and cited sources.
///
/// Falls back to the labels of the retrieved chunks when the reply cites nothing usable.
fn parse_reply(reply: &str, retrieved: &[ScoredChunk]) -> AnswerResponse {
    // ASCII-only uppercase keeps byte offsets aligned with `reply`.
    let upper = reply.to_ascii_uppercase();

    let (answer, mut sources) = match upper.rfind(SOURCES_MARKER) {
        Some(pos) => (
            reply[..pos].trim().to_string(),
            cited_sources(&reply[pos + SOURCES_MARKER.len()..]),
        ),
        None => (reply.trim().to_string(), Vec::new()),
    };

    if sources.is_empty() {
        for scored in retrieved {
            dedup_push(&mut sources, scored.chunk.source_label());
        }
    }

    AnswerResponse { answer, sources }
}
