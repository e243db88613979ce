//! Conversational retrieval: condense, retrieve, answer.
//!
//! ```text
//! question ─► (history? condense into standalone question)
//!          ─► embed ─► top-k chunks ─► QA prompt(standalone) ─► answer
//! ```
//!
//! The memory is only appended to after an answer arrives, so a failed call
//! leaves the conversation exactly as it was.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::{SourceSnippet, Turn};

const CONDENSE_PROMPT: &str = "Given the following conversation and a follow up question, \
rephrase the follow up question to be a standalone question, in its original language.";

const QA_PROMPT: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Ordered question/answer history fed to the condense step.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<Turn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn record(&mut self, question: &str, answer: &str) {
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::assistant(answer));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// `Human: ...` / `Assistant: ...` lines.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct ChainAnswer {
    pub answer: String,
    pub sources: Vec<SourceSnippet>,
}

pub struct RetrievalChain {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    memory: ConversationMemory,
    top_k: usize,
}

impl RetrievalChain {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            memory: ConversationMemory::new(),
            top_k: top_k.max(1),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }

    pub async fn ask(&mut self, question: &str) -> Result<ChainAnswer> {
        let standalone = if self.memory.is_empty() {
            question.to_string()
        } else {
            let condensed = self.llm.complete(&condense_messages(&self.memory, question)).await?;
            debug!(standalone = %condensed.trim(), "condensed follow-up question");
            condensed.trim().to_string()
        };

        let query_vec = self.embedder.embed_query(&standalone).await?;
        let sources = self.index.search(&query_vec, self.top_k);

        let answer = self.llm.complete(&qa_messages(&sources, &standalone)).await?;
        let answer = answer.trim().to_string();

        self.memory.record(question, &answer);
        Ok(ChainAnswer { answer, sources })
    }
}

fn condense_messages(memory: &ConversationMemory, question: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(format!(
        "{}\n\nChat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        CONDENSE_PROMPT,
        memory.render(),
        question
    ))]
}

fn qa_messages(sources: &[SourceSnippet], question: &str) -> Vec<ChatMessage> {
    let context = sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    vec![
        ChatMessage::system(format!("{}\n\n{}", QA_PROMPT, context)),
        ChatMessage::user(question),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_renders_labels() {
        let mut memory = ConversationMemory::new();
        memory.record("what is x?", "x is 1");
        assert_eq!(memory.render(), "Human: what is x?\nAssistant: x is 1");
        memory.clear();
        assert!(memory.is_empty());
    }

    #[test]
    fn condense_prompt_contains_history_and_question() {
        let mut memory = ConversationMemory::new();
        memory.record("q1", "a1");
        let msgs = condense_messages(&memory, "and then?");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].content.contains("Human: q1\nAssistant: a1"));
        assert!(msgs[0].content.contains("Follow Up Input: and then?"));
    }

    #[test]
    fn qa_prompt_stuffs_sources() {
        let sources = vec![
            SourceSnippet {
                chunk_index: 0,
                score: 0.9,
                text: "alpha".to_string(),
            },
            SourceSnippet {
                chunk_index: 1,
                score: 0.5,
                text: "beta".to_string(),
            },
        ];
        let msgs = qa_messages(&sources, "q?");
        assert_eq!(msgs[0].role, "system");
        assert!(msgs[0].content.ends_with("alpha\n\nbeta"));
        assert_eq!(msgs[1], ChatMessage::user("q?"));
    }
}
