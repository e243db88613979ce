//! Core data types shared by the ingestion and chat pipeline.

use serde::Serialize;

/// A window of the assembled corpus; the unit handed to the vector index.
///
/// Chunks carry no identity beyond their position in the sequence
/// produced by [`crate::chunk::CharacterSplitter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Who spoke a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "Human",
            Speaker::Assistant => "Assistant",
        }
    }
}

/// One entry of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// A retrieved chunk backing an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSnippet {
    pub chunk_index: usize,
    /// Cosine similarity between the question and the chunk.
    pub score: f32,
    pub text: String,
}

impl SourceSnippet {
    /// The snippet text cut to `max_chars` characters, with `...` appended
    /// when anything was cut.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.text.chars().count() > max_chars {
            let head: String = self.text.chars().take(max_chars).collect();
            format!("{}...", head)
        } else {
            self.text.clone()
        }
    }
}
