//! # Chat Harness
//!
//! Chat with a pile of documents. Files come from local disk or an Azure
//! Blob Storage container, are flattened to text, split into overlapping
//! chunks, embedded into an in-memory vector index, and answered against
//! through a conversational retrieval chain backed by an OpenAI-compatible
//! LLM.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Local files  │──▶│  extract    │──▶│   ingest     │──▶│ VectorIndex  │
//! │ Azure blobs  │   │ (per file)  │   │ join + split │   │ (in memory)  │
//! └──────────────┘   └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                │
//!                                 ┌──────────────┐   ┌──────────▼───────┐
//!                                 │ ChatSession  │──▶│ RetrievalChain   │──▶ LLM
//!                                 │ (transcript) │   │ (memory, top-k)  │
//!                                 └──────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! chx status                          # show config + required env vars
//! chx extract report.pdf data.csv     # see what the extractor produces
//! chx ask "What changed in Q3?" --local ./docs
//! chx chat                            # download the container, then chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-file text extraction |
//! | [`table`] | CSV / XLSX / XLS reports |
//! | [`chunk`] | Overlapping character splitter |
//! | [`ingest`] | Corpus assembly |
//! | [`embedding`] | Embedding backends |
//! | [`index`] | In-memory vector index |
//! | [`llm`] | Chat-completions client |
//! | [`chain`] | Conversational retrieval chain |
//! | [`session`] | Stateful chat session |
//! | [`connector_azure`] | Azure Blob Storage transfer |

pub mod chain;
pub mod chunk;
pub mod config;
pub mod connector_azure;
pub mod embedding;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod session;
pub mod table;
