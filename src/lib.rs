//! # askdoc
//!
//! Ask questions about a single document, answered from its own text.
//!
//! askdoc splits a document (PDF, text, or Markdown) into overlapping
//! chunks, embeds each chunk, and stores the vectors in a SQLite-backed
//! index. At question time it embeds the question, retrieves the closest
//! chunks, stuffs them into a prompt, and asks a language model to answer
//! from that context only. Every answer comes with the chunks it was
//! grounded on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Document │──▶│   Indexer    │──▶│ index.sqlite  │
//! │ PDF/text │   │ Chunk+Embed  │   │ manifest+vecs │
//! └──────────┘   └──────────────┘   └───────┬───────┘
//!                                           │
//!                                   ┌───────▼───────┐
//!                                   │ Query Engine  │
//!                                   │ embed→top-k→  │
//!                                   │ prompt→model  │
//!                                   └───────┬───────┘
//!                      ┌────────────────────┼───────────────┐
//!                      ▼                    ▼               ▼
//!                ┌──────────┐        ┌──────────┐     ┌──────────┐
//!                │   ask    │        │   chat   │     │   HTTP   │
//!                │ one-shot │        │  shell   │     │  /query  │
//!                └──────────┘        └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! askdoc build                          # index data/document.pdf
//! askdoc ask "What is the return window?"
//! askdoc chat                           # interactive session
//! askdoc serve                          # POST /query on 127.0.0.1:8501
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed build, load, query, and generation errors |
//! | [`extract`] | Page-wise text extraction |
//! | [`chunk`] | Recursive character splitting |
//! | [`embedding`] | Embedder abstraction and providers |
//! | [`http`] | JSON client with retry and backoff |
//! | [`db`] | Index database connection |
//! | [`migrate`] | Index schema |
//! | [`index`] | Persisted vector index and search |
//! | [`indexer`] | Build pipeline |
//! | [`progress`] | Build progress reporting |
//! | [`prompt`] | Prompt template |
//! | [`generation`] | Answer generation backends |
//! | [`engine`] | Query engine |
//! | [`shell`] | Interactive chat |
//! | [`server`] | HTTP JSON API |
//! | [`stats`] | Index statistics |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod generation;
pub mod http;
pub mod index;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod shell;
pub mod stats;
