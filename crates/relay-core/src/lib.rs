//! # Relay Core
//!
//! Transport-free orchestration logic for the Chatwoot relay: webhook
//! normalization, dialogue history reconstruction, the embedding store
//! abstraction, the tool registry, and the bounded tool-calling completion
//! loop.
//!
//! This crate performs no HTTP and no filesystem I/O. Collaborators (LLM
//! backend, embedding backend, persisted store) are reached through the
//! [`chat::ChatBackend`], [`embedding::Embedder`] and
//! [`store::EmbeddingStore`] traits, implemented by the application crate.
//!
//! ## Flow
//!
//! ```text
//! webhook ─▶ event::normalize ─▶ history::map_history ─┐
//!                                                      ├─▶ completion::run ─▶ reply
//!            store::EmbeddingStore (optional context) ─┘
//! ```

pub mod chat;
pub mod chunk;
pub mod completion;
pub mod embedding;
pub mod event;
pub mod history;
pub mod models;
pub mod store;
pub mod tools;
