//! # Chatwoot relay
//!
//! Relays customer-support messages from a Chatwoot helpdesk to an
//! OpenAI-compatible LLM and posts the generated reply back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  webhook  ┌───────────────────────────────┐  reply  ┌──────────┐
//! │ Chatwoot │──────────▶│ normalize → history → [RAG]   │────────▶│ Chatwoot │
//! └──────────┘           │ → completion loop (+ tools)   │         └──────────┘
//!                        └──────────────┬────────────────┘
//!                                       │ chat / embeddings
//!                                       ▼
//!                                ┌─────────────┐      ┌──────────────┐
//!                                │ LLM backend │      │ JSONL store  │◀── relay ingest
//!                                └─────────────┘      └──────────────┘
//! ```
//!
//! The decision logic (normalizer, history mapper, similarity search,
//! completion loop) lives in the `relay_core` crate. This crate supplies
//! the HTTP collaborators, configuration, persistence and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Request-path error type and HTTP mapping |
//! | [`helpdesk`] | Chatwoot messages API client |
//! | [`llm`] | Chat-completion backend |
//! | [`embedding`] | Embeddings backend |
//! | [`jsonl_store`] | Append-only embedding store file |
//! | [`retrieval`] | Context block formatting |
//! | [`prompt`] | System prompt resolution |
//! | [`tools`] | Built-in tools and override file |
//! | [`pipeline`] | Webhook orchestration |
//! | [`server`] | Axum HTTP server |
//! | [`ingest`] | Directory ingestion |

pub mod config;
pub mod embedding;
pub mod error;
pub mod helpdesk;
pub mod ingest;
pub mod jsonl_store;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod tools;
