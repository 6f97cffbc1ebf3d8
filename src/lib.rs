//! # Docfield
//!
//! A document upload and structured field extraction service.
//!
//! Uploaded files are acknowledged immediately; for each file a detached
//! background unit extracts its text, sends it to a language model, carves
//! the JSON object out of the model's output, flattens it into a
//! single-level record, and persists it grouped by upload batch. Records
//! can then be listed, fetched, updated (with change tracking), and
//! deleted over the HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│ extract → LLM → carve → parse │──▶│  SQLite   │
//! │ (HTTP)   │   │       → flatten → persist     │   │ documents │
//! └──────────┘   └───────────────────────────────┘   └────┬─────┘
//!                  one spawned task per file              │
//!                                                   ┌──────────┐
//!                                                   │   HTTP   │
//!                                                   │   API    │
//!                                                   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and timestamp formats |
//! | [`flatten`] | Nested JSON → flat path-keyed map |
//! | [`diff`] | Added/removed/changed comparison of two JSON values |
//! | [`scan`] | Locating a JSON object in free-form model output |
//! | [`extract`] | Extension-keyed text extraction |
//! | [`llm`] | Language model adapters (OpenAI, Ollama) |
//! | [`pipeline`] | Per-file background ingestion |
//! | [`store`] | Record store over SQLite |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod diff;
pub mod extract;
pub mod flatten;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod scan;
pub mod server;
pub mod store;
