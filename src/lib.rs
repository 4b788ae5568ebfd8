//! # reqtrace
//!
//! Requirement-to-test traceability analysis backed by an LLM.
//!
//! A job uploads a requirements document, an optional updated revision and a
//! CSV table of test cases. The pipeline extracts text, asks the model to
//! pull requirements, test cases and links out of each chunk of the
//! document, merges the chunks, computes coverage metrics and
//! recommendations, and classifies the outcome. Test-case rows are indexed
//! for synonym-widened keyword search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Upload     │──▶│ Orchestrator │──▶│   KV store    │
//! │ CLI / HTTP   │   │ parse+analyze│   │ SQLite/memory │
//! └──────────────┘   └──────┬───────┘   └───────┬───────┘
//!                           │                   │
//!                           ▼                   ▼
//!                    ┌──────────────┐   ┌───────────────┐
//!                    │  LLM client  │   │    Search     │
//!                    │ Gemini/OpenAI│◀──│  + synonyms   │
//!                    └──────────────┘   └───────────────┘
//! ```
//!
//! The runtime-free core (models, merge, caching, search) lives in
//! `reqtrace-core`; this crate supplies the adapters.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Service wiring |
//! | [`cli`] | One-shot CLI commands |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection pool |
//! | [`extract`] | PDF, DOCX, text and CSV parsing |
//! | [`llm`] | Gemini and OpenAI clients |
//! | [`migrate`] | Schema creation |
//! | [`orchestrator`] | Job lifecycle and stage timeouts |
//! | [`searchable`] | Test rows to search items |
//! | [`server`] | HTTP API |
//! | [`sqlite_kv`] | SQLite-backed key-value store |

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod orchestrator;
pub mod searchable;
pub mod server;
pub mod sqlite_kv;
