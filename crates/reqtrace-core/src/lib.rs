//! # reqtrace core
//!
//! Runtime-free logic for reqtrace: the data model, the error taxonomy,
//! the key-value store abstraction and job repository, chunked LLM
//! analysis with merging and classification, the content-addressable
//! analysis cache, and the keyword search engine with synonym expansion.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! Concrete LLM clients, the SQLite store and the job orchestrator live in
//! the `reqtrace` crate.

pub mod analyze;
pub mod cache;
pub mod chunk;
pub mod error;
pub mod llm;
pub mod merge;
pub mod models;
pub mod repo;
pub mod response;
pub mod search;
pub mod store;
pub mod synonyms;
