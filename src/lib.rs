#![warn(missing_docs)]

//! Core library for the department-scoped knowledge base: ingestion, indexing, and citations.

/// HTTP routing and REST handlers.
pub mod api;
/// Thread citation lookup.
pub mod citations;
/// Environment-driven configuration management.
pub mod config;
/// Document records and their lifecycle.
pub mod documents;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text extraction through a document-analysis service.
pub mod extraction;
/// Vector index integration.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Ingestion pipeline orchestration.
pub mod pipeline;
/// Retry with backoff for transient upstream failures.
pub mod retry;
/// File byte storage.
pub mod storage;
