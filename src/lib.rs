#![deny(missing_docs)]

//! Core library for the docuspace collaborative document Q&A server.

/// Pure capability checks for spaces and chats.
pub mod access;
/// HTTP routing and REST handlers.
pub mod api;
/// Spaces, chats, and the conversation log.
pub mod collab;
/// Completion client abstraction and the chat adapter.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index integration.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query metrics helpers.
pub mod metrics;
/// Document ingestion and retrieval-augmented query pipelines.
pub mod pipeline;
/// Bounded retry with exponential backoff for provider calls.
pub mod retry;
/// SQLite-backed registry, collaboration, and conversation stores.
pub mod store;
