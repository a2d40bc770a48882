//! # Audit Harness
//!
//! A compliance-document ingestion and question-answering pipeline.
//!
//! Audit Harness ingests an organization's controlled documents (quality
//! manuals, procedures, forms) from a source folder, OCRs them, extracts
//! identity metadata from their filenames, and indexes overlapping text
//! chunks into a namespaced vector store. Questions are answered through
//! a deterministic retrieval router and a grounded synthesizer that
//! cites its sources and reports whether the answer was actually found
//! in the indexed documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────┐   ┌─────────────┐
//! │ Connector  │──▶│ OCR + Metadata +     │──▶│ Vector store │
//! │ FS / Drive │   │ Chunk + Embed        │   │ (namespaced) │
//! └────────────┘   └──────────────────────┘   └──────┬──────┘
//!                                                    │
//!                        ┌───────────────────────────┤
//!                        ▼                           ▼
//!                  ┌───────────┐              ┌────────────┐
//!                  │  Router   │─────────────▶│ Synthesizer │
//!                  │ (audx ask)│   chunks     │ (citations) │
//!                  └───────────┘              └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! audx sync                            # ingest all configured targets
//! audx sync --dry-run                  # count chunks without writing
//! audx ask "how are audits scheduled" --org acme
//! audx purge --org acme --doc-type forms
//! audx targets                         # list configured namespaces
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and namespace derivation |
//! | [`error`] | Pipeline error taxonomy |
//! | [`connector`] | Source connector abstraction |
//! | [`connector_fs`] | Filesystem connector |
//! | [`connector_drive`] | Google Drive connector |
//! | [`ocr`] | OCR engines and table flattening |
//! | [`metadata`] | Filename metadata extraction |
//! | [`chunker`] | Sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_store`] | Namespaced vector index |
//! | [`indexer`] | Per-document embed + upsert |
//! | [`ingest`] | Batch ingestion over targets |
//! | [`retriever`] | Retrieval strategies |
//! | [`form_resolver`] | Form reference resolution |
//! | [`router`] | Deterministic query routing |
//! | [`synthesizer`] | Grounded answer synthesis |
//! | [`ask`] | Provider wiring and question entry point |

pub mod ask;
pub mod chunker;
pub mod config;
pub mod connector;
pub mod connector_drive;
pub mod connector_fs;
pub mod embedding;
pub mod error;
pub mod form_resolver;
pub mod indexer;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod ocr;
pub mod retriever;
pub mod router;
pub mod synthesizer;
pub mod vector_store;
