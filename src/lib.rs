//! # Helpsync
//!
//! An incremental help-center synchronization engine. Helpsync mirrors a
//! Zendesk-style help center into a local markdown corpus and publishes
//! changed documents to a remote vector-store-backed assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ Help Center  │──▶│  Sync Engine  │──▶│   Corpus      │
//! │ (paginated)  │   │ normalize+    │   │ markdown +   │
//! └──────────────┘   │ fingerprint   │   │ sync state   │
//!                    └───────┬───────┘   └──────┬───────┘
//!                            │ changed-set      │ state
//!                            ▼                  ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │ Vector store │   │ Object store │
//!                    │ + assistant  │   │ (S3/Spaces)  │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! Each run processes one listing page: the pagination cursor is persisted
//! across runs, so repeated batches walk the whole listing and then wrap
//! around. Change detection is content-fingerprint based; timestamps are
//! recorded but never trusted.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`zendesk`] | Help-center listing source |
//! | [`normalize`] | HTML to markdown conversion |
//! | [`store`] | Change ledger and state persistence |
//! | [`spaces`] | S3-compatible object store client |
//! | [`sync`] | Incremental sync engine |
//! | [`openai`] | Remote index (vector store / assistant) client |
//! | [`publish`] | Changed-set publishing pipeline |

pub mod config;
pub mod models;
pub mod normalize;
pub mod openai;
pub mod publish;
pub mod spaces;
pub mod store;
pub mod sync;
pub mod zendesk;
