//! # deskbot
//!
//! A support chat backend for embeddable website widgets.
//!
//! A business owner stores a short knowledge base under an owner id. A
//! static script on the owner's website renders a chat widget and posts
//! visitor messages to `POST /chat`; the server resolves the owner's
//! configuration, assembles a prompt that confines a general-purpose model
//! to that business's facts, and returns the generated reply.
//!
//! ## Architecture
//!
//! ```text
//! visitor browser                    deskbot
//! ┌──────────────┐  POST /chat  ┌──────────┐   ┌─────────┐
//! │ chatbot.js   │─────────────▶│  server  │──▶│  store  │  SQLite
//! │ data-owner-id│◀─────────────│          │   └─────────┘
//! └──────────────┘   {reply}    │          │   ┌─────────┐
//!                               │          │──▶│ prompt  │  pure
//!                               │          │   └─────────┘
//!                               │          │   ┌────────────┐
//!                               │          │──▶│ completion │  Gemini/OpenAI
//!                               └──────────┘   └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Configuration record and request/response types |
//! | [`db`] | SQLite pool and single-flight lazy connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Configuration store trait and backends |
//! | [`prompt`] | Prompt assembly |
//! | [`completion`] | Generative model backends |
//! | [`error`] | Endpoint error taxonomy |
//! | [`server`] | HTTP server |

pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod server;
pub mod store;
