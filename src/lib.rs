//! # convtree
//!
//! Reconstructs reply-linked conversation trees from a flat stream of
//! messages, recovers messages missing from the dataset through a
//! rate-limited batch lookup, and annotates each tree with statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌──────────┐
//! │  Ingest  │──▶│ ReplyIndex  │──▶│  Forest   │──▶│  Shards  │
//! │ (lines)  │   │ + body store│   │ (graph)   │   │ (budget) │
//! └──────────┘   └─────────────┘   └───────────┘   └────┬─────┘
//!                                                       ▼
//!            ┌──────────┐   ┌──────────┐   ┌──────────────────┐
//!            │ payloads │◀──│  Stats   │◀──│     Hydrator     │
//!            └────┬─────┘   └──────────┘   └──────────────────┘
//!                 ▼
//!            ┌──────────┐   ┌────────────────────┐
//!            │ Recovery │──▶│ RateLimitedFetcher │──▶ lookup service
//!            └──────────┘   └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! convtree init
//! convtree build --input tweets.jsonl --output conversations.jsonl
//! convtree recover --input conversations.jsonl --output round1.jsonl --enrich
//! convtree enrich --input round1.jsonl --brands brands.csv
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`snowflake`] | Id clock: creation time from an id |
//! | [`models`] | Message formats and the missing placeholder |
//! | [`reply_index`] | In-memory reply-link index |
//! | [`store`] | Body store trait, SQLite and in-memory backends |
//! | [`ingest`] | Streams input lines into the index and store |
//! | [`graph`] | Roots and tree walks |
//! | [`shard`] | Node-budget shard planner |
//! | [`hydrate`] | Attaches bodies per shard |
//! | [`conversation`] | Conversation payload type |
//! | [`recover`] | Missing-node recovery round |
//! | [`fetcher`] | Sliding-window rate governor |
//! | [`lookup`] | External batch lookup service |
//! | [`stats`] | Conversation statistics |
//! | [`brands`] | Brand roster |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod brands;
pub mod build_cmd;
pub mod config;
pub mod conversation;
pub mod db;
pub mod enrich_cmd;
pub mod fetcher;
pub mod graph;
pub mod hydrate;
pub mod ingest;
pub mod lookup;
pub mod migrate;
pub mod models;
pub mod pipe;
pub mod progress;
pub mod recover;
pub mod reply_index;
pub mod shard;
pub mod snowflake;
pub mod stats;
pub mod store;
pub mod telemetry;
