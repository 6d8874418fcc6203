//! # Auto Paper Digest
//!
//! **Content tracking, deduplication, quality filtering, and recommendation
//! for harvested papers, repositories, and news.**
//!
//! Fetchers and publishers live elsewhere; this crate is the layer between
//! them. It persists every harvested record with its pipeline status,
//! collapses duplicates across sources, scores each record, and ranks what
//! is left for readers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Fetchers  │──▶│ Quality      │──▶│ Deduplicator │──▶│ Recommender │
//! │ (JSONL)   │   │ Filter       │   │ (3 tiers)    │   │ (4 modes)   │
//! └───────────┘   └──────┬───────┘   └──────┬───────┘   └──────┬──────┘
//!                        └──────────────────┼──────────────────┘
//!                                           ▼
//!                                     ┌──────────┐
//!                                     │  SQLite  │
//!                                     └──────────┘
//! ```
//!
//! The scoring, dedup, and recommendation logic lives in `apd-core` and
//! talks to storage only through its `Store` trait. This crate supplies the
//! SQLite implementation ([`sqlite_store`]), configuration ([`config`]),
//! schema migrations ([`migrate`]), the embedding model ([`embedding`]),
//! and the command implementations behind the `apd` binary.
//!
//! ## Quick Start
//!
//! ```bash
//! apd init
//! apd ingest harvest/2026-W03.jsonl
//! apd dedup --period 2026-W03 --merge
//! apd recommend hybrid --period 2026-W03 --limit 10
//! apd status --period 2026-W03
//! ```

pub mod config;
pub mod curate;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod recommend_cmd;
pub mod sqlite_store;
pub mod stats;
pub mod status;
