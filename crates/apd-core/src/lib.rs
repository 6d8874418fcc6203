//! # Auto Paper Digest Core
//!
//! Content quality and redundancy control for harvested papers,
//! repositories, and news items: data models, period keys, the
//! [`Store`](store::Store) abstraction, duplicate detection, quality
//! scoring, recommendation, and batch pipeline helpers.
//!
//! This crate contains no sqlx, tokio runtime, filesystem I/O, or
//! embedding runtime. Backends are injected: a `Store` implementation and
//! a [`SimilarityModel`](similarity::SimilarityModel).

pub mod dedup;
pub mod models;
pub mod period;
pub mod pipeline;
pub mod quality;
pub mod recommend;
pub mod similarity;
pub mod store;
