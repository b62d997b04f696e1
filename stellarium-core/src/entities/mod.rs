//! Durable records and the queries that read and write them.

pub mod checkpoints;
pub mod subscribers;
