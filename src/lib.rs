// ABOUTME: Library surface for the county land-record index loader
// ABOUTME: Exposes configuration, database helpers, sync engine, and orphan checks

pub mod config;
pub mod db;
pub mod orphans;
pub mod sync;
