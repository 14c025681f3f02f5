// ABOUTME: Chunked, idempotent synchronization engine
// ABOUTME: Partitions the domain, processes chunks, tracks progress and checkpoints

pub mod document;
pub mod partition;
pub mod party;
pub mod runner;
pub mod state;
pub mod verify;

pub use document::{DocumentSync, PageOutcome};
pub use partition::{document_bounds, ChunkPlan, Partition, PartitionIter};
pub use party::PartySync;
pub use runner::{JobStats, SyncJob, SyncRunner};
pub use state::{JobCheckpoint, LoaderState};
pub use verify::{verify_county, VerifyReport};
