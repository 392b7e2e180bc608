//! Parallel tiling pipeline.
//!
//! ```text
//!                         ┌──────────────────────┐
//!                         │   TilingPipeline     │
//!                         │ (metadata, geometry) │
//!                         └──────────┬───────────┘
//!                                    │ spawn_blocking × N
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//!   ┌─────────────┐           ┌─────────────┐           ┌─────────────┐
//!   │  worker 0   │           │  worker 1   │    ...    │  worker N-1 │
//!   │ own handle  │           │ own handle  │           │ own handle  │
//!   └──────┬──────┘           └──────┬──────┘           └──────┬──────┘
//!          └─────────────────────────┼─────────────────────────┘
//!                                    ▼ push
//!                          ┌───────────────────┐
//!                          │    WriteQueue     │
//!                          └─────────┬─────────┘
//!                                    ▼ pop
//!                          ┌───────────────────┐
//!                          │  Writer (1 task)  │──▶ TileSink
//!                          └───────────────────┘
//! ```
//!
//! Workers claim tiles dynamically through a shared atomic cursor, so the
//! order in which tiles are read and written is unspecified. Each tile is
//! claimed by exactly one worker and written at most once.

mod queue;
mod runner;
mod summary;
mod worker;

pub use queue::{WriteQueue, WriteTask, Writer, WriterReport};
pub use runner::TilingPipeline;
pub use summary::{FailureStage, RunSummary, TileFailure, MAX_FAILURE_RECORDS};
pub use worker::tile_filename;
