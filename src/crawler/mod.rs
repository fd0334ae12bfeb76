//! Crawler module for quote-tree traversal
//!
//! This module contains the core traversal logic, including:
//! - Frontier derivation from persisted crawl state
//! - Breadth-first forward crawls (seeded or whole-store)
//! - Reverse traces to the root
//! - Incremental update passes
//! - Cooperative cancellation

mod coordinator;
mod frontier;
mod interrupt;
mod trace;
mod update;

#[cfg(test)]
mod testing;

pub use coordinator::{Coordinator, CrawlReport, StopReason, TraversalPhase};
pub use frontier::{Frontier, FrontierScope};
pub use interrupt::Interrupt;
pub use trace::{TraceOutcome, TraceReport};
pub use update::UpdateReport;
