//! Output module for read-only reports over the post store

pub mod stats;

pub use stats::{load_statistics, print_statistics, TreeStatistics};
