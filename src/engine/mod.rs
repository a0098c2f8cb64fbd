// src/engine/mod.rs

//! The loader engine.
//!
//! - [`queue`] holds the ready queue: pending jobs with all prerequisites
//!   satisfied, ordered for dispatch.
//! - [`loader`] ties everything together: the pending dependency graph,
//!   priority inheritance, failure fan-out, and the worker loop.

pub mod loader;
pub mod queue;

pub use loader::{Loader, LoaderStats};
pub use queue::{ReadyKey, ReadyQueue};
