// src/exec/mod.rs

//! Execution layer.
//!
//! [`pool`] owns the OS threads the loader drives: submitted closures run on
//! some pool thread, and `wait()` blocks until everything submitted so far
//! has returned.

pub mod pool;

pub use pool::ThreadPool;
