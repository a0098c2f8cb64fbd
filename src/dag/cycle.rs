// src/dag/cycle.rs

use std::sync::Arc;

use crate::errors::LoadError;
use crate::job::{Job, JobSet};

/// Check an incoming job set for dependency cycles.
///
/// Jobs already pending inside the loader cannot reference incoming jobs
/// (their prerequisite sets were frozen when they were scheduled), so only
/// edges within `jobs` need to be considered; prerequisites outside the set
/// are skipped. On a cycle the error message carries the full chain, e.g.
/// `a -> b -> a`.
pub fn check_cycles(jobs: &JobSet) -> Result<(), LoadError> {
    let mut left = jobs.clone();
    let mut visited = JobSet::with_capacity(left.len());

    while let Some(job) = left.iter().next().cloned() {
        visit(&job, &mut left, &mut visited)?;
    }
    Ok(())
}

/// Depth-first walk restricted to `left`. Returns the partial cycle chain
/// while unwinding towards the node that closed it; that node converts the
/// chain into the final error.
fn visit(
    job: &Arc<Job>,
    left: &mut JobSet,
    visited: &mut JobSet,
) -> Result<Option<String>, LoadError> {
    if !left.contains(job) {
        // External prerequisite or a job already fully processed.
        return Ok(None);
    }
    if !visited.insert(Arc::clone(job)) {
        // Re-entered a job on the current path: the cycle closes here.
        visited.remove(job);
        return Ok(Some(job.name().to_string()));
    }

    for dep in job.dependencies() {
        if let Some(chain) = visit(&dep, left, visited)? {
            if visited.contains(job) {
                return Ok(Some(format!("{} -> {}", job.name(), chain)));
            }
            return Err(LoadError::ScheduleFailed(format!(
                "dependency cycle detected: {} -> {}",
                job.name(),
                chain
            )));
        }
    }

    left.remove(job);
    Ok(None)
}
