//! Job dependency graph

use crate::core::{
    condition::DependencyOutcomes,
    job::Job,
    state::{JobStatus, Run},
};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Structural problems in a job graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate job id '{0}'")]
    DuplicateJob(String),

    #[error("job '{job}' depends on unknown job '{dependency}'")]
    DanglingDependency { job: String, dependency: String },

    /// `cycle` lists the member jobs in dependency order
    #[error("dependency cycle detected: {}", format_cycle(.cycle))]
    CycleDetected { cycle: Vec<String> },
}

fn format_cycle(cycle: &[String]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(String::as_str).collect();
    if let Some(first) = cycle.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

/// Dependency graph of jobs. Edges never change once jobs are added.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    jobs: HashMap<String, Job>,

    /// Job IDs in insertion order
    insertion_order: Vec<String>,

    /// job -> jobs that list it as a direct dependency
    dependents: HashMap<String, Vec<String>>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Dependencies may reference jobs added later; they are
    /// checked by [`JobGraph::validate`].
    pub fn add_job(&mut self, job: Job) -> Result<(), GraphError> {
        if self.jobs.contains_key(&job.id) {
            return Err(GraphError::DuplicateJob(job.id));
        }

        for dep in &job.dependencies {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .push(job.id.clone());
        }

        self.insertion_order.push(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Check that every dependency resolves and the graph is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        for id in &self.insertion_order {
            let job = &self.jobs[id];
            if let Some(dep) = job.dependencies.iter().find(|d| !self.jobs.contains_key(*d)) {
                return Err(GraphError::DanglingDependency {
                    job: job.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }

        self.check_cycles()
    }

    fn check_cycles(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for id in &self.insertion_order {
            if !visited.contains(id.as_str()) {
                self.dfs_check(id, &mut visited, &mut stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check<'a>(
        &'a self,
        job_id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        visited.insert(job_id);
        stack.push(job_id);

        if let Some(job) = self.jobs.get(job_id) {
            for dep in &job.dependencies {
                if let Some(pos) = stack.iter().position(|s| *s == dep.as_str()) {
                    // The stack walks from dependent to dependency; flip it so
                    // each entry is a dependency of the next.
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|s| s.to_string()).collect();
                    cycle.reverse();
                    cycle.rotate_right(1);
                    return Err(GraphError::CycleDetected { cycle });
                }
                if !visited.contains(dep.as_str()) {
                    self.dfs_check(dep, visited, stack)?;
                }
            }
        }

        stack.pop();
        Ok(())
    }

    /// Get a job by ID
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Jobs in insertion order
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.insertion_order.iter().map(|id| &self.jobs[id])
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.insertion_order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Direct dependents of a job
    pub fn dependents(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transitive dependencies of a job
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        let mut pending: Vec<&str> = vec![id];

        while let Some(current) = pending.pop() {
            if let Some(job) = self.jobs.get(current) {
                for dep in &job.dependencies {
                    if result.insert(dep.clone()) {
                        pending.push(dep);
                    }
                }
            }
        }

        result
    }

    /// Scheduling frontier: jobs still `Pending`/`Ready` whose dependencies are all terminal
    pub fn ready_jobs(&self, run: &Run) -> Vec<&Job> {
        self.jobs()
            .filter(|job| {
                matches!(
                    run.status(&job.id),
                    Some(JobStatus::Pending) | Some(JobStatus::Ready)
                ) && job
                    .dependencies
                    .iter()
                    .all(|dep| run.status(dep).is_some_and(|s| s.is_terminal()))
            })
            .collect()
    }

    /// Gather what the condition evaluator needs to know about a job's dependencies
    pub fn dependency_outcomes<'a>(&'a self, job: &'a Job, run: &Run) -> DependencyOutcomes<'a> {
        let direct = job
            .dependencies
            .iter()
            .map(|dep| (dep.as_str(), run.status(dep).unwrap_or(JobStatus::Pending)))
            .collect();

        let upstream_failed = self
            .ancestors(&job.id)
            .iter()
            .any(|id| run.status(id) == Some(JobStatus::Failed));

        DependencyOutcomes::new(direct).with_upstream_failed(upstream_failed)
    }

    /// Topological order; ties broken by job ID for determinism.
    /// Assumes the graph has been validated.
    pub fn execution_order(&self) -> Vec<String> {
        self.levels().into_iter().flatten().collect()
    }

    /// Group jobs into waves: each wave depends only on earlier waves.
    /// Assumes the graph has been validated.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .jobs
            .values()
            .map(|job| (job.id.as_str(), job.dependencies.len()))
            .collect();
        let mut levels = Vec::new();

        let mut current: Vec<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        while !current.is_empty() {
            current.sort_unstable();
            for id in &current {
                remaining.remove(id);
            }

            let mut next = Vec::new();
            for id in &current {
                for dependent in self.dependents(id) {
                    if let Some(count) = remaining.get_mut(dependent.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }

            levels.push(current.iter().map(|s| s.to_string()).collect());
            current = next;
        }

        levels
    }
}
