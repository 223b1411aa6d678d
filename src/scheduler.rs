// src/scheduler.rs

//! Dependency-ordered job scheduling
//!
//! A generic executor for named units of work with dependencies between
//! them. Jobs move through a state machine:
//!
//! ```text
//! READY -> (unmet deps) -> PENDING -> (deps resolved) -> READY -> WORKING -> DONE
//! ```
//!
//! The graph is discovered lazily: [`JobManager::get_job`] wires dependency
//! edges as each job is first examined, so the full graph need not be known
//! upfront, and a job can be demoted back to PENDING within the same call
//! that discovers its dependencies. [`JobRunner::run`] drives the graph in
//! a single task: drain every currently-ready job into a set of in-flight
//! futures, await whichever completes first, feed the result back, repeat.
//! Concurrency is bounded only by the graph's fan-out at any instant.
//!
//! A failed job is recorded and its dependents are simply never unlocked;
//! after the graph drains, the permanently-pending jobs are enumerated in
//! a [`JobsNotCompletedError`].

use futures::StreamExt;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::events::{Event, Level};

/// Scheduling state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Ready,
    Pending,
    Working,
    Done,
}

/// The payload a job carries through the scheduler
pub trait JobContext {
    /// Unique job name
    fn name(&self) -> &str;
    /// Human-readable description for events and error listings
    fn describe(&self) -> String;
}

/// A unit of work wrapped with scheduling state
#[derive(Debug)]
pub struct JobProxy<C> {
    pub context: C,
    pub name: String,
    /// Forward edges: names of jobs this one is waiting on
    pub pending_for: BTreeSet<String>,
    /// Reverse edges: names of jobs waiting on this one
    pub needed_by: BTreeSet<String>,
    /// `None` until the manager first queues or discovers the job
    pub state: Option<JobState>,
    /// Event verbosity when this job completes
    pub event_level: Level,
}

impl<C: JobContext> JobProxy<C> {
    pub fn new(context: C) -> Self {
        let name = context.name().to_string();
        Self {
            context,
            name,
            pending_for: BTreeSet::new(),
            needed_by: BTreeSet::new(),
            state: None,
            event_level: Level::Default,
        }
    }

    pub fn with_event_level(mut self, level: Level) -> Self {
        self.event_level = level;
        self
    }

    /// Declare a dependency on another job
    pub fn depend_on(&mut self, name: impl Into<String>) {
        self.pending_for.insert(name.into());
    }
}

/// Manage a set of jobs and their states
pub struct JobManager<C> {
    /// Jobs not currently dispatched, keyed by name
    jobs: BTreeMap<String, JobProxy<C>>,
    /// Stack of ready job names
    ready_jobs: Vec<String>,
    /// Names of dispatched jobs
    working_jobs: BTreeSet<String>,
    /// Reverse edges discovered while the dependency was dispatched;
    /// merged into its `needed_by` when it completes
    deferred_edges: BTreeMap<String, BTreeSet<String>>,
    /// Failed jobs with their errors
    dead_jobs: Vec<(JobProxy<C>, Error)>,
}

impl<C: JobContext> JobManager<C> {
    /// Create a manager; every given job starts on the ready stack
    pub fn new(jobs: impl IntoIterator<Item = JobProxy<C>>) -> Self {
        let mut map = BTreeMap::new();
        let mut ready_jobs = Vec::new();
        for mut job in jobs {
            job.state = Some(JobState::Ready);
            ready_jobs.push(job.name.clone());
            map.insert(job.name.clone(), job);
        }
        Self {
            jobs: map,
            ready_jobs,
            working_jobs: BTreeSet::new(),
            deferred_edges: BTreeMap::new(),
            dead_jobs: Vec::new(),
        }
    }

    /// Pop the next dispatchable job, wiring dependency edges on the way
    ///
    /// For each declared dependency of a popped job: if the dependency is
    /// already DONE its edge is dropped; otherwise a reverse edge is
    /// registered and an undiscovered dependency is promoted to READY. A
    /// job with unmet dependencies after this pass is demoted to PENDING
    /// and the loop moves on. Callers must call repeatedly until `None`:
    /// one completion can unlock several jobs.
    pub fn get_job(&mut self) -> Option<JobProxy<C>> {
        while let Some(name) = self.ready_jobs.pop() {
            let Some(mut job) = self.jobs.remove(&name) else {
                continue;
            };
            let mut unmet = BTreeSet::new();
            for dep_name in std::mem::take(&mut job.pending_for) {
                let Some(dep_job) = self.jobs.get_mut(&dep_name) else {
                    // Dispatched right now, so not DONE yet; the reverse
                    // edge is recorded for when it completes.
                    self.deferred_edges
                        .entry(dep_name.clone())
                        .or_default()
                        .insert(name.clone());
                    unmet.insert(dep_name);
                    continue;
                };
                if dep_job.state == Some(JobState::Done) {
                    dep_job.needed_by.remove(&name);
                    continue;
                }
                dep_job.needed_by.insert(name.clone());
                if dep_job.state.is_none() {
                    dep_job.state = Some(JobState::Ready);
                    self.ready_jobs.push(dep_name.clone());
                }
                unmet.insert(dep_name);
            }
            job.pending_for = unmet;
            if job.pending_for.is_empty() {
                job.state = Some(JobState::Working);
                self.working_jobs.insert(name);
                return Some(job);
            }
            job.state = Some(JobState::Pending);
            self.jobs.insert(name, job);
        }
        None
    }

    /// Record a completed job and unlock its dependents on success
    pub fn put_job(&mut self, mut job: JobProxy<C>, result: Result<()>) {
        self.working_jobs.remove(&job.name);
        if let Some(deferred) = self.deferred_edges.remove(&job.name) {
            job.needed_by.extend(deferred);
        }
        match result {
            Ok(()) => {
                job.state = Some(JobState::Done);
                for up_name in std::mem::take(&mut job.needed_by) {
                    let Some(up_job) = self.jobs.get_mut(&up_name) else {
                        continue;
                    };
                    up_job.pending_for.remove(&job.name);
                    if up_job.pending_for.is_empty() {
                        up_job.state = Some(JobState::Ready);
                        self.ready_jobs.push(up_name);
                    }
                }
                self.jobs.insert(job.name.clone(), job);
            }
            Err(error) => {
                self.dead_jobs.push((job, error));
            }
        }
    }

    /// True while there are ready or working jobs
    pub fn has_jobs(&self) -> bool {
        !self.ready_jobs.is_empty() || !self.working_jobs.is_empty()
    }

    /// Failed jobs, plus permanently-pending jobs once nothing is running
    pub fn dead_jobs(&self) -> Vec<(&JobProxy<C>, Option<&Error>)> {
        let mut dead: Vec<(&JobProxy<C>, Option<&Error>)> = self
            .dead_jobs
            .iter()
            .map(|(job, error)| (job, Some(error)))
            .collect();
        if !self.has_jobs() {
            dead.extend(
                self.jobs
                    .values()
                    .filter(|job| !job.pending_for.is_empty())
                    .map(|job| (job, None)),
            );
        }
        dead
    }

    /// Consume the manager, yielding every job context by name
    pub fn into_contexts(self) -> BTreeMap<String, C> {
        let mut contexts: BTreeMap<String, C> = self
            .jobs
            .into_values()
            .map(|job| (job.name, job.context))
            .collect();
        for (job, _error) in self.dead_jobs {
            contexts.insert(job.name, job.context);
        }
        contexts
    }
}

/// The work a job performs, supplied by the embedding processor
pub trait JobProcessor {
    type Context: JobContext;

    /// Perform the asynchronous work for one job
    fn process_job<'a>(
        &'a self,
        context: &'a mut Self::Context,
    ) -> LocalBoxFuture<'a, Result<()>>;

    /// Called once for each successfully completed job
    fn post_process_job(&self, context: &Self::Context);

    /// Receive scheduler events
    fn handle_event(&self, event: Event);
}

/// Jobs left permanently pending after the graph drained
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct JobsNotCompletedError {
    /// Descriptions of the failed and never-unlocked jobs
    pub descriptions: Vec<String>,
}

impl std::fmt::Display for JobsNotCompletedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for desc in &self.descriptions {
            writeln!(f, "{}", desc)?;
        }
        Ok(())
    }
}

/// Single-task cooperative scheduler over a [`JobManager`]
pub struct JobRunner;

impl JobRunner {
    pub fn new() -> Self {
        Self
    }

    /// Drive the graph until it drains
    ///
    /// Every currently-ready job is dispatched before anything is awaited,
    /// so independent jobs run concurrently; completions are reaped in
    /// whichever order they finish. Returns a [`JobsNotCompletedError`]
    /// when any job failed and left dependents locked.
    pub async fn run<P: JobProcessor>(
        &self,
        processor: &P,
        manager: &mut JobManager<P::Context>,
    ) -> Result<()> {
        type InFlight<'a, C> = LocalBoxFuture<'a, (JobProxy<C>, Result<()>)>;
        let mut in_flight: FuturesUnordered<InFlight<'_, P::Context>> = FuturesUnordered::new();
        loop {
            while let Some(mut job) = manager.get_job() {
                in_flight.push(Box::pin(async move {
                    let result = processor.process_job(&mut job.context).await;
                    (job, result)
                }));
            }
            let Some((job, result)) = in_flight.next().await else {
                break;
            };
            match &result {
                Ok(()) => {
                    processor.post_process_job(&job.context);
                    processor.handle_event(Event::JobDone {
                        desc: job.context.describe(),
                        level: job.event_level,
                    });
                }
                Err(error) => {
                    processor.handle_event(Event::JobFailed {
                        desc: job.context.describe(),
                        error: error.to_string(),
                    });
                }
            }
            manager.put_job(job, result);
        }
        let dead = manager.dead_jobs();
        if dead.is_empty() {
            Ok(())
        } else {
            Err(JobsNotCompletedError {
                descriptions: dead
                    .iter()
                    .map(|(job, _error)| job.context.describe())
                    .collect(),
            }
            .into())
        }
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
