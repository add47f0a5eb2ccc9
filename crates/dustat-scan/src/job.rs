//! The scan engine's job queue (§4.4): "a cooperative single-writer FIFO
//! driven by a zero-delay periodic tick. On each tick the head job runs;
//! the tick is rearmed until the queue (and a separate "blocked" list for
//! jobs waiting on external processes) is empty, at which point the engine
//! emits a `finished` event and the tick stops. Abort clears both lists and
//! marks every dir in them as aborted."

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use flate2::read::GzDecoder;

use dustat_core::node::{NodeId, ReadState};
use dustat_core::tree::Tree;

pub type CacheFileReader = dustat_cache::CacheReader<BufReader<GzDecoder<File>>>;

pub enum Job {
    LocalDir { dir: NodeId, path: PathBuf },
    Cache { dir: NodeId, reader: Box<CacheFileReader> },
}

impl Job {
    pub fn dir(&self) -> NodeId {
        match self {
            Job::LocalDir { dir, .. } => *dir,
            Job::Cache { dir, .. } => *dir,
        }
    }
}

/// FIFO of ready jobs plus a separate blocked list, mirroring the original
/// two-list design (§4.4); nothing in this port currently parks a job on
/// the blocked list (there is no external-process job kind), but the slot
/// is kept so `abort()` has a single, correct place to drain.
#[derive(Default)]
pub struct JobQueue {
    ready: VecDeque<Job>,
    blocked: Vec<Job>,
}

impl JobQueue {
    pub fn new() -> Self {
        JobQueue::default()
    }

    pub fn push(&mut self, job: Job) {
        self.ready.push_back(job);
    }

    pub fn push_front(&mut self, job: Job) {
        self.ready.push_front(job);
    }

    pub fn pop(&mut self) -> Option<Job> {
        self.ready.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.blocked.is_empty()
    }

    /// Drops every queued job, marking the directory each was reading as
    /// `Aborted` so the tree reflects a partial, known-incomplete read
    /// rather than silently looking finished.
    pub fn abort(&mut self, tree: &mut Tree) {
        for job in self.ready.drain(..).chain(self.blocked.drain(..)) {
            tree.set_read_state(job.dir(), ReadState::Aborted);
        }
    }

    /// Drops every queued job reading `subtree_root` or one of its
    /// descendants, without marking anything aborted — used when a
    /// `.qdirstat.cache.gz` is discovered mid-scan and the whole subtree is
    /// about to be freed and replaced by a `CacheReadJob` (§4.4 step 3).
    pub fn kill_subtree(&mut self, tree: &Tree, subtree_root: NodeId) {
        self.ready.retain(|job| !tree.is_ancestor(subtree_root, job.dir()));
        self.blocked.retain(|job| !tree.is_ancestor(subtree_root, job.dir()));
    }
}
