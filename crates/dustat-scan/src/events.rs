//! The model-interface event stream (§6.5): "The model exposes... It
//! emits: `starting_reading`, `read_job_finished(dir)`, `finished`,
//! `aborted`, `clearing`, `cleared`, `deleting_child(node)`,
//! `children_deleted`, `clearing_subtree(dir)`, `subtree_cleared`."
//!
//! The GUI that would normally subscribe to these is out of scope (§1), but
//! the event stream itself is part of the core's exposed interface, so
//! [`Scanner`](crate::scanner::Scanner) queues one per state transition and
//! any caller (a future view, a test) can drain them with
//! [`Scanner::drain_events`](crate::scanner::Scanner::drain_events).

use dustat_core::node::NodeId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanEvent {
    StartingReading,
    ReadJobFinished(NodeId),
    Finished,
    Aborted,
    Clearing,
    Cleared,
    DeletingChild(NodeId),
    ChildrenDeleted,
    ClearingSubtree(NodeId),
    SubtreeCleared,
}
