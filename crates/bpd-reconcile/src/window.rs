//! Window selection.
//!
//! The device exposes a fixed window of its most recent measurements,
//! front-filled each cycle: index 0 is the newest. A diff of `d` therefore
//! maps to the first `min(d, L)` entries of each list.

use bpd_config::{NodeIds, NodeRef};

/// How much of the measurement window one diff consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub diff: i64,
    /// Pairs available on the device (`L`).
    pub window_len: usize,
    /// Pairs to read, `min(diff, L)`.
    pub taken: usize,
}

impl Window {
    pub fn select(diff: i64, window_len: usize) -> Self {
        let wanted = usize::try_from(diff.max(0)).unwrap_or(usize::MAX);
        Self {
            diff,
            window_len,
            taken: wanted.min(window_len),
        }
    }

    /// `true` when the diff exceeds the window.
    pub fn is_clamped(&self) -> bool {
        self.dropped() > 0
    }

    /// Rejects that have no measurement left on the device.
    pub fn dropped(&self) -> i64 {
        (self.diff - self.taken as i64).max(0)
    }
}

/// The nodes to read for one diff: the selected front nodes followed by the
/// selected rear nodes, in one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadPlan {
    pub window: Window,
    pub nodes: Vec<NodeRef>,
}

impl ReadPlan {
    pub fn for_diff(diff: i64, node_ids: &NodeIds) -> Self {
        let window = Window::select(diff, node_ids.window_len());
        let nodes = node_ids.front[..window.taken]
            .iter()
            .chain(node_ids.rear[..window.taken].iter())
            .cloned()
            .collect();
        Self { window, nodes }
    }

    /// Number of values the batched read must return.
    pub fn expected_values(&self) -> usize {
        self.window.taken * 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
