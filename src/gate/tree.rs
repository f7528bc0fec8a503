//! Gate Tree
//!
//! Hierarchical enable/disable nodes for interaction gating. Each node has a
//! local `closed` flag (closed = conducting = input allowed, as in a circuit
//! breaker) and a derived `powered` flag: a node is powered iff it is closed
//! and its parent (if any) is powered.
//!
//! A single `close`/`open` on a node invalidates exactly the affected
//! subtree; leaves never re-derive global reachability on their own. State
//! change notifications are returned to the caller as event values rather
//! than broadcast through embedded callbacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Stable handle to a gate node.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GateId(pub u32);

/// Authorization key for `close`/`open` calls.
///
/// A mismatched key is an expected "not your gate" outcome, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateKey(pub u64);

/// Gate tree errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Handle does not name a live node.
    #[error("unknown gate handle {0:?}")]
    InvalidArgument(GateId),

    /// Attach would make a node its own ancestor.
    #[error("attaching {child:?} under {parent:?} would create a cycle")]
    WouldCycle {
        /// Intended parent.
        parent: GateId,
        /// Intended child.
        child: GateId,
    },

    /// Child is already attached to some parent.
    #[error("gate {0:?} is already attached to a parent")]
    AlreadyAttached(GateId),
}

/// Edge notification from a gate operation.
///
/// Only fired when the named flag actually changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateEvent {
    /// Node was forced closed (enabled) by an authorized `close`.
    Closed(GateId),
    /// Node was forced open (disabled) by an authorized `open`.
    Opened(GateId),
    /// Derived power came on.
    Powered(GateId),
    /// Derived power went off.
    Depowered(GateId),
}

/// A single gate node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateNode {
    /// Handle of this node.
    pub id: GateId,
    /// Authorization key for close/open.
    key: GateKey,
    /// Local intent: should this subtree be enabled.
    closed: bool,
    /// Derived: closed AND (no parent OR parent powered).
    powered: bool,
    /// Parent handle, if attached.
    parent: Option<GateId>,
    /// Directly attached children.
    children: Vec<GateId>,
}

/// Arena-style gate node storage with stable integer handles.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GateTree {
    nodes: BTreeMap<GateId, GateNode>,
    next_id: u32,
}

impl GateTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a detached node with the given authored initial state.
    ///
    /// The node's power is derived once the root propagation pass (or an
    /// attach) runs; see [`GateTree::propagate_from`].
    pub fn insert(&mut self, closed: bool, key: GateKey) -> GateId {
        let id = GateId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            GateNode {
                id,
                key,
                closed,
                powered: false,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    /// Does the tree contain a live node for this handle?
    #[inline]
    pub fn contains(&self, id: GateId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Derived power state. Unknown handles read as unpowered.
    #[inline]
    pub fn is_powered(&self, id: GateId) -> bool {
        self.nodes.get(&id).map(|n| n.powered).unwrap_or(false)
    }

    /// Local closed state. Unknown handles read as open.
    #[inline]
    pub fn is_closed(&self, id: GateId) -> bool {
        self.nodes.get(&id).map(|n| n.closed).unwrap_or(false)
    }

    /// Parent handle of a node, if attached.
    #[inline]
    pub fn parent_of(&self, id: GateId) -> Option<GateId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Register `child` under `parent`.
    ///
    /// Stale handles are a protocol violation; self-parenting or creating a
    /// cycle is a configuration error, rejected and logged, never corrected.
    /// The attached subtree is re-derived from the parent's power, and any
    /// resulting power edges are returned.
    pub fn attach(&mut self, parent: GateId, child: GateId) -> Result<Vec<GateEvent>, GateError> {
        if !self.nodes.contains_key(&parent) {
            return Err(GateError::InvalidArgument(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(GateError::InvalidArgument(child));
        }
        if self.nodes[&child].parent.is_some() {
            return Err(GateError::AlreadyAttached(child));
        }
        // Cycle check: walk the would-be parent's ancestor chain. The walk
        // follows handles, so it is safe against stale object identity.
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                error!(?parent, ?child, "gate attach rejected: would create a cycle");
                return Err(GateError::WouldCycle { parent, child });
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        debug!(?parent, ?child, "gate attached");

        let mut events = Vec::new();
        self.repropagate(child, &mut events);
        Ok(events)
    }

    /// Deregister `child` from `parent`.
    ///
    /// Detaching a non-member is a no-op success. The detached subtree
    /// becomes a root and is re-derived from its own closed state.
    pub fn detach(&mut self, parent: GateId, child: GateId) -> Result<Vec<GateEvent>, GateError> {
        if !self.nodes.contains_key(&parent) {
            return Err(GateError::InvalidArgument(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(GateError::InvalidArgument(child));
        }
        let is_member = self.nodes[&child].parent == Some(parent);
        if !is_member {
            return Ok(Vec::new());
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        debug!(?parent, ?child, "gate detached");

        let mut events = Vec::new();
        self.repropagate(child, &mut events);
        Ok(events)
    }

    /// Remove a node entirely.
    ///
    /// Detaches it from its parent; any children become roots and are
    /// re-derived. Power edges from the removal are returned. Removing an
    /// unknown handle is a no-op.
    pub fn remove(&mut self, id: GateId) -> Vec<GateEvent> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let parent = node.parent;
        let children = node.children.clone();

        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != id);
            }
        }
        self.nodes.remove(&id);

        let mut events = Vec::new();
        for child in children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = None;
            }
            self.repropagate(child, &mut events);
        }
        events
    }

    /// Force a node closed (enabled).
    ///
    /// Requires the node to be open and the key to match; a mismatched key
    /// is a silent no-op. Fires `Closed` plus any power edges in the
    /// affected subtree.
    pub fn close(&mut self, id: GateId, key: GateKey) -> Vec<GateEvent> {
        let Some(node) = self.nodes.get_mut(&id) else {
            debug!(?id, "close on unknown gate handle ignored");
            return Vec::new();
        };
        if node.closed || node.key != key {
            return Vec::new();
        }
        node.closed = true;

        let mut events = vec![GateEvent::Closed(id)];
        self.repropagate(id, &mut events);
        events
    }

    /// Force a node open (disabled).
    ///
    /// Requires the node to be closed, the key to match, and the parent (if
    /// any) to be unpowered; otherwise a silent no-op. Fires `Opened` plus
    /// any power edges in the affected subtree.
    pub fn open(&mut self, id: GateId, key: GateKey) -> Vec<GateEvent> {
        let Some(node) = self.nodes.get(&id) else {
            debug!(?id, "open on unknown gate handle ignored");
            return Vec::new();
        };
        if !node.closed || node.key != key {
            return Vec::new();
        }
        if let Some(parent) = node.parent {
            if self.is_powered(parent) {
                return Vec::new();
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.closed = false;
        }

        let mut events = vec![GateEvent::Opened(id)];
        self.repropagate(id, &mut events);
        events
    }

    /// Run the initial propagation pass from a root node.
    ///
    /// Called once at session start so descendants reflect their authored
    /// initial closed state. Returns the power edges fired.
    pub fn propagate_from(&mut self, root: GateId) -> Vec<GateEvent> {
        let mut events = Vec::new();
        self.repropagate(root, &mut events);
        events
    }

    /// Recompute `powered` for `start` and all descendants, depth-first,
    /// firing events only on edges.
    fn repropagate(&mut self, start: GateId, events: &mut Vec<GateEvent>) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let parent_powered = match node.parent {
                Some(p) => self.is_powered(p),
                None => true,
            };
            let derived = node.closed && parent_powered;
            let children = node.children.clone();

            if let Some(node) = self.nodes.get_mut(&id) {
                if node.powered != derived {
                    node.powered = derived;
                    events.push(if derived {
                        GateEvent::Powered(id)
                    } else {
                        GateEvent::Depowered(id)
                    });
                }
            }
            stack.extend(children);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KEY: GateKey = GateKey(7);
    const OTHER_KEY: GateKey = GateKey(8);

    fn chain(tree: &mut GateTree, n: usize) -> Vec<GateId> {
        let ids: Vec<GateId> = (0..n).map(|_| tree.insert(true, KEY)).collect();
        for w in ids.windows(2) {
            tree.attach(w[0], w[1]).unwrap();
        }
        tree.propagate_from(ids[0]);
        ids
    }

    /// The derived invariant, checked for every node.
    fn invariant_holds(tree: &GateTree, ids: &[GateId]) -> bool {
        ids.iter().all(|&id| {
            let parent_powered = tree
                .parent_of(id)
                .map(|p| tree.is_powered(p))
                .unwrap_or(true);
            tree.is_powered(id) == (tree.is_closed(id) && parent_powered)
        })
    }

    #[test]
    fn test_initial_propagation() {
        let mut tree = GateTree::new();
        let root = tree.insert(true, KEY);
        let mid = tree.insert(false, KEY);
        let leaf = tree.insert(true, KEY);
        tree.attach(root, mid).unwrap();
        tree.attach(mid, leaf).unwrap();

        let events = tree.propagate_from(root);

        assert!(tree.is_powered(root));
        assert!(!tree.is_powered(mid));
        // Leaf is closed but its parent is open, so no power reaches it
        assert!(!tree.is_powered(leaf));
        assert!(events.contains(&GateEvent::Powered(root)));
    }

    #[test]
    fn test_close_powers_subtree() {
        let mut tree = GateTree::new();
        let root = tree.insert(false, KEY);
        let leaf = tree.insert(true, KEY);
        tree.attach(root, leaf).unwrap();
        tree.propagate_from(root);
        assert!(!tree.is_powered(leaf));

        let events = tree.close(root, KEY);

        assert!(tree.is_powered(root));
        assert!(tree.is_powered(leaf));
        assert_eq!(
            events,
            vec![
                GateEvent::Closed(root),
                GateEvent::Powered(root),
                GateEvent::Powered(leaf),
            ]
        );
    }

    #[test]
    fn test_open_depowers_subtree() {
        let mut tree = GateTree::new();
        let ids = chain(&mut tree, 3);
        assert!(tree.is_powered(ids[2]));

        let events = tree.open(ids[0], KEY);

        assert!(!tree.is_powered(ids[0]));
        assert!(!tree.is_powered(ids[1]));
        assert!(!tree.is_powered(ids[2]));
        assert!(events.contains(&GateEvent::Opened(ids[0])));
        assert!(events.contains(&GateEvent::Depowered(ids[2])));
    }

    #[test]
    fn test_open_refused_while_parent_powered() {
        let mut tree = GateTree::new();
        let ids = chain(&mut tree, 2);

        // Parent is powered, so the child's open is refused
        let events = tree.open(ids[1], KEY);
        assert!(events.is_empty());
        assert!(tree.is_closed(ids[1]));

        // Depower the parent, now the child may open
        tree.open(ids[0], KEY);
        let events = tree.open(ids[1], KEY);
        assert!(events.contains(&GateEvent::Opened(ids[1])));
        assert!(!tree.is_closed(ids[1]));
    }

    #[test]
    fn test_wrong_key_is_silent_noop() {
        let mut tree = GateTree::new();
        let root = tree.insert(true, KEY);
        tree.propagate_from(root);

        assert!(tree.open(root, OTHER_KEY).is_empty());
        assert!(tree.is_closed(root));

        tree.open(root, KEY);
        assert!(tree.close(root, OTHER_KEY).is_empty());
        assert!(!tree.is_closed(root));
    }

    #[test]
    fn test_no_redundant_refire() {
        let mut tree = GateTree::new();
        let root = tree.insert(false, KEY);
        tree.propagate_from(root);

        // Already open: nothing to do
        assert!(tree.open(root, KEY).is_empty());

        let events = tree.close(root, KEY);
        assert_eq!(
            events,
            vec![GateEvent::Closed(root), GateEvent::Powered(root)]
        );

        // Already closed: nothing to do
        assert!(tree.close(root, KEY).is_empty());
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut tree = GateTree::new();
        let ids = chain(&mut tree, 3);

        // Self-parenting
        let lone = tree.insert(true, KEY);
        assert_eq!(
            tree.attach(lone, lone),
            Err(GateError::WouldCycle {
                parent: lone,
                child: lone
            })
        );

        // Ancestor as descendant: ids[0] is an ancestor of ids[2]
        assert!(matches!(
            tree.attach(ids[2], ids[0]),
            Err(GateError::WouldCycle { .. })
        ));
    }

    #[test]
    fn test_attach_stale_handle_is_invalid_argument() {
        let mut tree = GateTree::new();
        let root = tree.insert(true, KEY);
        let stale = GateId(999);

        assert_eq!(
            tree.attach(root, stale),
            Err(GateError::InvalidArgument(stale))
        );
        assert_eq!(
            tree.detach(stale, root),
            Err(GateError::InvalidArgument(stale))
        );
    }

    #[test]
    fn test_detach_non_member_is_noop_success() {
        let mut tree = GateTree::new();
        let a = tree.insert(true, KEY);
        let b = tree.insert(true, KEY);

        assert_eq!(tree.detach(a, b), Ok(Vec::new()));
    }

    #[test]
    fn test_remove_reroots_children() {
        let mut tree = GateTree::new();
        let ids = chain(&mut tree, 3);

        tree.remove(ids[1]);

        assert!(!tree.contains(ids[1]));
        assert_eq!(tree.parent_of(ids[2]), None);
        // Re-rooted child derives power from its own closed state
        assert!(tree.is_powered(ids[2]));
    }

    proptest! {
        /// powered(n) == closed(n) && (no parent || powered(parent)) after
        /// any mix of close/open calls anywhere in a random chain-of-forks
        /// tree.
        #[test]
        fn prop_power_invariant(
            shape in proptest::collection::vec(0usize..8, 1..12),
            ops in proptest::collection::vec((0usize..12, prop::bool::ANY), 0..24),
        ) {
            let mut tree = GateTree::new();
            let mut ids = vec![tree.insert(true, KEY)];
            for parent_pick in shape {
                let id = tree.insert(true, KEY);
                let parent = ids[parent_pick % ids.len()];
                tree.attach(parent, id).unwrap();
                ids.push(id);
            }
            tree.propagate_from(ids[0]);

            for (pick, do_close) in ops {
                let id = ids[pick % ids.len()];
                if do_close {
                    tree.close(id, KEY);
                } else {
                    tree.open(id, KEY);
                }
                prop_assert!(invariant_holds(&tree, &ids));
            }
        }
    }
}
