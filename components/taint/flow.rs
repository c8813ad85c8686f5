/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Taint flows and the provenance DAG they point into.
//!
//! For example, the following piece of JavaScript:
//!
//! ```js
//! var a = location.hash;
//! var b = a.split('|')[0];
//! var c = b.substring(0, 5);
//! var d = c.toUpperCase();
//! ```
//!
//! results in the following flow for `d`, newest operation first:
//!
//! ```text
//! toUpperCase -> substring(0, 5) -> split('|') -> location.hash
//! ```
//!
//! `a`, `b`, `c` and `d` all share parts of this history, so nodes are
//! reference counted and shared between flows: there is exactly one node for
//! each of the operations above. The nodes form a DAG with one root per taint
//! source, and a flow is a path from any node back to its root.
//!
//! Nodes only ever point towards the root, and a node can only be given a
//! parent while nobody else holds a reference to it, so the graph cannot
//! contain cycles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;

use crate::operation::{TaintOperation, TaintSource};

#[cfg(not(feature = "thread-safe"))]
use std::rc::{Rc as NodeRef, Weak as WeakNodeRef};
#[cfg(feature = "thread-safe")]
use std::sync::{Arc as NodeRef, Weak as WeakNodeRef};

/// A node of the provenance DAG: one operation plus an owning edge to the
/// node of the operation that preceded it.
///
/// Nodes are only reachable through [`TaintFlow`] handles. Cloning a handle
/// increments the node's reference count; dropping the last handle frees the
/// node and every ancestor that is not referenced from anywhere else.
pub struct TaintNode {
    parent: TaintFlow,
    operation: TaintOperation,
}

impl TaintNode {
    /// Constructs a node on top of `parent`, taking over the parent handle.
    /// An empty parent flow makes this node a root.
    pub fn new(parent: TaintFlow, operation: TaintOperation) -> TaintNode {
        TaintNode { parent, operation }
    }

    pub fn operation(&self) -> &TaintOperation {
        &self.operation
    }

    /// Returns the parent node of this node or `None` if this is a root.
    pub fn parent(&self) -> Option<&TaintNode> {
        self.parent.head()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_empty()
    }

    /// Rewires the edge to the parent node, releasing the old parent.
    ///
    /// This requires exclusive access to the node, i.e. the node has not
    /// been handed out to any flow yet, which is what keeps the graph acyclic.
    pub fn set_parent(&mut self, parent: TaintFlow) {
        self.parent = parent;
    }
}

impl Drop for TaintNode {
    // Releasing a node might release its whole chain of ancestors. Unlink
    // them one by one instead of letting drop glue recurse, since chains can
    // be arbitrarily long.
    fn drop(&mut self) {
        let mut next = self.parent.head.take();
        while let Some(node) = next {
            next = match NodeRef::try_unwrap(node) {
                Ok(mut node) => node.parent.head.take(),
                Err(_) => None,
            };
        }
    }
}

impl fmt::Debug for TaintNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaintNode")
            .field("operation", &self.operation)
            .field("is_root", &self.is_root())
            .finish()
    }
}

/// A flow of tainted data through the engine: a handle to the newest node of
/// one path through the provenance DAG.
///
/// Copying a flow is O(1); it only bumps the reference count of the head
/// node. Two flows are equal iff they point at the very same node, not if
/// their histories merely look alike.
#[derive(Clone, Default)]
pub struct TaintFlow {
    head: Option<NodeRef<TaintNode>>,
}

impl TaintFlow {
    /// Creates a flow whose only node is a root for `source`.
    pub fn new(source: TaintSource) -> TaintFlow {
        TaintFlow::from_node(TaintNode::new(TaintFlow::default(), source))
    }

    /// Creates a flow whose head is the given, freshly built node.
    pub fn from_node(node: TaintNode) -> TaintFlow {
        TaintFlow {
            head: Some(NodeRef::new(node)),
        }
    }

    /// Returns the newest node of this flow.
    pub fn head(&self) -> Option<&TaintNode> {
        self.head.as_deref()
    }

    /// An empty flow carries no provenance at all.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The number of operations on this flow, the source included.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// The number of handles (flows and child nodes) referencing the head
    /// node, or zero for an empty flow.
    pub fn ref_count(&self) -> usize {
        self.head.as_ref().map_or(0, NodeRef::strong_count)
    }

    /// Returns the operation at the root of this flow.
    pub fn source(&self) -> Option<&TaintSource> {
        self.iter().last().map(TaintNode::operation)
    }

    /// Appends a new node for `operation` and moves the head of this flow to
    /// it. Extending an empty flow creates a new root.
    pub fn extend(&mut self, operation: TaintOperation) -> &mut TaintFlow {
        let parent = std::mem::take(self);
        *self = TaintFlow::from_node(TaintNode::new(parent, operation));
        self
    }

    /// Returns a new flow continuing this one with `operation`, leaving this
    /// flow untouched. Calling this repeatedly on the same flow fans the DAG
    /// out into independent branches.
    pub fn extended(&self, operation: TaintOperation) -> TaintFlow {
        TaintFlow::from_node(TaintNode::new(self.clone(), operation))
    }

    /// Iterates over the nodes of this flow, newest first.
    pub fn iter(&self) -> FlowIter<'_> {
        FlowIter {
            current: self.head(),
        }
    }

    /// Returns a handle that does not keep the head node alive.
    pub fn downgrade(&self) -> WeakTaintFlow {
        WeakTaintFlow {
            head: self.head.as_ref().map(NodeRef::downgrade),
        }
    }

    /// The address of the head node, used to identify shared nodes.
    pub(crate) fn node_id(&self) -> Option<usize> {
        self.head().map(node_address)
    }
}

pub(crate) fn node_address(node: &TaintNode) -> usize {
    node as *const TaintNode as usize
}

impl PartialEq for TaintFlow {
    fn eq(&self, other: &TaintFlow) -> bool {
        match (&self.head, &other.head) {
            (Some(a), Some(b)) => NodeRef::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for TaintFlow {}

impl Hash for TaintFlow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node_id().hash(state);
    }
}

impl fmt::Debug for TaintFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|node| node.operation().name()))
            .finish()
    }
}

impl<'a> IntoIterator for &'a TaintFlow {
    type Item = &'a TaintNode;
    type IntoIter = FlowIter<'a>;

    fn into_iter(self) -> FlowIter<'a> {
        self.iter()
    }
}

/// Walks a flow from its head to its source.
///
/// The iterator borrows the flow, so the flow outlives every node it yields.
#[derive(Clone)]
pub struct FlowIter<'a> {
    current: Option<&'a TaintNode>,
}

impl<'a> Iterator for FlowIter<'a> {
    type Item = &'a TaintNode;

    fn next(&mut self) -> Option<&'a TaintNode> {
        let node = self.current?;
        self.current = node.parent();
        Some(node)
    }
}

impl FusedIterator for FlowIter<'_> {}

/// A non-owning handle to the head of a flow.
#[derive(Clone, Default)]
pub struct WeakTaintFlow {
    head: Option<WeakNodeRef<TaintNode>>,
}

impl WeakTaintFlow {
    /// Returns the flow if its head node is still alive.
    pub fn upgrade(&self) -> Option<TaintFlow> {
        let head = self.head.as_ref()?.upgrade()?;
        Some(TaintFlow { head: Some(head) })
    }

    pub fn is_alive(&self) -> bool {
        self.head
            .as_ref()
            .is_some_and(|head| head.strong_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(flow: &TaintFlow) -> Vec<&str> {
        flow.iter().map(|node| node.operation().name()).collect()
    }

    #[test]
    fn extend_moves_head_and_keeps_history() {
        let mut flow = TaintFlow::new(TaintOperation::new("location.hash").source());
        flow.extend("split".into()).extend("substring".into());

        assert_eq!(names(&flow), ["substring", "split", "location.hash"]);
        assert_eq!(flow.len(), 3);
        assert_eq!(flow.source().map(TaintOperation::name), Some("location.hash"));
        assert!(flow.source().is_some_and(TaintOperation::is_source));
        let parent = flow.head().and_then(TaintNode::parent);
        assert_eq!(parent.map(|node| node.operation().name()), Some("split"));
    }

    #[test]
    fn extended_branches_without_moving_the_head() {
        let flow = TaintFlow::new("source".into());
        let left = flow.extended("left".into());
        let right = flow.extended("right".into());

        assert_eq!(names(&flow), ["source"]);
        assert_eq!(names(&left), ["left", "source"]);
        assert_eq!(names(&right), ["right", "source"]);
        assert_ne!(left, right);
        // One handle from `flow` and one from each child node.
        assert_eq!(flow.ref_count(), 3);
    }

    #[test]
    fn extending_an_empty_flow_creates_a_root() {
        let mut flow = TaintFlow::default();
        assert!(flow.is_empty());
        assert_eq!(flow.source(), None);
        flow.extend("concat".into());
        assert!(flow.head().is_some_and(TaintNode::is_root));
    }

    #[test]
    fn equality_is_identity() {
        let a = TaintFlow::new("source".into());
        let b = TaintFlow::new("source".into());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(TaintFlow::default(), TaintFlow::default());
    }

    #[test]
    fn set_parent_rewires_unshared_node() {
        let first = TaintFlow::new("first".into());
        let second = TaintFlow::new("second".into());
        let weak_first = first.downgrade();

        let mut node = TaintNode::new(first, "op".into());
        node.set_parent(second.clone());
        // The old parent lost its last reference.
        assert!(!weak_first.is_alive());

        let flow = TaintFlow::from_node(node);
        assert_eq!(names(&flow), ["op", "second"]);
        assert_eq!(second.ref_count(), 2);
    }

    #[test]
    fn releasing_a_long_chain_does_not_recurse() {
        let mut flow = TaintFlow::new("source".into());
        for _ in 0..200_000 {
            flow.extend("op".into());
        }
        assert_eq!(flow.len(), 200_001);
        let weak_root = {
            let mut root = flow.clone();
            while let Some(parent) = root.head().and_then(|node| node.parent.head.clone()) {
                root = TaintFlow { head: Some(parent) };
            }
            root.downgrade()
        };
        drop(flow);
        assert!(!weak_root.is_alive());
    }
}
