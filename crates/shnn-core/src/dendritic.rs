//! Dendritic trees: per-layer input aggregation

use crate::connection::{ConnectionId, Opcode};

/// Identity of a [`DendriticNode`] within the arena owned by the
/// [`crate::structure::Network`] that built it
///
/// Mirrors the "integer id in an arena" design note (spec.md §9) used
/// throughout this crate to avoid ownership cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DendriticNodeId(pub u32);

impl DendriticNodeId {
    /// Wrap a raw index
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

/// What feeds a [`DendriticNode`]: either a connection's synaptic input, or
/// a child node whose own aggregate is combined upward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DendriticLeaf {
    /// Direct synaptic input from a connection
    Connection(ConnectionId),
    /// Aggregate of a child node, combined with `opcode`
    Child(DendriticNodeId),
}

/// One node of a layer's dendritic aggregation tree (spec.md §3)
///
/// Each leaf with incoming connections becomes a register in the layer's
/// input register bank (spec.md §4.5); internal nodes combine their
/// children's registers into their own via `opcode` once per timestep.
#[derive(Debug, Clone)]
pub struct DendriticNode {
    id: DendriticNodeId,
    parent: Option<DendriticNodeId>,
    children: Vec<DendriticLeaf>,
    /// Opcode this node uses to combine *its own* aggregate into its
    /// parent's register (ignored for the tree root)
    opcode: Opcode,
    /// Register index in the owning layer's input register bank
    register: u32,
    /// When true, this node's subtree contributes a multiplicative gate
    /// over an auxiliary matrix rather than being accumulated directly
    /// (spec.md §3, §GLOSSARY "second-order connection")
    second_order: bool,
}

impl DendriticNode {
    pub(crate) fn new(id: DendriticNodeId, register: u32, opcode: Opcode) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            opcode,
            register,
            second_order: false,
        }
    }

    /// This node's identity
    pub fn id(&self) -> DendriticNodeId {
        self.id
    }

    /// Parent node, if any (`None` for the layer's root)
    pub fn parent(&self) -> Option<DendriticNodeId> {
        self.parent
    }

    /// Children, in build order
    pub fn children(&self) -> &[DendriticLeaf] {
        &self.children
    }

    /// Opcode used to fold this node into its parent
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Index into the owning layer's input register bank
    pub fn register(&self) -> u32 {
        self.register
    }

    /// Whether this node gates rather than accumulates
    pub fn is_second_order(&self) -> bool {
        self.second_order
    }

    pub(crate) fn set_parent(&mut self, parent: DendriticNodeId) {
        self.parent = Some(parent);
    }

    pub(crate) fn push_child(&mut self, child: DendriticLeaf) {
        self.children.push(child);
    }

    pub(crate) fn mark_second_order(&mut self) {
        self.second_order = true;
    }
}

/// Arena of [`DendriticNode`]s for one layer
#[derive(Debug, Clone, Default)]
pub struct DendriticTree {
    nodes: Vec<DendriticNode>,
}

impl DendriticTree {
    /// An empty tree (the root is created lazily by the first call to
    /// [`DendriticTree::root_or_create`])
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Allocate a new node under `parent`, combined via `opcode`
    pub fn push_node(&mut self, parent: Option<DendriticNodeId>, opcode: Opcode) -> DendriticNodeId {
        let id = DendriticNodeId::new(self.nodes.len() as u32);
        let register = self.nodes.len() as u32;
        let mut node = DendriticNode::new(id, register, opcode);
        if let Some(parent_id) = parent {
            node.set_parent(parent_id);
        }
        self.nodes.push(node);
        if let Some(parent_id) = parent {
            self.nodes[parent_id.raw() as usize].push_child(DendriticLeaf::Child(id));
        }
        id
    }

    /// Attach a connection as a direct leaf of `node`
    pub fn attach_connection(&mut self, node: DendriticNodeId, connection: ConnectionId) {
        self.nodes[node.raw() as usize].push_child(DendriticLeaf::Connection(connection));
    }

    /// Mark `node`'s subtree as a second-order (gating) contribution
    pub fn mark_second_order(&mut self, node: DendriticNodeId) {
        self.nodes[node.raw() as usize].mark_second_order();
    }

    /// Number of registers this tree needs (one per node); this is *R_L*
    /// from spec.md §4.5
    pub fn register_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Borrow a node
    pub fn node(&self, id: DendriticNodeId) -> &DendriticNode {
        &self.nodes[id.raw() as usize]
    }

    /// All nodes, in allocation order (also a valid bottom-up-safe
    /// topological order: a child's id is always greater than its parent's)
    pub fn nodes(&self) -> &[DendriticNode] {
        &self.nodes
    }
}
