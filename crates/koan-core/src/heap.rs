//! The interpreter heap.
//!
//! Owns the node slab, the string pool and the environment-map pool,
//! plus the shadow stack and the adaptive collect threshold. All three
//! pools are collected in one tri-colour cycle: flip the epoch, mark
//! transitively from the roots and the shadow stack with an explicit
//! work list, sweep whatever stayed in the old colour. The node sweep
//! hands opaque-data nodes to the type registry so attached resources
//! are released first.
//!
//! Allocation never collects; collection runs only at the safe points
//! the interpreter chooses (between top-level expressions, between
//! import steps, after loop iterations). Allocation fails only when
//! the configured budget is exhausted, and that failure surfaces as
//! the language's OutOfMemory value, not a panic.

use koan_gc::{Arena, ShadowStack, Threshold};
use koan_util::Sloc;
use tracing::debug;

use crate::ast::{Attr, Kind, Node, NodeId};
use crate::mapvec::MapVec;
use crate::odt::OdtRegistry;
use crate::strings::{StrId, StrPool};

/// Index of an environment map in the heap's pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnvId(pub u32);

#[derive(Debug)]
pub struct Heap {
    nodes: Arena<Node>,
    strings: StrPool,
    envs: Arena<MapVec>,
    stack: ShadowStack<NodeId>,
    threshold: Threshold,
    /// Hard ceiling on total live allocations across the pools.
    budget: usize,
    collections: u64,
}

impl Heap {
    pub fn new() -> Self {
        let mut heap = Heap {
            nodes: Arena::new(),
            strings: StrPool::new(),
            envs: Arena::new(),
            stack: ShadowStack::new(),
            threshold: Threshold::new(),
            budget: usize::MAX / 2,
            collections: 0,
        };
        // Slot 0 is the ZEN singleton.
        let zen = heap.nodes.alloc(Node::default());
        debug_assert_eq!(zen, NodeId::ZEN.0);
        heap
    }

    pub fn with_budget(budget: usize) -> Self {
        let mut heap = Heap::new();
        heap.budget = budget;
        heap
    }

    // ---- accessors ------------------------------------------------

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id.0)
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id.0)
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> Kind {
        self.nodes.get(id.0).kind
    }

    #[inline]
    pub fn attr(&self, id: NodeId) -> Attr {
        self.nodes.get(id.0).attr
    }

    #[inline]
    pub fn sloc(&self, id: NodeId) -> Sloc {
        self.nodes.get(id.0).sloc
    }

    #[inline]
    pub fn str(&self, id: StrId) -> &str {
        self.strings.get(id)
    }

    #[inline]
    pub fn map(&self, id: EnvId) -> &MapVec {
        self.envs.get(id.0)
    }

    #[inline]
    pub fn map_mut(&mut self, id: EnvId) -> &mut MapVec {
        self.envs.get_mut(id.0)
    }

    // ---- allocation -----------------------------------------------

    #[inline]
    pub fn live(&self) -> usize {
        self.nodes.live() + self.strings.live() + self.envs.live()
    }

    #[inline]
    fn in_budget(&self) -> bool {
        self.live() < self.budget
    }

    /// Allocate a node and push it on the shadow stack. `None` means
    /// the budget is exhausted; the caller substitutes the
    /// pre-allocated OutOfMemory value.
    pub fn try_new_node(&mut self, sloc: Sloc, kind: Kind) -> Option<NodeId> {
        if !self.in_budget() {
            return None;
        }
        let id = NodeId(self.nodes.alloc(Node::new(sloc, kind)));
        self.stack.push(id);
        Some(id)
    }

    /// Duplicate a node into a fresh slot with a new location. ZEN
    /// duplicates to itself.
    pub fn try_dup_node(&mut self, sloc: Sloc, id: NodeId) -> Option<NodeId> {
        if id.is_zen() {
            return Some(id);
        }
        if !self.in_budget() {
            return None;
        }
        let mut node = *self.node(id);
        node.sloc = sloc;
        let dup = NodeId(self.nodes.alloc(node));
        self.stack.push(dup);
        Some(dup)
    }

    pub fn new_str(&mut self, s: &str) -> StrId {
        self.strings.alloc(s)
    }

    pub fn new_str_owned(&mut self, s: String) -> StrId {
        self.strings.alloc_owned(s)
    }

    pub fn new_map(&mut self) -> EnvId {
        EnvId(self.envs.alloc(MapVec::new()))
    }

    /// Find the slot in `map` whose node is named `name`. The trie is
    /// consulted with the precomputed hash; collisions fall back to a
    /// byte comparison in insertion order.
    pub fn env_locate(&self, map: EnvId, hash: u64, name: &str) -> Option<usize> {
        let m = self.envs.get(map.0);
        m.get_index(hash, |index| {
            let item = m.items()[index];
            match self.nodes.get(item.0).kind.name() {
                Some(s) => self.strings.get(s) == name,
                None => false,
            }
        })
    }

    // ---- shadow stack ---------------------------------------------

    #[inline]
    pub fn stack_top(&self) -> usize {
        self.stack.top()
    }

    #[inline]
    pub fn gc_push(&mut self, id: NodeId) -> NodeId {
        self.stack.push(id);
        id
    }

    #[inline]
    pub fn gc_revert(&mut self, top: usize) {
        self.stack.revert(top);
    }

    #[inline]
    pub fn gc_return(&mut self, top: usize, id: NodeId) -> NodeId {
        self.stack.ret(top, id)
    }

    // ---- collection -----------------------------------------------

    /// Should the next safe point collect?
    #[inline]
    pub fn wants_collect(&self) -> bool {
        self.live() >= self.threshold.limit()
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Stop-the-world mark-sweep over all three pools. `roots` are the
    /// interpreter's named roots; the shadow stack is always a root.
    /// Returns the number of nodes reclaimed.
    pub fn collect(&mut self, roots: &[NodeId], odt: &mut OdtRegistry) -> usize {
        self.collections += 1;
        self.nodes.begin_cycle();
        self.strings.begin_cycle();
        self.envs.begin_cycle();

        let mut work: Vec<NodeId> = Vec::with_capacity(64);
        work.push(NodeId::ZEN);
        work.extend_from_slice(roots);
        work.extend(self.stack.iter().copied());

        while let Some(id) = work.pop() {
            if !self.nodes.mark(id.0) {
                continue;
            }
            match self.nodes.get(id.0).kind {
                Kind::String(s) => self.strings.mark(s),
                Kind::Identifier { name, .. } => self.strings.mark(name),
                Kind::Operator { lhs, rhs, .. }
                | Kind::Sequence { lhs, rhs }
                | Kind::Assemblage { lhs, rhs } => {
                    work.push(lhs);
                    work.push(rhs);
                }
                Kind::Quoted(inner) | Kind::OpaqueDataRef(inner) => work.push(inner),
                Kind::Reference { name, value } => {
                    self.strings.mark(name);
                    work.push(value);
                }
                Kind::Function { params, body } => {
                    work.push(params);
                    work.push(body);
                }
                Kind::OperatorFunction { name, func, .. } => {
                    self.strings.mark(name);
                    work.push(func);
                }
                Kind::OperatorAlias { name, target } => {
                    self.strings.mark(name);
                    self.strings.mark(target);
                }
                Kind::BuiltinOperator { name, .. } | Kind::BuiltinFunction { name, .. } => {
                    self.strings.mark(name);
                }
                Kind::Environment { map, outer } => {
                    work.push(outer);
                    if self.envs.mark(map.0) {
                        work.extend(self.envs.get(map.0).items().iter().copied());
                    }
                }
                Kind::OpaqueData { ty, slot, .. } => {
                    odt.mark(ty, slot, &mut |child| work.push(child));
                }
                Kind::Zen
                | Kind::Void
                | Kind::Boolean(_)
                | Kind::Integer(_)
                | Kind::Character(_)
                | Kind::Float(_)
                | Kind::Error(_) => {}
            }
        }

        let swept_nodes = self.nodes.sweep(|_, node| {
            if let Kind::OpaqueData { ty, slot, .. } = node.kind {
                odt.sweep(ty, slot);
            }
        });
        let swept_strs = self.strings.sweep();
        let swept_envs = self.envs.sweep(|_, _| {});

        let live = self.live();
        self.threshold.retune(live);
        debug!(
            swept_nodes,
            swept_strs,
            swept_envs,
            live,
            threshold = self.threshold.limit(),
            "collection"
        );
        swept_nodes
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odt::OdtRegistry;

    fn int(heap: &mut Heap, v: u64) -> NodeId {
        heap.try_new_node(Sloc::NONE, Kind::Integer(v)).unwrap()
    }

    #[test]
    fn test_zen_is_slot_zero_and_survives() {
        let mut heap = Heap::new();
        let mut odt = OdtRegistry::new();
        assert_eq!(heap.kind(NodeId::ZEN), Kind::Zen);
        heap.collect(&[], &mut odt);
        assert_eq!(heap.kind(NodeId::ZEN), Kind::Zen);
    }

    #[test]
    fn test_temporaries_reclaimed_root_kept() {
        let mut heap = Heap::new();
        let mut odt = OdtRegistry::new();

        let top = heap.stack_top();
        let root = int(&mut heap, 7);
        for i in 0..100_000u64 {
            let tmp = heap.try_new_node(Sloc::NONE, Kind::Integer(i)).unwrap();
            heap.gc_return(top, if i % 2 == 0 { root } else { tmp });
        }
        heap.gc_return(top, root);
        heap.collect(&[], &mut odt);

        // Within a small constant of the retained root.
        assert!(heap.live() <= 4, "live = {}", heap.live());
        assert_eq!(heap.kind(root), Kind::Integer(7));
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let mut odt = OdtRegistry::new();

        let top = heap.stack_top();
        // An environment whose slot refers back to the environment.
        let map = heap.new_map();
        let env = heap
            .try_new_node(Sloc::NONE, Kind::Environment { map, outer: NodeId::ZEN })
            .unwrap();
        heap.map_mut(map).push(env);

        heap.gc_revert(top);
        let before = heap.live();
        heap.collect(&[], &mut odt);
        assert!(heap.live() < before);
    }

    #[test]
    fn test_strings_are_leaves() {
        let mut heap = Heap::new();
        let mut odt = OdtRegistry::new();

        let top = heap.stack_top();
        let s = heap.new_str("kept");
        let node = heap.try_new_node(Sloc::NONE, Kind::String(s)).unwrap();
        let dead = heap.new_str("dropped");
        let _ = dead;
        heap.gc_return(top, node);
        heap.collect(&[], &mut odt);

        assert_eq!(heap.str(s), "kept");
        assert_eq!(heap.strings.live(), 1);
    }

    #[test]
    fn test_budget_exhaustion_returns_none() {
        let mut heap = Heap::with_budget(4);
        while heap.try_new_node(Sloc::NONE, Kind::Void).is_some() {}
        assert!(heap.try_new_node(Sloc::NONE, Kind::Void).is_none());
    }
}
