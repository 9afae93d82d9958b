//! The evaluator core.
//!
//! Three layered entry points: [`Interp::subeval`] performs a single
//! evaluation step (identifiers resolve to their Reference, operators
//! dispatch through the table), [`Interp::refeval`] additionally
//! chases Reference chains to their payload, and [`Interp::eval`]
//! additionally unwraps Quoted nodes. Each snapshots the shadow stack
//! on entry and returns through `gc_return`, so transient nodes die at
//! the next safe point.
//!
//! Assignment copies the value's record into the slot's node,
//! honouring the copy-on-assign attributes; under COPY_ON_ASSIGN the
//! slot is re-homed into a fresh node first so existing aliases stay
//! pinned to the old value.

use koan_util::Sloc;
use tracing::{debug, trace};

use crate::ast::{Attr, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::Interp;

/// Where an assignable node pointer lives.
#[derive(Clone, Copy, Debug)]
pub enum Slot {
    /// The value slot of a Reference node.
    RefValue(NodeId),
    /// A slot of an environment's vector.
    EnvItem(crate::heap::EnvId, usize),
}

impl Interp {
    // ---- reference chasing helpers --------------------------------

    /// Follow Reference links to the final payload.
    pub fn deref(&self, id: NodeId) -> NodeId {
        let mut id = id;
        while let Kind::Reference { value, .. } = self.kind(id) {
            id = value;
        }
        id
    }

    /// Follow Reference links to the LAST Reference in the chain.
    pub fn unwrapref(&self, id: NodeId) -> NodeId {
        let mut id = id;
        while let Kind::Reference { value, .. } = self.kind(id) {
            if matches!(self.kind(value), Kind::Reference { .. }) {
                id = value;
            } else {
                break;
            }
        }
        id
    }

    /// Strip Quoted wrappers.
    pub fn unquote(&self, id: NodeId) -> NodeId {
        let mut id = id;
        while let Kind::Quoted(inner) = self.kind(id) {
            id = inner;
        }
        id
    }

    /// Resolve an identifier to its bound value (not its Reference).
    pub fn dereference(&mut self, env: NodeId, id: NodeId) -> NodeId {
        if matches!(self.kind(id), Kind::Identifier { .. }) {
            let resolved = self.subeval(env, id);
            self.deref(resolved)
        } else {
            id
        }
    }

    /// Resolve an identifier through both deferred wrappers.
    pub fn undefer(&mut self, env: NodeId, id: NodeId) -> NodeId {
        if matches!(self.kind(id), Kind::Identifier { .. }) {
            let mut ast = self.subeval(env, id);
            loop {
                match self.kind(ast) {
                    Kind::Reference { value, .. } => ast = value,
                    Kind::Quoted(inner) => ast = inner,
                    _ => break,
                }
            }
            ast
        } else {
            id
        }
    }

    // ---- name resolution ------------------------------------------

    fn getref(&mut self, env: NodeId, sloc: Sloc, name: crate::strings::StrId, hash: u64) -> NodeId {
        let key = self.str(name).to_owned();
        let found = self.lookup(env, hash, &key, 0);
        if !found.is_zen() {
            found
        } else {
            self.error(sloc, ErrorKind::InvalidIdentifier)
        }
    }

    // ---- operator dispatch ----------------------------------------

    /// Dispatch an operator-table entry. Builtins are invoked with the
    /// unevaluated operands; operator functions get a fresh local
    /// scope; aliases chase to their target by name.
    pub fn evalop(
        &mut self,
        env: NodeId,
        sloc: Sloc,
        index: u32,
        lexpr: NodeId,
        rexpr: NodeId,
    ) -> NodeId {
        let mut index = index;
        loop {
            let op = self.getopr(index);
            debug!(index, name = self.getops(index), "dispatch");
            match self.kind(op) {
                Kind::BuiltinOperator { f, .. } => return f(self, env, sloc, lexpr, rexpr),
                Kind::OperatorFunction { func, .. } => {
                    let Kind::Function { params, body } = self.kind(func) else {
                        return self.error(sloc, ErrorKind::InvalidOperator);
                    };
                    let locals = self.new_env(sloc, env);
                    self.addenv_operands(locals, env, sloc, params, lexpr, rexpr);
                    return self.refeval(locals, body);
                }
                Kind::OperatorAlias { target, .. } => {
                    let name = self.str(target).to_owned();
                    let hash = koan_util::memhash(name.as_bytes(), 0);
                    match self.locate(self.operators, hash, &name) {
                        Some(i) => index = i as u32,
                        None => return self.error(sloc, ErrorKind::InvalidOperator),
                    }
                }
                Kind::Error(_) => return op,
                _ => return self.error(sloc, ErrorKind::InvalidOperator),
            }
        }
    }

    // ---- the three evaluation layers ------------------------------

    /// One evaluation step. Sequences are values and pass through;
    /// assemblages evaluate statement-wise to their last value.
    pub fn subeval(&mut self, env: NodeId, ast: NodeId) -> NodeId {
        let ts = self.heap.stack_top();
        let sloc = self.sloc(ast);
        trace!(node = ast.0, tag = self.kind(ast).tag().name(), "subeval");
        let result = match self.kind(ast) {
            Kind::Identifier { name, hash } => self.getref(env, sloc, name, hash),
            Kind::Operator { op, lhs, rhs } => self.evalop(env, sloc, op, lhs, rhs),
            Kind::Assemblage { .. } => {
                let mut walk = ast;
                let mut result = NodeId::ZEN;
                loop {
                    let (statement, rest) = match self.kind(walk) {
                        Kind::Assemblage { lhs, rhs } => (lhs, Some(rhs)),
                        _ => (walk, None),
                    };
                    if !statement.is_zen() {
                        result = self.refeval(env, statement);
                        if self.is_error(result) {
                            break;
                        }
                    }
                    match rest {
                        Some(rest) => walk = rest,
                        None => break,
                    }
                }
                result
            }
            Kind::OpaqueData { ty, .. } => self.odt.eval(ty, ast),
            _ => ast,
        };
        self.heap.gc_return(ts, result)
    }

    /// Evaluate, then unwrap Reference chains.
    pub fn refeval(&mut self, env: NodeId, ast: NodeId) -> NodeId {
        let mut ast = self.subeval(env, ast);
        while let Kind::Reference { value, .. } = self.kind(ast) {
            ast = self.subeval(env, value);
        }
        ast
    }

    /// Evaluate, then unwrap References and Quoted wrappers.
    pub fn eval(&mut self, env: NodeId, ast: NodeId) -> NodeId {
        let mut ast = self.refeval(env, ast);
        while let Kind::Quoted(inner) = self.kind(ast) {
            ast = self.refeval(env, inner);
        }
        ast
    }

    /// Evaluate a comma sequence element-wise, returning the last
    /// value; an error stops the walk.
    pub fn evalseq(&mut self, env: NodeId, ast: NodeId) -> NodeId {
        let mut ast = ast;
        while let Kind::Sequence { lhs, rhs } = self.kind(ast) {
            let value = self.eval(env, lhs);
            if self.is_error(value) {
                return value;
            }
            ast = rhs;
        }
        self.eval(env, ast)
    }

    /// Evaluate a name in an environment, as if typed there.
    pub fn eval_named(&mut self, env: NodeId, sloc: Sloc, name: &str) -> NodeId {
        let ident = self.new_identifier(sloc, name);
        self.eval(env, ident)
    }

    // ---- assignment -----------------------------------------------

    pub fn read_slot(&self, slot: Slot) -> NodeId {
        match slot {
            Slot::RefValue(reference) => match self.kind(reference) {
                Kind::Reference { value, .. } => value,
                _ => NodeId::ZEN,
            },
            Slot::EnvItem(map, index) => self.heap.map(map).at(index).unwrap_or(NodeId::ZEN),
        }
    }

    fn write_slot(&mut self, slot: Slot, id: NodeId) {
        match slot {
            Slot::RefValue(reference) => {
                if let Kind::Reference { name, .. } = self.kind(reference) {
                    self.heap.node_mut(reference).kind = Kind::Reference { name, value: id };
                }
            }
            Slot::EnvItem(map, index) => self.heap.map_mut(map).set(index, id),
        }
    }

    /// Copy `value`'s payload into the node held by `slot`.
    ///
    /// COPY_ON_ASSIGN re-homes the slot into a fresh node so aliases
    /// keep the old value; RETAIN_COPY_ON_ASSIGN preserves the flag
    /// across the copy; NO_ASSIGN is the caller's check.
    pub fn assign(&mut self, sloc: Sloc, slot: Slot, value: NodeId) -> NodeId {
        let mut target = self.read_slot(slot);
        if target == value {
            return target;
        }

        if target.is_zen() || self.attr(target).contains(Attr::COPY_ON_ASSIGN) {
            let fresh = self.new_node(sloc, Kind::Void);
            if self.is_error(fresh) {
                return fresh;
            }
            self.write_slot(slot, fresh);
            target = fresh;
        }

        let mut record = *self.heap.node(value);
        if record.attr.contains(Attr::COPY_ON_ASSIGN)
            && !record.attr.contains(Attr::RETAIN_COPY_ON_ASSIGN)
        {
            record.attr.remove(Attr::COPY_ON_ASSIGN);
        }
        record.sloc = sloc;
        *self.heap.node_mut(target) = record;
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::Options;

    fn interp() -> Interp {
        Interp::new(Options::default())
    }

    #[test]
    fn test_self_evaluating_kinds() {
        let mut i = interp();
        let n = i.new_node(Sloc::NONE, Kind::Integer(42));
        let g = i.globals;
        assert_eq!(i.subeval(g, n), n);
        assert_eq!(i.eval(g, n), n);
    }

    #[test]
    fn test_identifier_resolves_to_reference() {
        let mut i = interp();
        let g = i.globals;
        let value = i.new_node(Sloc::NONE, Kind::Integer(7));
        i.addenv_named(g, Sloc::NONE, "seven", value, Attr::empty());

        let ident = i.new_identifier(Sloc::NONE, "seven");
        let step = i.subeval(g, ident);
        assert!(matches!(i.kind(step), Kind::Reference { .. }));
        let full = i.refeval(g, ident);
        assert_eq!(i.kind(full), Kind::Integer(7));
    }

    #[test]
    fn test_unknown_identifier_is_invalid() {
        let mut i = interp();
        let g = i.globals;
        let ident = i.new_identifier(Sloc::NONE, "nope");
        let r = i.refeval(g, ident);
        assert_eq!(i.kind(r), Kind::Error(ErrorKind::InvalidIdentifier));
    }

    #[test]
    fn test_quoted_blocks_one_round() {
        let mut i = interp();
        let g = i.globals;
        let inner = i.new_identifier(Sloc::NONE, "nope");
        let quoted = i.new_node(Sloc::NONE, Kind::Quoted(inner));
        // refeval keeps the quote; eval unwraps and evaluates.
        assert_eq!(i.refeval(g, quoted), quoted);
        let r = i.eval(g, quoted);
        assert!(i.is_error(r));
    }

    #[test]
    fn test_assign_rehomes_copy_on_assign() {
        let mut i = interp();
        let old = i.new_node(Sloc::NONE, Kind::Integer(1));
        i.heap.node_mut(old).attr |= Attr::COPY_ON_ASSIGN;
        let name = i.heap.new_str("r");
        let reference = i.new_node(Sloc::NONE, Kind::Reference { name, value: old });

        let new_value = i.new_node(Sloc::NONE, Kind::Integer(2));
        let target = i.assign(Sloc::NONE, Slot::RefValue(reference), new_value);

        // The reference now points at a fresh node; the alias target
        // still holds the old value.
        assert_ne!(target, old);
        assert_eq!(i.kind(old), Kind::Integer(1));
        assert_eq!(i.kind(target), Kind::Integer(2));
        assert!(!i.attr(target).contains(Attr::COPY_ON_ASSIGN));
    }

    #[test]
    fn test_assign_in_place_without_flag() {
        let mut i = interp();
        let old = i.new_node(Sloc::NONE, Kind::Void);
        let name = i.heap.new_str("r");
        let reference = i.new_node(Sloc::NONE, Kind::Reference { name, value: old });

        let new_value = i.new_node(Sloc::NONE, Kind::Integer(2));
        let target = i.assign(Sloc::NONE, Slot::RefValue(reference), new_value);
        assert_eq!(target, old);
        assert_eq!(i.kind(old), Kind::Integer(2));
    }

    #[test]
    fn test_retain_copy_on_assign_keeps_flag() {
        let mut i = interp();
        let old = i.new_node(Sloc::NONE, Kind::Void);
        let name = i.heap.new_str("r");
        let reference = i.new_node(Sloc::NONE, Kind::Reference { name, value: old });

        let v = i.new_node(Sloc::NONE, Kind::Integer(3));
        i.heap.node_mut(v).attr |= Attr::COPY_ON_ASSIGN | Attr::RETAIN_COPY_ON_ASSIGN;
        let target = i.assign(Sloc::NONE, Slot::RefValue(reference), v);
        assert!(i.attr(target).contains(Attr::COPY_ON_ASSIGN));
        assert!(i.attr(target).contains(Attr::RETAIN_COPY_ON_ASSIGN));
    }
}
