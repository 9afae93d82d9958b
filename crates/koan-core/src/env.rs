//! Environment operations.
//!
//! An environment is a node owning a HAMT map-vector whose named
//! slots are Reference nodes, plus an outer link. `locate` consults
//! one environment; `lookup` chases the outer chain to a depth limit
//! (0 = unbounded). `define` appends and indexes; `addenv` is
//! locate-then-define with duplicate names rejected.
//!
//! Parameter binding walks the parameter and argument sequences in
//! lockstep: a tagged parameter (`name: default`) binds by value with
//! the default evaluated in caller scope when the argument is absent;
//! an untagged parameter binds by reference so assignments inside the
//! callee propagate; excess parameters bind to ZEN and excess
//! arguments pack into the last parameter as a sequence.

use koan_util::{memhash, Sloc};

use crate::ast::{Attr, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::Interp;

impl Interp {
    /// The slot index of `name` in exactly this environment.
    pub fn locate(&self, env: NodeId, hash: u64, name: &str) -> Option<usize> {
        match self.kind(env) {
            Kind::Environment { map, .. } => self.heap.env_locate(map, hash, name),
            _ => None,
        }
    }

    /// Look `name` up through the scope chain. `depth` limits how many
    /// environments are consulted; 0 means unbounded. Returns ZEN on a
    /// miss.
    pub fn lookup(&self, env: NodeId, hash: u64, name: &str, depth: usize) -> NodeId {
        let mut env = env;
        let mut remaining = depth;
        loop {
            let Kind::Environment { map, outer } = self.kind(env) else {
                return NodeId::ZEN;
            };
            if let Some(index) = self.heap.env_locate(map, hash, name) {
                return self.heap.map(map).at(index).unwrap_or(NodeId::ZEN);
            }
            if depth != 0 {
                remaining -= 1;
                if remaining == 0 {
                    return NodeId::ZEN;
                }
            }
            if outer.is_zen() {
                return NodeId::ZEN;
            }
            env = outer;
        }
    }

    /// Append `def` to the environment's vector and index it under
    /// `hash`, applying `attr` to the definition.
    pub fn define(&mut self, env: NodeId, hash: u64, def: NodeId, attr: Attr) -> Option<usize> {
        let Kind::Environment { map, .. } = self.kind(env) else {
            return None;
        };
        if !attr.is_empty() {
            self.heap.node_mut(def).attr |= attr;
        }
        let m = self.heap.map_mut(map);
        let index = m.push(def);
        m.map_index(hash, index);
        Some(index)
    }

    /// Slot index of a name node in exactly this environment.
    pub fn atenv(&self, env: NodeId, ident: NodeId) -> Option<usize> {
        let (name, hash) = match self.kind(ident) {
            Kind::Identifier { name, hash } => (name, hash),
            Kind::String(s) => (s, memhash(self.str(s).as_bytes(), 0)),
            _ => return None,
        };
        let name = self.str(name).to_owned();
        self.locate(env, hash, &name)
    }

    /// Look a name node up against one environment, no scope chasing.
    pub fn inenv(&self, env: NodeId, ident: NodeId) -> NodeId {
        let (name, hash) = match self.kind(ident) {
            Kind::Identifier { name, hash } => (name, hash),
            Kind::String(s) => (s, memhash(self.str(s).as_bytes(), 0)),
            _ => return NodeId::ZEN,
        };
        let name = self.str(name);
        // Split borrow through a local copy of the key.
        let key = name.to_owned();
        self.lookup(env, hash, &key, 1)
    }

    /// Bind `ident` to `def` as a fresh named Reference. Duplicate
    /// names and non-name keys yield InvalidOperand.
    pub fn addenv(
        &mut self,
        env: NodeId,
        sloc: Sloc,
        ident: NodeId,
        def: NodeId,
        attr: Attr,
    ) -> NodeId {
        let (name, hash) = match self.kind(ident) {
            Kind::Identifier { name, hash } => (name, hash),
            Kind::String(s) => (s, memhash(self.str(s).as_bytes(), 0)),
            _ => return self.error(sloc, ErrorKind::InvalidOperand),
        };
        let key = self.str(name).to_owned();
        if self.locate(env, hash, &key).is_some() {
            return self.error(sloc, ErrorKind::InvalidOperand);
        }
        let reference = self.new_node(sloc, Kind::Reference { name, value: def });
        if self.is_error(reference) {
            return reference;
        }
        self.define(env, hash, reference, attr);
        reference
    }

    pub fn addenv_named(
        &mut self,
        env: NodeId,
        sloc: Sloc,
        name: &str,
        def: NodeId,
        attr: Attr,
    ) -> NodeId {
        let ident = self.new_identifier(sloc, name);
        self.addenv(env, sloc, ident, def, attr)
    }

    fn addenv_arg(&mut self, to: NodeId, env: NodeId, sloc: Sloc, ident: NodeId, arg: NodeId) {
        let mut ident = ident;
        let mut arg = arg;
        if self.is_tag(ident) {
            // Tagged parameter: by value, defaulting from the tag.
            if let Kind::Operator { lhs, rhs, .. } = self.kind(ident) {
                if arg.is_zen() {
                    arg = rhs;
                }
                ident = lhs;
            }
            let value = self.refeval(env, arg);
            let value = self.dup_node(sloc, value);
            self.addenv(to, sloc, ident, value, Attr::empty());
        } else {
            // Untagged parameter: by reference; the call-site chain is
            // retained.
            let value = self.subeval(env, arg);
            self.addenv(to, sloc, ident, value, Attr::empty());
        }
    }

    /// Bind a function's parameter sequence against an argument
    /// sequence, in lockstep.
    pub fn addenv_args(&mut self, to: NodeId, env: NodeId, sloc: Sloc, params: NodeId, args: NodeId) {
        let mut params = params;
        let mut args = args;

        loop {
            match (self.kind(params), self.kind(args)) {
                (
                    Kind::Sequence { lhs: p, rhs: prest },
                    Kind::Sequence { lhs: a, rhs: arest },
                ) => {
                    self.addenv_arg(to, env, sloc, p, a);
                    params = prest;
                    args = arest;
                }
                _ => break,
            }
        }

        if let Kind::Sequence { lhs, rhs } = self.kind(params) {
            // More parameters than arguments: the next takes whatever
            // is left, the rest bind to ZEN.
            self.addenv_arg(to, env, sloc, lhs, args);
            params = rhs;
            while let Kind::Sequence { lhs, rhs } = self.kind(params) {
                self.addenv_arg(to, env, sloc, lhs, NodeId::ZEN);
                params = rhs;
            }
            self.addenv_arg(to, env, sloc, params, NodeId::ZEN);
        } else {
            // Equal lengths bind one to one; excess arguments stay
            // packed as a trailing sequence on the last parameter.
            self.addenv_arg(to, env, sloc, params, args);
        }
    }

    /// Bind an operator function's one or two parameters to the left
    /// and right operands.
    pub fn addenv_operands(
        &mut self,
        to: NodeId,
        env: NodeId,
        sloc: Sloc,
        params: NodeId,
        lexpr: NodeId,
        rexpr: NodeId,
    ) {
        let lexpr = if matches!(self.kind(lexpr), Kind::Identifier { .. }) {
            self.subeval(env, lexpr)
        } else {
            lexpr
        };
        let rexpr = if matches!(self.kind(rexpr), Kind::Identifier { .. }) {
            self.subeval(env, rexpr)
        } else {
            rexpr
        };

        if let Kind::Sequence { lhs, rhs } = self.kind(params) {
            self.addenv(to, sloc, lhs, lexpr, Attr::empty());
            let mut params = rhs;
            if let Kind::Sequence { lhs, rhs } = self.kind(params) {
                self.addenv(to, sloc, lhs, rexpr, Attr::empty());
                params = rhs;
                while let Kind::Sequence { lhs, rhs } = self.kind(params) {
                    self.addenv(to, sloc, lhs, NodeId::ZEN, Attr::empty());
                    params = rhs;
                }
                if !params.is_zen() {
                    self.addenv(to, sloc, params, NodeId::ZEN, Attr::empty());
                }
            } else {
                self.addenv(to, sloc, params, rexpr, Attr::empty());
            }
        } else {
            let operand = if !lexpr.is_zen() { lexpr } else { rexpr };
            self.addenv(to, sloc, params, operand, Attr::empty());
        }
    }

    /// Expose the process arguments as `argv`/`argc` in an
    /// environment.
    pub fn addenv_argv(&mut self, to: NodeId, sloc: Sloc, args: &[String]) {
        let argv = self.new_env(sloc, NodeId::ZEN);
        self.addenv_named(to, sloc, "argv", argv, Attr::empty());

        for arg in args {
            let node = self.new_string_node(sloc, arg);
            if let Kind::Environment { map, .. } = self.kind(argv) {
                self.heap.map_mut(map).push(node);
            }
        }

        let argc = self.new_node(sloc, Kind::Integer(args.len() as u64));
        self.addenv_named(to, sloc, "argc", argc, Attr::empty());
    }
}
