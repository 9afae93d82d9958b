//! The AST node model.
//!
//! Every value and every piece of program structure is the same
//! fixed-size record: a [`Kind`] (the type tag plus two payload
//! slots), an attribute word, and a packed source location. Nodes are
//! addressed by [`NodeId`] into the heap's slab; id 0 is the canonical
//! ZEN singleton, the "no value" value.

use bitflags::bitflags;
use koan_util::Sloc;

use crate::errors::ErrorKind;
use crate::heap::EnvId;
use crate::interp::Interp;
use crate::parser::Precedence;
use crate::strings::StrId;

/// Index of a node in the interpreter's slab. Stable for the node's
/// lifetime; reclaimed ids are reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The canonical "no value" node.
    pub const ZEN: NodeId = NodeId(0);

    #[inline]
    pub fn is_zen(self) -> bool {
        self == NodeId::ZEN
    }
}

/// A builtin operator: receives its operands unevaluated.
pub type BuiltinOp = fn(&mut Interp, NodeId, Sloc, NodeId, NodeId) -> NodeId;

/// A builtin function: receives the raw argument tree.
pub type BuiltinFn = fn(&mut Interp, NodeId, Sloc, NodeId) -> NodeId;

bitflags! {
    /// Node attribute bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Attr: u8 {
        const NO_EVALUATE            = 0x01;
        const NO_ASSIGN              = 0x02;
        const COPY_ON_ASSIGN         = 0x04;
        const RETAIN_COPY_ON_ASSIGN  = 0x08;
    }
}

/// The closed type enumeration, exposed to programs by the `type`
/// builtin. Discriminants are stable API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Zen = 0,
    Void,
    Boolean,
    Integer,
    Character,
    Float,
    String,
    Identifier,
    Operator,
    Sequence,
    Assemblage,
    Quoted,
    Reference,
    Function,
    OperatorFunction,
    OperatorAlias,
    BuiltinOperator,
    BuiltinFunction,
    Environment,
    Error,
    OpaqueDataType,
    OpaqueDataReference,
}

impl Tag {
    pub fn name(self) -> &'static str {
        match self {
            Tag::Zen => "Zen",
            Tag::Void => "Void",
            Tag::Boolean => "Boolean",
            Tag::Integer => "Integer",
            Tag::Character => "Character",
            Tag::Float => "Float",
            Tag::String => "String",
            Tag::Identifier => "Identifier",
            Tag::Operator => "Operator",
            Tag::Sequence => "Sequence",
            Tag::Assemblage => "Assemblage",
            Tag::Quoted => "Quoted",
            Tag::Reference => "Reference",
            Tag::Function => "Function",
            Tag::OperatorFunction => "OperatorFunction",
            Tag::OperatorAlias => "OperatorAlias",
            Tag::BuiltinOperator => "BuiltinOperator",
            Tag::BuiltinFunction => "BuiltinFunction",
            Tag::Environment => "Environment",
            Tag::Error => "Error",
            Tag::OpaqueDataType => "OpaqueDataType",
            Tag::OpaqueDataReference => "OpaqueDataReference",
        }
    }
}

/// The tagged payload: one variant per node type, carrying that
/// type's interpretation of the two payload slots.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kind {
    Zen,
    Void,
    Boolean(u64),
    Integer(u64),
    /// A code point; kept as a raw u32 so escape forms outside the
    /// scalar-value range survive arithmetic.
    Character(u32),
    Float(f64),
    String(StrId),
    /// The hash is computed once at construction so lookups never
    /// rehash.
    Identifier { name: StrId, hash: u64 },
    /// `op` indexes the operator table; `u32::MAX` marks a lexeme
    /// with no binding at parse time.
    Operator { op: u32, lhs: NodeId, rhs: NodeId },
    Sequence { lhs: NodeId, rhs: NodeId },
    Assemblage { lhs: NodeId, rhs: NodeId },
    Quoted(NodeId),
    Reference { name: StrId, value: NodeId },
    Function { params: NodeId, body: NodeId },
    OperatorFunction { name: StrId, func: NodeId, prec: Precedence },
    OperatorAlias { name: StrId, target: StrId },
    BuiltinOperator { name: StrId, f: BuiltinOp, prec: Precedence },
    BuiltinFunction { name: StrId, f: BuiltinFn },
    Environment { map: EnvId, outer: NodeId },
    Error(ErrorKind),
    /// An opaque-data instance: the type id plus two slots the type
    /// interprets for itself.
    OpaqueData { ty: u32, slot: u64, aux: u64 },
    OpaqueDataRef(NodeId),
}

impl Kind {
    pub fn tag(&self) -> Tag {
        match self {
            Kind::Zen => Tag::Zen,
            Kind::Void => Tag::Void,
            Kind::Boolean(_) => Tag::Boolean,
            Kind::Integer(_) => Tag::Integer,
            Kind::Character(_) => Tag::Character,
            Kind::Float(_) => Tag::Float,
            Kind::String(_) => Tag::String,
            Kind::Identifier { .. } => Tag::Identifier,
            Kind::Operator { .. } => Tag::Operator,
            Kind::Sequence { .. } => Tag::Sequence,
            Kind::Assemblage { .. } => Tag::Assemblage,
            Kind::Quoted(_) => Tag::Quoted,
            Kind::Reference { .. } => Tag::Reference,
            Kind::Function { .. } => Tag::Function,
            Kind::OperatorFunction { .. } => Tag::OperatorFunction,
            Kind::OperatorAlias { .. } => Tag::OperatorAlias,
            Kind::BuiltinOperator { .. } => Tag::BuiltinOperator,
            Kind::BuiltinFunction { .. } => Tag::BuiltinFunction,
            Kind::Environment { .. } => Tag::Environment,
            Kind::Error(_) => Tag::Error,
            Kind::OpaqueData { .. } => Tag::OpaqueDataType,
            Kind::OpaqueDataRef(_) => Tag::OpaqueDataReference,
        }
    }

    /// Numeric = Boolean, Integer, Character or Float.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Kind::Boolean(_) | Kind::Integer(_) | Kind::Character(_) | Kind::Float(_)
        )
    }

    /// Deferred = Reference or Quoted.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Kind::Reference { .. } | Kind::Quoted(_))
    }

    /// The name slot shared by everything the environment index can
    /// key on: strings, identifiers, references, operator entries.
    pub fn name(&self) -> Option<StrId> {
        match *self {
            Kind::String(s) => Some(s),
            Kind::Identifier { name, .. } => Some(name),
            Kind::Reference { name, .. } => Some(name),
            Kind::OperatorFunction { name, .. } => Some(name),
            Kind::OperatorAlias { name, .. } => Some(name),
            Kind::BuiltinOperator { name, .. } => Some(name),
            Kind::BuiltinFunction { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// One slab entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Node {
    pub kind: Kind,
    pub attr: Attr,
    pub sloc: Sloc,
}

impl Node {
    pub fn new(sloc: Sloc, kind: Kind) -> Self {
        Node { kind, attr: Attr::empty(), sloc }
    }

    #[inline]
    pub fn is_assignable(&self) -> bool {
        !self.attr.contains(Attr::NO_ASSIGN)
    }
}

impl Default for Node {
    fn default() -> Self {
        Node { kind: Kind::Zen, attr: Attr::empty(), sloc: Sloc::NONE }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_deferred_sets() {
        assert!(Kind::Boolean(1).is_numeric());
        assert!(Kind::Integer(1).is_numeric());
        assert!(Kind::Character(65).is_numeric());
        assert!(Kind::Float(1.0).is_numeric());
        assert!(!Kind::String(StrId(0)).is_numeric());

        assert!(Kind::Quoted(NodeId::ZEN).is_deferred());
        assert!(Kind::Reference { name: StrId(0), value: NodeId::ZEN }.is_deferred());
        assert!(!Kind::Zen.is_deferred());
    }

    #[test]
    fn test_tag_discriminants_are_stable() {
        assert_eq!(Tag::Zen as u8, 0);
        assert_eq!(Tag::Boolean as u8, 2);
        assert_eq!(Tag::OpaqueDataReference as u8, 21);
    }

    #[test]
    fn test_default_node_is_zen() {
        let n = Node::default();
        assert_eq!(n.kind.tag(), Tag::Zen);
        assert!(n.is_assignable());
    }
}
