//! Builtin operators and functions.
//!
//! Two calling conventions: a builtin *operator* receives its operands
//! unevaluated (so control flow can be lazy), a builtin *function*
//! receives the raw argument tree. Operators install into the
//! `operators` environment; their table indices are captured in
//! [`OpIdx`] for fast dispatch and for the structural predicates the
//! evaluator relies on (is this node a tag? a bracket expression? a
//! range?).
//!
//! Families: `ops` (arithmetic, comparison, bitwise, shifts), `flow`
//! (conditionals and loops), `decl` (declaration, assignment, scope),
//! `apply` (application, block, array, range, sigil), `sysfn` (the
//! system environment) and `math` (the optional float family).

pub mod apply;
pub mod decl;
pub mod flow;
pub mod math;
pub mod ops;
pub mod sysfn;

use koan_util::{memhash, Sloc};

use crate::ast::{Attr, BuiltinOp, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::{Interp, Options};
use crate::parser::Precedence;

/// Captured operator-table indices.
#[derive(Clone, Copy, Debug)]
pub struct OpIdx {
    pub applicate: u32,
    pub global: u32,
    pub static_: u32,
    pub local: u32,
    pub tag: u32,
    pub tag_ref: u32,
    pub const_: u32,
    pub assign: u32,
    pub exchange: u32,
    pub if_: u32,
    pub ifnot: u32,
    pub case: u32,
    pub while_: u32,
    pub until: u32,
    pub land: u32,
    pub lor: u32,
    pub lt: u32,
    pub gt: u32,
    pub block: u32,
    pub array: u32,
    pub range: u32,
    pub sigil: u32,
}

impl Default for OpIdx {
    fn default() -> Self {
        OpIdx {
            applicate: u32::MAX,
            global: u32::MAX,
            static_: u32::MAX,
            local: u32::MAX,
            tag: u32::MAX,
            tag_ref: u32::MAX,
            const_: u32::MAX,
            assign: u32::MAX,
            exchange: u32::MAX,
            if_: u32::MAX,
            ifnot: u32::MAX,
            case: u32::MAX,
            while_: u32::MAX,
            until: u32::MAX,
            land: u32::MAX,
            lor: u32::MAX,
            lt: u32::MAX,
            gt: u32::MAX,
            block: u32::MAX,
            array: u32::MAX,
            range: u32::MAX,
            sigil: u32::MAX,
        }
    }
}

// ---- structural predicates ----------------------------------------

impl Interp {
    #[inline]
    pub fn is_op(&self, id: NodeId, index: u32) -> bool {
        index != u32::MAX
            && matches!(self.kind(id), Kind::Operator { op, .. } if op == index)
    }

    pub fn is_applicate(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.applicate)
    }

    pub fn is_tag(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.tag)
    }

    pub fn is_tag_ref(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.tag_ref)
    }

    pub fn is_const(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.const_)
    }

    pub fn is_assign(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.assign)
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.block)
    }

    /// A bracket expression (`[...]`), which doubles as the array
    /// constructor and the subscript form.
    pub fn is_array(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.array)
    }

    pub fn is_range(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.range)
    }

    pub fn is_land(&self, id: NodeId) -> bool {
        self.is_op(id, self.opidx.land)
    }

    /// The six relational operators occupy a contiguous index run.
    pub fn is_relational(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Kind::Operator { op, .. }
            if op >= self.opidx.lt && op <= self.opidx.gt)
    }

    // ---- scalar coercions -----------------------------------------

    pub fn to_integer_value(&self, id: NodeId) -> u64 {
        match self.kind(id) {
            Kind::Boolean(v) | Kind::Integer(v) => v,
            Kind::Character(c) => c as u64,
            Kind::Float(f) => f as u64,
            Kind::String(s) => crate::parser::decode_integer(self.str(s)),
            _ => 0,
        }
    }

    pub fn to_float_value(&self, id: NodeId) -> f64 {
        match self.kind(id) {
            Kind::Boolean(v) | Kind::Integer(v) => v as f64,
            Kind::Character(c) => c as f64,
            Kind::Float(f) => f,
            Kind::String(s) => self.str(s).trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn to_bool_value(&self, id: NodeId) -> bool {
        match self.kind(id) {
            Kind::Boolean(v) | Kind::Integer(v) => v != 0,
            Kind::Character(c) => c != 0,
            Kind::Float(f) => f != 0.0,
            Kind::String(s) => !self.str(s).is_empty(),
            _ => false,
        }
    }
}

// ---- installation helpers -----------------------------------------

/// The first error among the operands, or a fresh InvalidOperand.
pub(crate) fn invalid_operand(
    interp: &mut Interp,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    if interp.is_error(lexpr) {
        lexpr
    } else if interp.is_error(rexpr) {
        rexpr
    } else {
        interp.error(sloc, ErrorKind::InvalidOperand)
    }
}

/// Propagate an error operand, otherwise raise `kind`.
pub(crate) fn error_or(
    interp: &mut Interp,
    sloc: Sloc,
    ast: NodeId,
    kind: ErrorKind,
) -> NodeId {
    if interp.is_error(ast) {
        ast
    } else {
        interp.error(sloc, kind)
    }
}

pub(crate) fn install_op(interp: &mut Interp, name: &str, f: BuiltinOp, prec: Precedence) -> u32 {
    let hash = memhash(name.as_bytes(), 0);
    let sid = interp.heap.new_str(name);
    let node = interp.new_node(Sloc::NONE, Kind::BuiltinOperator { name: sid, f, prec });
    let operators = interp.operators;
    match interp.define(operators, hash, node, Attr::NO_ASSIGN) {
        Some(index) => index as u32,
        None => u32::MAX,
    }
}

pub(crate) fn install_alias(interp: &mut Interp, alias: &str, target: &str) {
    let hash = memhash(alias.as_bytes(), 0);
    let name = interp.heap.new_str(alias);
    let target = interp.heap.new_str(target);
    let node = interp.new_node(Sloc::NONE, Kind::OperatorAlias { name, target });
    let operators = interp.operators;
    interp.define(operators, hash, node, Attr::NO_ASSIGN);
}

fn install_operators(interp: &mut Interp) {
    use Precedence::*;

    interp.opidx.applicate = install_op(interp, "`applicate`", apply::applicate, Binding);
    interp.opidx.global = install_op(interp, "`global`", decl::global, Declarative);
    interp.opidx.static_ = install_op(interp, "`static`", decl::static_, Declarative);
    interp.opidx.local = install_op(interp, "`local`", decl::local, Declarative);
    interp.opidx.tag = install_op(interp, "`tag`", decl::tag, Declarative);
    interp.opidx.tag_ref = install_op(interp, "`tag_ref`", decl::tag_ref, Declarative);
    interp.opidx.const_ = install_op(interp, "`const`", decl::const_, Declarative);
    interp.opidx.assign = install_op(interp, "`assign`", decl::assign, Assigning);
    install_op(interp, "`assign_ref`", decl::assign_ref, Assigning);
    install_op(interp, "`assign_land`", decl::assign_land, Assigning);
    install_op(interp, "`assign_lor`", decl::assign_lor, Assigning);
    install_op(interp, "`assign_and`", decl::assign_and, Assigning);
    install_op(interp, "`assign_or`", decl::assign_or, Assigning);
    install_op(interp, "`assign_xor`", decl::assign_xor, Assigning);
    install_op(interp, "`assign_add`", decl::assign_add, Assigning);
    install_op(interp, "`assign_sub`", decl::assign_sub, Assigning);
    install_op(interp, "`assign_mul`", decl::assign_mul, Assigning);
    install_op(interp, "`assign_div`", decl::assign_div, Assigning);
    install_op(interp, "`assign_mod`", decl::assign_mod, Assigning);
    install_op(interp, "`assign_shl`", decl::assign_shl, Assigning);
    install_op(interp, "`assign_shr`", decl::assign_shr, Assigning);
    install_op(interp, "`assign_exl`", decl::assign_exl, Assigning);
    install_op(interp, "`assign_exr`", decl::assign_exr, Assigning);
    install_op(interp, "`assign_rol`", decl::assign_rol, Assigning);
    install_op(interp, "`assign_ror`", decl::assign_ror, Assigning);
    interp.opidx.exchange = install_op(interp, "`exchange`", decl::exchange, Assigning);
    interp.opidx.if_ = install_op(interp, "`if`", flow::if_, Conditional);
    interp.opidx.ifnot = install_op(interp, "`ifnot`", flow::ifnot, Conditional);
    interp.opidx.case = install_op(interp, "`case`", flow::case, Conditional);
    interp.opidx.while_ = install_op(interp, "`while`", flow::while_, Conditional);
    interp.opidx.until = install_op(interp, "`until`", flow::until, Conditional);
    interp.opidx.land = install_op(interp, "`land`", flow::land, Logical);
    interp.opidx.lor = install_op(interp, "`lor`", flow::lor, Logical);
    interp.opidx.lt = install_op(interp, "`lt`", ops::lt, Relational);
    install_op(interp, "`lte`", ops::lte, Relational);
    install_op(interp, "`eq`", ops::eq, Relational);
    install_op(interp, "`neq`", ops::neq, Relational);
    install_op(interp, "`gte`", ops::gte, Relational);
    interp.opidx.gt = install_op(interp, "`gt`", ops::gt, Relational);
    install_op(interp, "`and`", ops::and, Bitwise);
    install_op(interp, "`or`", ops::or, Bitwise);
    install_op(interp, "`xor`", ops::xor, Bitwise);
    install_op(interp, "`add`", ops::add, Additive);
    install_op(interp, "`sub`", ops::sub, Additive);
    install_op(interp, "`mul`", ops::mul, Multiplicative);
    install_op(interp, "`div`", ops::div, Multiplicative);
    install_op(interp, "`mod`", ops::mod_, Multiplicative);
    install_op(interp, "`shl`", ops::shl, Exponential);
    install_op(interp, "`shr`", ops::shr, Exponential);
    install_op(interp, "`exl`", ops::exl, Exponential);
    install_op(interp, "`exr`", ops::exr, Exponential);
    install_op(interp, "`rol`", ops::rol, Exponential);
    install_op(interp, "`ror`", ops::ror, Exponential);
    interp.opidx.block = install_op(interp, "`block`", apply::block, Binding);
    interp.opidx.array = install_op(interp, "`array`", apply::array, Binding);
    interp.opidx.range = install_op(interp, "`range`", apply::range, Binding);
    interp.opidx.sigil = install_op(interp, "@", sysfn::sigil, Binding);
}

fn install_aliases(interp: &mut Interp) {
    const ALIASES: &[(&str, &str)] = &[
        ("", "`applicate`"),
        (".", "`applicate`"),
        ("[:]", "`global`"),
        ("{:}", "`static`"),
        ("(:)", "`local`"),
        (":", "`tag`"),
        (":=", "`tag`"),
        (":^", "`tag_ref`"),
        ("::", "`const`"),
        ("=", "`assign`"),
        ("=^", "`assign_ref`"),
        ("&&=", "`assign_land`"),
        ("||=", "`assign_lor`"),
        ("&=", "`assign_and`"),
        ("|=", "`assign_or`"),
        ("~=", "`assign_xor`"),
        ("+=", "`assign_add`"),
        ("-=", "`assign_sub`"),
        ("*=", "`assign_mul`"),
        ("/=", "`assign_div`"),
        ("//=", "`assign_mod`"),
        ("<<=", "`assign_shl`"),
        (">>=", "`assign_shr`"),
        ("<<<=", "`assign_exl`"),
        (">>>=", "`assign_exr`"),
        ("<<>=", "`assign_rol`"),
        ("<>>=", "`assign_ror`"),
        ("><", "`exchange`"),
        ("?", "`if`"),
        ("!", "`ifnot`"),
        ("?:", "`case`"),
        ("?*", "`while`"),
        ("!*", "`until`"),
        ("&&", "`land`"),
        ("||", "`lor`"),
        ("<", "`lt`"),
        ("<=", "`lte`"),
        ("==", "`eq`"),
        ("<>", "`neq`"),
        (">=", "`gte`"),
        (">", "`gt`"),
        ("&", "`and`"),
        ("|", "`or`"),
        ("~", "`xor`"),
        ("+", "`add`"),
        ("-", "`sub`"),
        ("*", "`mul`"),
        ("/", "`div`"),
        ("//", "`mod`"),
        ("<<", "`shl`"),
        (">>", "`shr`"),
        ("<<<", "`exl`"),
        (">>>", "`exr`"),
        ("<<>", "`rol`"),
        ("<>>", "`ror`"),
        ("{}", "`block`"),
        ("[]", "`array`"),
        ("..", "`range`"),
    ];
    for (alias, target) in ALIASES {
        install_alias(interp, alias, target);
    }
}

/// Install the whole builtin surface.
pub fn install(interp: &mut Interp, options: Options) {
    install_operators(interp);
    install_aliases(interp);
    sysfn::install(interp);
    if options.math {
        math::install(interp);
    }
}
