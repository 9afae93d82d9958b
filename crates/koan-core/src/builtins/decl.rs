//! Declaration, assignment and scope operators.
//!
//! `tag` (`:`) declares a mutable binding, `tag_ref` (`:^`) a
//! by-reference alias (the right side must already resolve to a
//! Reference), `const` (`::`) an immutable binding. With an
//! applicate pattern on the left, a declaration creates a function
//! (`name(params)`), an operator function (`"op"(params)`), or an
//! operator function with explicit precedence
//! (`("level")("op")(params)`); `const` with two strings creates an
//! operator alias.
//!
//! Assignment resolves its target to a reference or a subscripted
//! slot, honouring the attribute bits; `=^` assigns the reference
//! itself. The compound forms compute, then assign. `><` exchanges
//! two assignable nodes in place.
//!
//! The scope operators evaluate their right side in the globals /
//! current source statics / current locals, optionally chained under
//! an environment given on the left.

use koan_util::{memhash, Sloc};

use crate::ast::{Attr, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::eval::Slot;
use crate::interp::Interp;
use crate::parser::Precedence;
use crate::strings::StrId;

use super::{error_or, ops};

#[derive(Clone, Copy, PartialEq, Eq)]
enum By {
    Value,
    Ref,
}

// ---- instance evaluation ------------------------------------------

fn byrefeval(interp: &mut Interp, env: NodeId, expr: NodeId) -> NodeId {
    let expr = interp.subeval(env, expr);
    if matches!(interp.kind(expr), Kind::Reference { .. }) {
        interp.unwrapref(expr)
    } else {
        expr
    }
}

/// A fresh instance of the expression's value (by value) or a
/// duplicate of its reference (by ref).
fn evaluate_instance(interp: &mut Interp, env: NodeId, sloc: Sloc, expr: NodeId, by: By) -> NodeId {
    match by {
        By::Value => {
            let value = interp.refeval(env, expr);
            interp.dup_node(sloc, value)
        }
        By::Ref => {
            let value = byrefeval(interp, env, expr);
            interp.dup_ref(sloc, value)
        }
    }
}

fn evaluate_assignable(interp: &mut Interp, env: NodeId, expr: NodeId, by: By) -> NodeId {
    match by {
        By::Value => interp.refeval(env, expr),
        By::Ref => byrefeval(interp, env, expr),
    }
}

// ---- declarations -------------------------------------------------

/// A declaration or assignment whose right side is a loop parses with
/// the loop innermost (`i : xs ?* body` is `i : (xs ?* body)`), but
/// the binding belongs to the loop's iterator clause. Rebuild the
/// clause on the loop's left and hand the whole thing to the loop,
/// keeping any `&& cond` guard in place.
fn loop_clause_rewrite(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    decl_op: u32,
    lexpr: NodeId,
    rexpr: NodeId,
) -> Option<NodeId> {
    if !matches!(interp.kind(lexpr), Kind::Identifier { .. }) {
        return None;
    }
    let is_while = interp.is_op(rexpr, interp.opidx.while_);
    let is_until = interp.is_op(rexpr, interp.opidx.until);
    if !is_while && !is_until {
        return None;
    }
    let Kind::Operator { lhs: iter, rhs: body, .. } = interp.kind(rexpr) else {
        return None;
    };

    let clause = if interp.is_land(iter) {
        let Kind::Operator { lhs: a, rhs: b, .. } = interp.kind(iter) else {
            return None;
        };
        let bound = interp.new_node(sloc, Kind::Operator { op: decl_op, lhs: lexpr, rhs: a });
        let land = interp.opidx.land;
        interp.new_node(sloc, Kind::Operator { op: land, lhs: bound, rhs: b })
    } else {
        interp.new_node(sloc, Kind::Operator { op: decl_op, lhs: lexpr, rhs: iter })
    };

    Some(if is_while {
        super::flow::while_(interp, env, sloc, clause, body)
    } else {
        super::flow::until(interp, env, sloc, clause, body)
    })
}

fn is_parameter(interp: &Interp, ast: NodeId) -> bool {
    let ast = if interp.is_tag(ast) {
        match interp.kind(ast) {
            Kind::Operator { lhs, .. } => lhs,
            _ => ast,
        }
    } else {
        ast
    };
    matches!(interp.kind(ast), Kind::Identifier { .. })
}

fn is_parameters(interp: &Interp, ast: NodeId) -> bool {
    match interp.kind(ast) {
        Kind::Zen => true,
        Kind::Sequence { .. } => {
            let mut ast = ast;
            while let Kind::Sequence { lhs, rhs } = interp.kind(ast) {
                if !is_parameter(interp, lhs) {
                    return false;
                }
                ast = rhs;
            }
            is_parameter(interp, ast)
        }
        _ => is_parameter(interp, ast),
    }
}

pub(crate) fn operator_alias(
    interp: &mut Interp,
    sloc: Sloc,
    name: StrId,
    hash: u64,
    target: StrId,
) -> NodeId {
    let node = interp.new_node(sloc, Kind::OperatorAlias { name, target });
    let operators = interp.operators;
    interp.define(operators, hash, node, Attr::NO_ASSIGN);
    node
}

fn decl(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    is_const: bool,
) -> NodeId {
    let lexpr = interp.unquote(lexpr);
    let attr = if is_const { Attr::NO_ASSIGN } else { Attr::empty() };

    let decl_op = if is_const {
        interp.opidx.const_
    } else {
        interp.opidx.tag
    };
    if let Some(result) = loop_clause_rewrite(interp, env, sloc, decl_op, lexpr, rexpr) {
        return result;
    }

    if interp.is_applicate(lexpr) {
        let Kind::Operator { lhs: callee, rhs: params, .. } = interp.kind(lexpr) else {
            return interp.error(sloc, ErrorKind::InvalidOperand);
        };

        // name(params) :: body - a function
        if matches!(interp.kind(callee), Kind::Identifier { .. })
            && is_parameters(interp, params)
        {
            let func = interp.new_node(sloc, Kind::Function { params, body: rexpr });
            interp.addenv(env, sloc, callee, func, attr);
            return func;
        }

        // ("level")("op")(params) :: body - an operator function with
        // explicit precedence
        if interp.is_applicate(callee) {
            let Kind::Operator { lhs: level, rhs: opname, .. } = interp.kind(callee) else {
                return interp.error(sloc, ErrorKind::InvalidOperand);
            };
            if let (Kind::String(level), Kind::String(name)) =
                (interp.kind(level), interp.kind(opname))
            {
                if is_parameters(interp, params) {
                    let prec_key = interp.str(level).to_owned();
                    let prec = interp.precedence_of(&prec_key);
                    let hash = memhash(interp.str(name).as_bytes(), 0);
                    let func = interp.new_node(sloc, Kind::Function { params, body: rexpr });
                    let opfn =
                        interp.new_node(sloc, Kind::OperatorFunction { name, func, prec });
                    let operators = interp.operators;
                    interp.define(operators, hash, opfn, attr);
                    return opfn;
                }
            }
            return interp.error(sloc, ErrorKind::InvalidOperand);
        }

        // "op"(params) :: body - an operator function
        if let Kind::String(name) = interp.kind(callee) {
            if is_parameters(interp, params) {
                let hash = memhash(interp.str(name).as_bytes(), 0);
                let func = interp.new_node(sloc, Kind::Function { params, body: rexpr });
                let opfn = interp.new_node(
                    sloc,
                    Kind::OperatorFunction { name, func, prec: Precedence::Assigning },
                );
                let operators = interp.operators;
                interp.define(operators, hash, opfn, Attr::NO_ASSIGN);
                return opfn;
            }
        }
        return interp.error(sloc, ErrorKind::InvalidOperand);
    }

    match interp.kind(lexpr) {
        // A bare declaration quotes its value.
        Kind::Zen => {
            let quoted = if !matches!(interp.kind(rexpr), Kind::Quoted(_)) {
                interp.new_node(sloc, Kind::Quoted(rexpr))
            } else if is_const {
                interp.dup_node(sloc, rexpr)
            } else {
                rexpr
            };
            if is_const {
                interp.heap.node_mut(quoted).attr |= Attr::NO_ASSIGN;
            }
            quoted
        }
        Kind::Identifier { .. } => {
            let value = evaluate_instance(interp, env, sloc, rexpr, By::Value);
            interp.addenv(env, sloc, lexpr, value, attr)
        }
        Kind::String(name) => {
            // Two const strings alias an operator; any other string
            // key declares a named binding.
            if is_const {
                if let Kind::String(target) = interp.kind(rexpr) {
                    let hash = memhash(interp.str(name).as_bytes(), 0);
                    return operator_alias(interp, sloc, name, hash, target);
                }
            }
            let value = evaluate_instance(interp, env, sloc, rexpr, By::Value);
            interp.addenv(env, sloc, lexpr, value, attr)
        }
        _ => interp.error(sloc, ErrorKind::InvalidOperand),
    }
}

fn decl_ref(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    is_const: bool,
) -> NodeId {
    let lexpr = interp.unquote(lexpr);
    if matches!(interp.kind(lexpr), Kind::Identifier { .. }) {
        let value = interp.subeval(env, rexpr);
        if matches!(interp.kind(value), Kind::Reference { .. }) {
            let value = if is_const {
                interp.dup_ref(sloc, value)
            } else {
                value
            };
            let attr = if is_const { Attr::NO_ASSIGN } else { Attr::empty() };
            interp.addenv(env, sloc, lexpr, value, attr);
            return value;
        }
    }
    error_or(interp, sloc, lexpr, ErrorKind::InvalidOperand)
}

pub fn tag(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    decl(interp, env, sloc, lexpr, rexpr, false)
}

pub fn tag_ref(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    decl_ref(interp, env, sloc, lexpr, rexpr, false)
}

pub fn const_(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    decl(interp, env, sloc, lexpr, rexpr, true)
}

// ---- assignment ---------------------------------------------------

fn array_assign_index(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    container: NodeId,
    rexpr: NodeId,
    index: usize,
    by: By,
) -> NodeId {
    let Kind::Environment { map, .. } = interp.kind(container) else {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    };
    let mut slot = Slot::EnvItem(map, index);
    let item = interp.read_slot(slot);
    if matches!(interp.kind(item), Kind::Reference { .. }) {
        if !interp.heap.node(item).is_assignable() {
            return interp.error(sloc, ErrorKind::InvalidReferent);
        }
        slot = Slot::RefValue(item);
    }
    let value = evaluate_instance(interp, env, sloc, rexpr, by);
    interp.assign(sloc, slot, value);
    value
}

fn array_push_back(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    container: NodeId,
    rexpr: NodeId,
    by: By,
) -> NodeId {
    // Tagged elements declare named slots in the container.
    if interp.is_tag(rexpr) || interp.is_tag_ref(rexpr) || interp.is_const(rexpr) {
        let scope = interp.link_env(sloc, container, env);
        let Kind::Operator { lhs, rhs, .. } = interp.kind(rexpr) else {
            return interp.error(sloc, ErrorKind::InvalidOperand);
        };
        return if interp.is_tag(rexpr) {
            tag(interp, scope, sloc, lhs, rhs)
        } else if interp.is_tag_ref(rexpr) {
            tag_ref(interp, scope, sloc, lhs, rhs)
        } else {
            const_(interp, scope, sloc, lhs, rhs)
        };
    }

    let value = evaluate_instance(interp, env, sloc, rexpr, by);
    if let Kind::Environment { map, .. } = interp.kind(container) {
        interp.heap.map_mut(map).push(value);
    }
    value
}

/// Append an element to an array under construction, by value.
pub(crate) fn push_element(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    container: NodeId,
    element: NodeId,
) -> NodeId {
    array_push_back(interp, env, sloc, container, element, By::Value)
}

fn array_create_map(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    container: NodeId,
    rexpr: NodeId,
    key: NodeId,
    by: By,
) -> NodeId {
    let value = evaluate_instance(interp, env, sloc, rexpr, by);
    let reference = interp.addenv(container, sloc, key, value, Attr::empty());
    match interp.kind(reference) {
        Kind::Reference { value, .. } => value,
        _ => reference,
    }
}

fn referent_assign(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    by: By,
) -> NodeId {
    let reference = interp.unwrapref(lexpr);
    let Kind::Reference { value: current, .. } = interp.kind(reference) else {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    };

    if !current.is_zen() {
        if interp.heap.node(current).is_assignable() {
            let value = evaluate_assignable(interp, env, rexpr, by);
            return interp.assign(sloc, Slot::RefValue(reference), value);
        }
        return interp.error(sloc, ErrorKind::InvalidReferent);
    }

    // An empty reference takes the instance directly.
    let value = evaluate_instance(interp, env, sloc, rexpr, by);
    if let Kind::Reference { name, .. } = interp.kind(reference) {
        interp.heap.node_mut(reference).kind = Kind::Reference { name, value };
    }
    value
}

fn assign_by_delegate(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    by: By,
) -> NodeId {
    if interp.is_array(lexpr) {
        let Kind::Operator { lhs, rhs, .. } = interp.kind(lexpr) else {
            return interp.error(sloc, ErrorKind::InvalidReferent);
        };
        let index_value = interp.eval(env, rhs);
        let mut container = interp.eval(env, lhs);

        match interp.kind(index_value) {
            Kind::Boolean(_) | Kind::Integer(_) | Kind::Character(_) => {
                let index = match interp.kind(index_value) {
                    Kind::Boolean(i) | Kind::Integer(i) => i as usize,
                    Kind::Character(c) => c as usize,
                    _ => 0,
                };
                let length = match interp.kind(container) {
                    Kind::Environment { map, .. } => interp.heap.map(map).len(),
                    _ => return interp.error(sloc, ErrorKind::InvalidReferent),
                };
                if !interp.heap.node(container).is_assignable() {
                    return interp.error(sloc, ErrorKind::InvalidReferent);
                }
                if index < length {
                    return array_assign_index(interp, env, sloc, container, rexpr, index, by);
                }
                if index == length {
                    return array_push_back(interp, env, sloc, container, rexpr, by);
                }
                interp.error(sloc, ErrorKind::InvalidOperand)
            }
            Kind::String(_) => {
                if !matches!(interp.kind(container), Kind::Environment { .. }) {
                    return interp.error(sloc, ErrorKind::InvalidReferent);
                }
                if !interp.heap.node(container).is_assignable() {
                    return interp.error(sloc, ErrorKind::InvalidReferent);
                }
                let length = match interp.kind(container) {
                    Kind::Environment { map, .. } => interp.heap.map(map).len(),
                    _ => 0,
                };
                match interp.atenv(container, index_value) {
                    Some(index) if index < length => {
                        array_assign_index(interp, env, sloc, container, rexpr, index, by)
                    }
                    _ => array_create_map(interp, env, sloc, container, rexpr, index_value, by),
                }
            }
            _ => {
                // A range over an assignable environment fills slots;
                // over nothing it builds one.
                if container.is_zen() && interp.is_range(index_value) {
                    container = interp.new_env(sloc, NodeId::ZEN);
                }
                if matches!(interp.kind(container), Kind::Environment { .. })
                    && interp.heap.node(container).is_assignable()
                    && interp.is_range(index_value)
                {
                    let Kind::Operator { lhs: rlo, rhs: rhi, .. } = interp.kind(index_value)
                    else {
                        return interp.error(sloc, ErrorKind::InvalidReferent);
                    };
                    let length = match interp.kind(container) {
                        Kind::Environment { map, .. } => interp.heap.map(map).len(),
                        _ => 0,
                    };
                    let lo = interp.eval(env, rlo);
                    let mut index = interp.to_integer_value(lo) as usize;
                    let hi = interp.eval(env, rhi);
                    let mut end = if hi.is_zen() {
                        length.saturating_sub(1)
                    } else {
                        interp.to_integer_value(hi) as usize
                    };
                    if index > end {
                        std::mem::swap(&mut index, &mut end);
                    }
                    if index > length {
                        return interp.error(sloc, ErrorKind::InvalidOperand);
                    }
                    while index < length && index <= end {
                        array_assign_index(interp, env, sloc, container, rexpr, index, by);
                        index += 1;
                    }
                    while index <= end {
                        array_push_back(interp, env, sloc, container, rexpr, by);
                        index += 1;
                    }
                    return container;
                }
                interp.error(sloc, ErrorKind::InvalidReferent)
            }
        }
    } else {
        let target = interp.subeval(env, lexpr);
        if matches!(interp.kind(target), Kind::Reference { .. })
            && interp.heap.node(target).is_assignable()
        {
            referent_assign(interp, env, sloc, target, rexpr, by)
        } else {
            error_or(interp, sloc, target, ErrorKind::InvalidReferent)
        }
    }
}

fn assign_by(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    by: By,
) -> NodeId {
    let lexpr = interp.unquote(lexpr);
    if by == By::Value {
        let assign_op = interp.opidx.assign;
        if let Some(result) = loop_clause_rewrite(interp, env, sloc, assign_op, lexpr, rexpr) {
            return result;
        }
    }
    if !lexpr.is_zen() {
        return assign_by_delegate(interp, env, sloc, lexpr, rexpr, by);
    }

    // No target: produce an anonymous instance.
    match by {
        By::Value => {
            let value = interp.eval(env, rexpr);
            interp.dup_node(sloc, value)
        }
        By::Ref => {
            let value = byrefeval(interp, env, rexpr);
            if matches!(interp.kind(value), Kind::Reference { .. }) {
                interp.dup_ref(sloc, value)
            } else {
                interp.error(sloc, ErrorKind::InvalidReferent)
            }
        }
    }
}

pub fn assign(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    assign_by(interp, env, sloc, lexpr, rexpr, By::Value)
}

pub fn assign_ref(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    assign_by(interp, env, sloc, lexpr, rexpr, By::Ref)
}

macro_rules! builtin_assign_op {
    ($name:ident, $op:path) => {
        pub fn $name(
            interp: &mut Interp,
            env: NodeId,
            sloc: Sloc,
            lexpr: NodeId,
            rexpr: NodeId,
        ) -> NodeId {
            let value = $op(interp, env, sloc, lexpr, rexpr);
            assign(interp, env, sloc, lexpr, value)
        }
    };
}

builtin_assign_op!(assign_land, super::flow::land);
builtin_assign_op!(assign_lor, super::flow::lor);
builtin_assign_op!(assign_and, ops::and);
builtin_assign_op!(assign_or, ops::or);
builtin_assign_op!(assign_xor, ops::xor);
builtin_assign_op!(assign_add, ops::add);
builtin_assign_op!(assign_sub, ops::sub);
builtin_assign_op!(assign_mul, ops::mul);
builtin_assign_op!(assign_div, ops::div);
builtin_assign_op!(assign_mod, ops::mod_);
builtin_assign_op!(assign_shl, ops::shl);
builtin_assign_op!(assign_shr, ops::shr);
builtin_assign_op!(assign_exl, ops::exl);
builtin_assign_op!(assign_exr, ops::exr);
builtin_assign_op!(assign_rol, ops::rol);
builtin_assign_op!(assign_ror, ops::ror);

// ---- exchange -----------------------------------------------------

fn exchange_evaluate(interp: &mut Interp, env: NodeId, sloc: Sloc, ast: NodeId) -> NodeId {
    let ast = interp.unquote(ast);

    if interp.is_array(ast) {
        let Kind::Operator { lhs, rhs, .. } = interp.kind(ast) else {
            return interp.error(sloc, ErrorKind::InvalidReferent);
        };
        let index_value = interp.eval(env, rhs);
        let container = interp.eval(env, lhs);
        let Kind::Environment { map, .. } = interp.kind(container) else {
            return interp.error(sloc, ErrorKind::InvalidReferent);
        };
        if !interp.heap.node(container).is_assignable() {
            return interp.error(sloc, ErrorKind::InvalidReferent);
        }
        let index = match interp.kind(index_value) {
            Kind::Boolean(i) | Kind::Integer(i) => Some(i as usize),
            Kind::Character(c) => Some(c as usize),
            Kind::String(_) => interp.atenv(container, index_value),
            _ => None,
        };
        if let Some(index) = index {
            if index < interp.heap.map(map).len() {
                let item = interp.heap.map(map).at(index).unwrap_or(NodeId::ZEN);
                let item = interp.deref(item);
                if !item.is_zen() && interp.heap.node(item).is_assignable() {
                    return item;
                }
            }
        }
        return interp.error(sloc, ErrorKind::InvalidReferent);
    }

    if !ast.is_zen() {
        let resolved = interp.subeval(env, ast);
        if matches!(interp.kind(resolved), Kind::Reference { .. }) {
            let value = interp.deref(resolved);
            if !value.is_zen() && interp.heap.node(value).is_assignable() {
                return value;
            }
        }
    }

    interp.error(sloc, ErrorKind::InvalidReferent)
}

pub fn exchange(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    let l = exchange_evaluate(interp, env, sloc, lexpr);
    if interp.is_error(l) {
        return l;
    }
    let r = exchange_evaluate(interp, env, sloc, rexpr);
    if interp.is_error(r) {
        return r;
    }

    if l != r {
        let a = *interp.heap.node(l);
        let b = *interp.heap.node(r);
        *interp.heap.node_mut(l) = b;
        *interp.heap.node_mut(r) = a;
    }
    l
}

// ---- scope operators ----------------------------------------------

fn scope_delegate(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    scope: NodeId,
) -> NodeId {
    let mut env = env;
    if lexpr.is_zen() {
        if rexpr.is_zen() {
            return scope;
        }
        env = scope;
    } else {
        let chained = interp.eval(env, lexpr);
        if matches!(interp.kind(chained), Kind::Environment { .. }) {
            env = interp.link_env(sloc, scope, chained);
            if rexpr.is_zen() {
                return env;
            }
        } else {
            env = scope;
        }
    }
    interp.eval(env, rexpr)
}

pub fn global(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let scope = interp.globals;
    scope_delegate(interp, env, sloc, lexpr, rexpr, scope)
}

pub fn static_(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let scope = interp.statics;
    scope_delegate(interp, env, sloc, lexpr, rexpr, scope)
}

pub fn local(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let scope = if !interp.locals.is_zen() {
        interp.locals
    } else {
        interp.statics
    };
    scope_delegate(interp, env, sloc, lexpr, rexpr, scope)
}
