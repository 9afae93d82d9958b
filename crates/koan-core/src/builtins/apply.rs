//! Application, block, array and range.
//!
//! Juxtaposition's semantics are type-driven: numbers multiply or
//! repeat strings, characters and strings concatenate, environments
//! look names up or open as scopes, functions are called, sequences
//! append. Function calls swap the statics register to the callee's
//! source environment and run the body in fresh locals chained to the
//! call site.
//!
//! The bracket operator is dual-role: with no subject it constructs a
//! fresh environment from its element list (tagged elements become
//! named slots); with a subject it subscripts by integer, by name, or
//! by range (slices copy).

use koan_util::Sloc;

use crate::ast::{Attr, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::Interp;

use super::{decl, invalid_operand, ops};

// ---- function invocation ------------------------------------------

/// Call a Function node: bind the callee's source statics, build the
/// locals, bind parameters, evaluate the body, restore both registers.
pub(crate) fn call_function(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    func: NodeId,
    args: NodeId,
    by_ref: bool,
) -> NodeId {
    let Kind::Function { params, body } = interp.kind(func) else {
        return interp.error(sloc, ErrorKind::InvalidOperand);
    };

    let source = interp.sloc(func).source();
    let callee_statics = interp.source_env(source);
    let saved_statics = interp.statics_map();
    interp.set_statics_map_from(callee_statics);

    let saved_locals = interp.locals;
    let locals = interp.new_env(sloc, env);
    interp.locals = locals;

    interp.addenv_args(locals, env, sloc, params, args);
    let result = if by_ref {
        interp.refeval(locals, body)
    } else {
        interp.eval(locals, body)
    };

    interp.locals = saved_locals;
    interp.restore_statics_map(saved_statics);
    result
}

// ---- applicate ----------------------------------------------------

fn repeat_char(interp: &mut Interp, sloc: Sloc, c: u32, n: u64) -> NodeId {
    let c = char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER);
    let s: String = std::iter::repeat(c).take(n as usize).collect();
    let sid = interp.heap.new_str_owned(s);
    interp.new_node(sloc, Kind::String(sid))
}

fn repeat_string(interp: &mut Interp, sloc: Sloc, s: crate::strings::StrId, n: u64) -> NodeId {
    let repeated = interp.str(s).repeat(n as usize);
    let sid = interp.heap.new_str_owned(repeated);
    interp.new_node(sloc, Kind::String(sid))
}

/// Application with a numeric subject.
fn applicate_numeric(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    let count = interp.to_integer_value(lexpr);
    let r = interp.eval(env, rexpr);
    match interp.kind(r) {
        Kind::Sequence { .. } => interp.new_node(sloc, Kind::Sequence { lhs: lexpr, rhs: r }),
        Kind::Character(c) => repeat_char(interp, sloc, c, count),
        Kind::String(s) => repeat_string(interp, sloc, s, count),
        Kind::Function { .. } => call_function(interp, env, sloc, r, lexpr, true),
        Kind::BuiltinFunction { f, .. } => f(interp, env, sloc, lexpr),
        _ => ops::mul(interp, env, sloc, lexpr, r),
    }
}

fn applicate_character(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    let Kind::Character(lc) = interp.kind(lexpr) else {
        return invalid_operand(interp, sloc, lexpr, rexpr);
    };
    let r = interp.eval(env, rexpr);
    match interp.kind(r) {
        Kind::Sequence { .. } => interp.new_node(sloc, Kind::Sequence { lhs: lexpr, rhs: r }),
        Kind::Boolean(n) | Kind::Integer(n) => repeat_char(interp, sloc, lc, n),
        Kind::Float(n) => repeat_char(interp, sloc, lc, n as u64),
        Kind::Character(rc) => {
            let mut s = String::new();
            s.push(char::from_u32(lc).unwrap_or(char::REPLACEMENT_CHARACTER));
            s.push(char::from_u32(rc).unwrap_or(char::REPLACEMENT_CHARACTER));
            let sid = interp.heap.new_str_owned(s);
            interp.new_node(sloc, Kind::String(sid))
        }
        Kind::String(rs) => {
            let mut s = String::new();
            s.push(char::from_u32(lc).unwrap_or(char::REPLACEMENT_CHARACTER));
            s.push_str(interp.str(rs));
            let sid = interp.heap.new_str_owned(s);
            interp.new_node(sloc, Kind::String(sid))
        }
        _ => invalid_operand(interp, sloc, lexpr, r),
    }
}

fn applicate_string(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> Option<NodeId> {
    let Kind::String(ls) = interp.kind(lexpr) else {
        return None;
    };
    let r = interp.eval(env, rexpr);
    let result = match interp.kind(r) {
        Kind::Sequence { .. } => interp.new_node(sloc, Kind::Sequence { lhs: lexpr, rhs: r }),
        Kind::Boolean(n) | Kind::Integer(n) => repeat_string(interp, sloc, ls, n),
        Kind::Float(n) => repeat_string(interp, sloc, ls, n as u64),
        Kind::Character(c) => {
            let mut s = interp.str(ls).to_owned();
            s.push(char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER));
            let sid = interp.heap.new_str_owned(s);
            interp.new_node(sloc, Kind::String(sid))
        }
        Kind::String(rs) => {
            let mut s = interp.str(ls).to_owned();
            s.push_str(interp.str(rs));
            let sid = interp.heap.new_str_owned(s);
            interp.new_node(sloc, Kind::String(sid))
        }
        _ => return None,
    };
    Some(result)
}

pub fn applicate(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    let mut env = env;
    let lexpr = if interp.is_applicate(lexpr) {
        // A chain on the left: an environment opens as a scope for
        // the rest, anything else applies left to right.
        let Kind::Operator { lhs, rhs, .. } = interp.kind(lexpr) else {
            return interp.error(sloc, ErrorKind::InvalidOperand);
        };
        let head = interp.eval(env, lhs);
        if matches!(interp.kind(head), Kind::Environment { .. }) {
            env = interp.link_env(sloc, head, env);
            return applicate(interp, env, sloc, rhs, rexpr);
        }
        applicate(interp, env, sloc, head, rhs)
    } else {
        interp.eval(env, lexpr)
    };

    match interp.kind(lexpr) {
        Kind::Zen => {
            interp.eval(env, rexpr);
            NodeId::ZEN
        }
        Kind::Boolean(_) | Kind::Integer(_) | Kind::Float(_) => {
            applicate_numeric(interp, env, sloc, lexpr, rexpr)
        }
        Kind::Character(_) => applicate_character(interp, env, sloc, lexpr, rexpr),
        Kind::String(_) if !interp.is_array(rexpr) => {
            match applicate_string(interp, env, sloc, lexpr, rexpr) {
                Some(result) => result,
                None => applicate_fallback(interp, env, sloc, lexpr, rexpr),
            }
        }
        Kind::BuiltinFunction { f, .. } => f(interp, env, sloc, rexpr),
        Kind::Function { .. } => call_function(interp, env, sloc, lexpr, rexpr, false),
        Kind::Environment { .. } => {
            if matches!(interp.kind(rexpr), Kind::Identifier { .. } | Kind::String(_)) {
                let found = interp.inenv(lexpr, rexpr);
                if !found.is_zen() {
                    let carry = interp.attr(lexpr) & Attr::NO_ASSIGN;
                    interp.heap.node_mut(found).attr |= carry;
                    return found;
                }
                return interp.error(sloc, ErrorKind::InvalidIdentifier);
            }
            env = interp.link_env(sloc, lexpr, env);
            interp.refeval(env, rexpr)
        }
        Kind::Sequence { .. } => {
            let r = interp.eval(env, rexpr);
            match interp.kind(r) {
                Kind::Zen => lexpr,
                Kind::Error(_) => r,
                _ => {
                    // Append as a final element.
                    let mut tail = lexpr;
                    while let Kind::Sequence { rhs, .. } = interp.kind(tail) {
                        if matches!(interp.kind(rhs), Kind::Sequence { .. }) {
                            tail = rhs;
                        } else {
                            break;
                        }
                    }
                    if let Kind::Sequence { lhs, rhs } = interp.kind(tail) {
                        let appended = if !rhs.is_zen() {
                            interp.new_node(sloc, Kind::Sequence { lhs: rhs, rhs: r })
                        } else {
                            r
                        };
                        interp.heap.node_mut(tail).kind =
                            Kind::Sequence { lhs, rhs: appended };
                    }
                    lexpr
                }
            }
        }
        _ => applicate_fallback(interp, env, sloc, lexpr, rexpr),
    }
}

/// The section form: a subject applied to a bracketed operator with an
/// open left side, e.g. `x (+ 1)`.
fn applicate_fallback(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
) -> NodeId {
    if let Kind::Operator { op, lhs, rhs } = interp.kind(rexpr) {
        if lhs.is_zen() {
            return interp.evalop(env, sloc, op, lexpr, rhs);
        }
    }
    invalid_operand(interp, sloc, lexpr, rexpr)
}

// ---- block --------------------------------------------------------

pub fn block(interp: &mut Interp, env: NodeId, _sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let env = if !lexpr.is_zen() {
        interp.eval(env, lexpr)
    } else {
        env
    };
    interp.eval(env, rexpr)
}

// ---- array --------------------------------------------------------

fn subscript_environment(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    container: NodeId,
    index_value: NodeId,
) -> NodeId {
    let Kind::Environment { map, .. } = interp.kind(container) else {
        return interp.error(sloc, ErrorKind::InvalidOperand);
    };
    match interp.kind(index_value) {
        Kind::Boolean(_) | Kind::Integer(_) | Kind::Character(_) => {
            let i = match interp.kind(index_value) {
                Kind::Boolean(i) | Kind::Integer(i) => i,
                Kind::Character(c) => c as u64,
                _ => 0,
            };
            match interp.heap.map(map).at(i as usize) {
                Some(item) => {
                    let carry = interp.attr(container) & Attr::NO_ASSIGN;
                    interp.heap.node_mut(item).attr |= carry;
                    item
                }
                None => interp.error(sloc, ErrorKind::InvalidOperand),
            }
        }
        Kind::String(_) => {
            let found = interp.inenv(container, index_value);
            let carry = interp.attr(container) & Attr::NO_ASSIGN;
            interp.heap.node_mut(found).attr |= carry;
            found
        }
        _ if interp.is_range(index_value) => {
            let (start, end, length) = match range_bounds(interp, env, index_value, map) {
                Some(b) => b,
                None => return interp.error(sloc, ErrorKind::InvalidOperand),
            };
            let _ = length;
            let to = interp.heap.new_map();
            ops::slice_into(interp, to, map, start, end - start + 1);
            interp.new_node(sloc, Kind::Environment { map: to, outer: NodeId::ZEN })
        }
        _ => interp.error(sloc, ErrorKind::InvalidOperand),
    }
}

fn range_bounds(
    interp: &mut Interp,
    env: NodeId,
    range: NodeId,
    map: crate::heap::EnvId,
) -> Option<(usize, usize, usize)> {
    let Kind::Operator { lhs, rhs, .. } = interp.kind(range) else {
        return None;
    };
    let length = interp.heap.map(map).len();
    let lo = interp.eval(env, lhs);
    let mut start = interp.to_integer_value(lo) as usize;
    let hi = interp.eval(env, rhs);
    let mut end = if hi.is_zen() {
        length.saturating_sub(1)
    } else {
        interp.to_integer_value(hi) as usize
    };
    if start > end {
        std::mem::swap(&mut start, &mut end);
    }
    if start < length && end < length {
        Some((start, end, length))
    } else {
        None
    }
}

fn subscript_string(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    subject: NodeId,
    index_value: NodeId,
) -> NodeId {
    let Kind::String(s) = interp.kind(subject) else {
        return interp.error(sloc, ErrorKind::InvalidOperand);
    };
    match interp.kind(index_value) {
        Kind::Boolean(i) | Kind::Integer(i) => {
            match interp.str(s).chars().nth(i as usize) {
                Some(c) => interp.new_node(sloc, Kind::Character(c as u32)),
                None => interp.error(sloc, ErrorKind::InvalidOperand),
            }
        }
        Kind::Character(c) => {
            match interp.str(s).chars().nth(c as usize) {
                Some(c) => interp.new_node(sloc, Kind::Character(c as u32)),
                None => interp.error(sloc, ErrorKind::InvalidOperand),
            }
        }
        _ if interp.is_range(index_value) => {
            let Kind::Operator { lhs, rhs, .. } = interp.kind(index_value) else {
                return interp.error(sloc, ErrorKind::InvalidOperand);
            };
            let length = interp.str(s).chars().count();
            let lo = interp.eval(env, lhs);
            let mut start = interp.to_integer_value(lo) as usize;
            let hi = interp.eval(env, rhs);
            let mut end = if hi.is_zen() {
                length.saturating_sub(1)
            } else {
                interp.to_integer_value(hi) as usize
            };
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            if start < length && end < length {
                let text = interp.str(s);
                let from = text.char_indices().nth(start).map(|(i, _)| i).unwrap_or(0);
                let to = text
                    .char_indices()
                    .nth(end + 1)
                    .map(|(i, _)| i)
                    .unwrap_or(text.len());
                let sub = text[from..to].to_owned();
                let sid = interp.heap.new_str_owned(sub);
                interp.new_node(sloc, Kind::String(sid))
            } else {
                interp.error(sloc, ErrorKind::InvalidOperand)
            }
        }
        _ => interp.error(sloc, ErrorKind::InvalidOperand),
    }
}

pub fn array(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    if !lexpr.is_zen() {
        // Subscript role.
        let subject = interp.eval(env, lexpr);
        let index_value = interp.eval(env, rexpr);
        return match interp.kind(subject) {
            Kind::Environment { .. } => {
                subscript_environment(interp, env, sloc, subject, index_value)
            }
            Kind::String(_) => subscript_string(interp, env, sloc, subject, index_value),
            _ => invalid_operand(interp, sloc, subject, index_value),
        };
    }

    // Constructor role: a fresh environment from the element list.
    let container = interp.new_env(sloc, NodeId::ZEN);
    let mut rest = rexpr;
    if matches!(interp.kind(rest), Kind::Assemblage { .. }) {
        while let Kind::Assemblage { lhs, rhs } = interp.kind(rest) {
            if !lhs.is_zen() {
                decl::push_element(interp, env, sloc, container, lhs);
            }
            rest = rhs;
        }
    } else {
        while let Kind::Sequence { lhs, rhs } = interp.kind(rest) {
            if !lhs.is_zen() {
                decl::push_element(interp, env, sloc, container, lhs);
            }
            rest = rhs;
        }
    }
    if !rest.is_zen() {
        decl::push_element(interp, env, sloc, container, rest);
    }

    interp.heap.node_mut(container).attr |= Attr::NO_EVALUATE;
    container
}

// ---- range --------------------------------------------------------

/// Ranges evaluate their endpoints and stay ranges; consumers
/// interpret the closed interval.
pub fn range(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let lo = interp.eval(env, lexpr);
    let hi = interp.eval(env, rexpr);
    let op = interp.opidx.range;
    interp.new_node(sloc, Kind::Operator { op, lhs: lo, rhs: hi })
}
