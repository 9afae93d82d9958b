//! Control flow operators.
//!
//! These receive their operands unevaluated and decide what to
//! evaluate, and when, themselves. `land`/`lor` short-circuit.
//! `if`/`ifnot` treat an assemblage right side as then/else arms.
//! `case` matches tagged alternatives against a scrutinee, admitting
//! relational patterns (a relational with an open left side takes the
//! scrutinee), range patterns, and structural equality.
//!
//! `while`/`until` recognise an iterator clause of the form
//! `name = iter && cond` and specialise for three iterator shapes:
//! array (a bracket expression, honouring an attached range), integer
//! range, and sequence literal; anything else falls back to the
//! generic re-evaluated condition. Every iteration reverts the shadow
//! stack through `gc_return` and passes a safe point, so long loops do
//! not leak.

use koan_util::Sloc;

use crate::ast::{Attr, Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::Interp;

use super::ops::{are_equal, comparator};

// ---- short-circuit logicals ---------------------------------------

pub fn land(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let l = interp.eval(env, lexpr);
    let mut result = interp.to_bool_value(l);
    if result {
        let r = interp.eval(env, rexpr);
        result = interp.to_bool_value(r);
    }
    interp.new_node(sloc, Kind::Boolean(result as u64))
}

pub fn lor(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let l = interp.eval(env, lexpr);
    let mut result = interp.to_bool_value(l);
    if !result {
        let r = interp.eval(env, rexpr);
        result = interp.to_bool_value(r);
    }
    interp.new_node(sloc, Kind::Boolean(result as u64))
}

// ---- if / ifnot ---------------------------------------------------

fn if_1(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    inverted: bool,
) -> NodeId {
    // One-sided form: just the condition's truth value.
    if lexpr.is_zen() || rexpr.is_zen() {
        let side = if !lexpr.is_zen() { lexpr } else { rexpr };
        let value = interp.evalseq(env, side);
        let cond = interp.to_bool_value(value) ^ inverted;
        return interp.new_node(sloc, Kind::Boolean(cond as u64));
    }

    // Leading assemblage statements on the left run for effect; the
    // last clause is the condition.
    let mut lexpr = interp.undefer(env, lexpr);
    while let Kind::Assemblage { lhs, rhs } = interp.kind(lexpr) {
        interp.evalseq(env, lhs);
        lexpr = rhs;
    }
    let value = interp.evalseq(env, lexpr);
    let cond = interp.to_bool_value(value) ^ inverted;

    let rexpr = interp.undefer(env, rexpr);
    if let Kind::Assemblage { lhs, rhs } = interp.kind(rexpr) {
        return if cond {
            interp.refeval(env, lhs)
        } else {
            interp.refeval(env, rhs)
        };
    }

    if cond {
        interp.refeval(env, rexpr)
    } else {
        value
    }
}

pub fn if_(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    if_1(interp, env, sloc, lexpr, rexpr, false)
}

pub fn ifnot(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    if_1(interp, env, sloc, lexpr, rexpr, true)
}

// ---- case ---------------------------------------------------------

fn in_range_1(interp: &mut Interp, low: NodeId, expr: NodeId, high: NodeId) -> bool {
    if let Kind::Environment { map, .. } = interp.kind(expr) {
        let items: Vec<NodeId> = interp.heap.map(map).items().to_vec();
        return items.iter().all(|&item| in_range_1(interp, low, item, high));
    }
    comparator(interp, low, expr) <= 0 && comparator(interp, expr, high) <= 0
}

fn in_range(interp: &mut Interp, env: NodeId, range: NodeId, expr: NodeId) -> bool {
    let Kind::Operator { lhs, rhs, .. } = interp.kind(range) else {
        return false;
    };
    let low = interp.eval(env, lhs);
    let high = interp.eval(env, rhs);
    if comparator(interp, low, high) < 0 {
        in_range_1(interp, low, expr, high)
    } else {
        in_range_1(interp, high, expr, low)
    }
}

fn case_match(interp: &mut Interp, env: NodeId, expr: NodeId) -> bool {
    let mut expr = expr;
    if interp.is_tag(expr) {
        if let Kind::Operator { lhs, rhs, .. } = interp.kind(expr) {
            if case_match(interp, env, lhs) {
                return true;
            }
            expr = rhs;
        }
    }
    let value = interp.eval(env, expr);
    interp.to_bool_value(value)
}

fn case_equal(interp: &mut Interp, env: NodeId, expr: NodeId, cond: NodeId) -> bool {
    let mut expr = expr;
    if interp.is_tag(expr) {
        if let Kind::Operator { lhs, rhs, .. } = interp.kind(expr) {
            if case_equal(interp, env, lhs, cond) {
                return true;
            }
            expr = rhs;
        }
    }

    // A relational with an open left side takes the scrutinee.
    if interp.is_relational(expr) {
        if let Kind::Operator { op, lhs, rhs } = interp.kind(expr) {
            if lhs.is_zen() {
                let sloc = interp.sloc(expr);
                let probe = interp.new_node(sloc, Kind::Operator { op, lhs: cond, rhs });
                let value = interp.eval(env, probe);
                return interp.to_bool_value(value);
            }
        }
    }

    let value = interp.eval(env, expr);
    if interp.is_range(value) {
        return in_range(interp, env, value, cond);
    }
    are_equal(interp, value, cond)
}

pub fn case(interp: &mut Interp, env: NodeId, _sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    let mut lexpr = interp.undefer(env, lexpr);
    while let Kind::Assemblage { lhs, rhs } = interp.kind(lexpr) {
        interp.evalseq(env, lhs);
        lexpr = rhs;
    }

    let scrutinee = if lexpr.is_zen() {
        None
    } else {
        Some(interp.evalseq(env, lexpr))
    };

    let matches = |interp: &mut Interp, alt: NodeId| -> bool {
        match scrutinee {
            Some(cond) => case_equal(interp, env, alt, cond),
            None => case_match(interp, env, alt),
        }
    };

    let mut rexpr = interp.undefer(env, rexpr);
    while let Kind::Assemblage { lhs, rhs } = interp.kind(rexpr) {
        if interp.is_tag(lhs) {
            if let Kind::Operator { lhs: pat, rhs: arm, .. } = interp.kind(lhs) {
                if matches(interp, pat) {
                    return interp.refeval(env, arm);
                }
            }
        } else {
            interp.eval(env, lhs);
        }
        rexpr = rhs;
    }

    if interp.is_tag(rexpr) {
        if let Kind::Operator { lhs: pat, rhs: arm, .. } = interp.kind(rexpr) {
            if matches(interp, pat) {
                return interp.refeval(env, arm);
            }
        }
        return NodeId::ZEN;
    }

    interp.refeval(env, rexpr)
}

// ---- while / until ------------------------------------------------

/// Resolve the loop variable: declared fresh for tag/const clauses,
/// or the existing reference for assignment clauses.
fn loop_binding(interp: &mut Interp, env: NodeId, sloc: Sloc, clause: NodeId) -> NodeId {
    let Kind::Operator { lhs, .. } = interp.kind(clause) else {
        return NodeId::ZEN;
    };
    if interp.is_tag(clause) {
        interp.addenv(env, sloc, lhs, NodeId::ZEN, Attr::empty())
    } else if interp.is_const(clause) {
        interp.addenv(env, sloc, lhs, NodeId::ZEN, Attr::NO_ASSIGN)
    } else {
        let resolved = interp.subeval(env, lhs);
        interp.unwrapref(resolved)
    }
}

fn set_binding(interp: &mut Interp, binding: NodeId, value: NodeId) {
    if let Kind::Reference { name, .. } = interp.kind(binding) {
        interp.heap.node_mut(binding).kind = Kind::Reference { name, value };
    }
}

fn loop_array(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    clause: NodeId,
    body: NodeId,
    iexpr: NodeId,
    cond: NodeId,
) -> NodeId {
    let binding = loop_binding(interp, env, sloc, clause);
    if !matches!(interp.kind(binding), Kind::Reference { .. }) {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    }

    let Kind::Operator { lhs: subject, rhs: rspec, .. } = interp.kind(iexpr) else {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    };

    // `[a, b, c]` iterates the fresh array; `arr[range]` iterates the
    // subject over the range.
    let subject_value = interp.eval(env, subject);
    let (array, rspec) = if subject_value.is_zen() {
        (interp.eval(env, iexpr), NodeId::ZEN)
    } else {
        (subject_value, interp.eval(env, rspec))
    };
    let Kind::Environment { map, .. } = interp.kind(array) else {
        return super::invalid_operand(interp, sloc, array, rspec);
    };

    let length = interp.heap.map(map).len();
    let last = length.saturating_sub(1);
    let mut index = 0usize;
    let mut end = last;
    let mut step = 1isize;

    if interp.is_range(rspec) {
        let Kind::Operator { lhs: rlo, rhs: rhi, .. } = interp.kind(rspec) else {
            return interp.error(sloc, ErrorKind::InvalidOperand);
        };
        let lo = interp.eval(env, rlo);
        index = interp.to_integer_value(lo) as usize;
        let hi = interp.eval(env, rhi);
        let default_end = hi.is_zen();
        end = if default_end {
            last
        } else {
            interp.to_integer_value(hi) as usize
        };

        if index > last {
            if default_end || end > last {
                return NodeId::ZEN;
            }
            index = last;
        }
        if end > last {
            end = last;
        }
        if index > end {
            step = -1;
        }
    }

    let mut result = NodeId::ZEN;
    if length > 0 {
        let ts = interp.heap.stack_top();
        loop {
            let element = interp.heap.map(map).at(index).unwrap_or(NodeId::ZEN);
            set_binding(interp, binding, element);

            if !cond.is_zen() {
                let c = interp.eval(env, cond);
                if !interp.to_bool_value(c) {
                    break;
                }
            }

            result = interp.refeval(env, body);
            set_binding(interp, binding, NodeId::ZEN);

            interp.heap.gc_return(ts, result);
            interp.gc_safepoint();

            if index == end {
                break;
            }
            index = index.wrapping_add_signed(step);
        }
    }
    result
}

fn loop_range(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    clause: NodeId,
    body: NodeId,
    iexpr: NodeId,
    cond: NodeId,
) -> NodeId {
    let binding = loop_binding(interp, env, sloc, clause);
    if !matches!(interp.kind(binding), Kind::Reference { .. }) {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    }

    let Kind::Operator { lhs, rhs, .. } = interp.kind(iexpr) else {
        return interp.error(sloc, ErrorKind::InvalidOperand);
    };
    let lo = interp.eval(env, lhs);
    let mut next = interp.to_integer_value(lo);
    let hi = interp.eval(env, rhs);
    // A ZEN upper bound runs to the integer maximum.
    let end = if hi.is_zen() {
        u64::MAX
    } else {
        interp.to_integer_value(hi)
    };
    let step: u64 = if next > end { u64::MAX } else { 1 }; // wrapping -1 or +1

    let counter = interp.new_node(sloc, Kind::Integer(next));
    let ts = interp.heap.stack_top();
    let mut result = NodeId::ZEN;

    loop {
        interp.heap.node_mut(counter).kind = Kind::Integer(next);
        set_binding(interp, binding, counter);

        if !cond.is_zen() {
            let c = interp.eval(env, cond);
            if !interp.to_bool_value(c) {
                break;
            }
        }

        result = interp.refeval(env, body);
        interp.heap.gc_return(ts, result);
        interp.gc_safepoint();

        if next == end {
            break;
        }
        next = next.wrapping_add(step);
    }
    result
}

fn loop_sequence(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    clause: NodeId,
    body: NodeId,
    iexpr: NodeId,
    cond: NodeId,
) -> NodeId {
    let binding = loop_binding(interp, env, sloc, clause);
    if !matches!(interp.kind(binding), Kind::Reference { .. }) {
        return interp.error(sloc, ErrorKind::InvalidReferent);
    }

    let ts = interp.heap.stack_top();
    let mut result = NodeId::ZEN;
    let mut iexpr = iexpr;

    loop {
        let (element, rest) = match interp.kind(iexpr) {
            Kind::Sequence { lhs, rhs } => (lhs, Some(rhs)),
            _ => (iexpr, None),
        };
        if element.is_zen() && rest.is_none() {
            break;
        }

        set_binding(interp, binding, element);

        if !cond.is_zen() {
            let c = interp.eval(env, cond);
            if !interp.to_bool_value(c) {
                break;
            }
        }

        result = interp.refeval(env, body);
        interp.heap.gc_return(ts, result);
        interp.gc_safepoint();

        match rest {
            Some(rest) => iexpr = rest,
            None => break,
        }
    }
    result
}

fn loop_1(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    inverted: bool,
) -> NodeId {
    let mut lexpr = interp.unquote(lexpr);
    let rexpr = interp.unquote(rexpr);
    let mut iexpr = NodeId::ZEN;

    // An assemblage on the left: leading statements initialise; with
    // two or more clauses remaining, the trailing one is the
    // per-iteration increment.
    if let Kind::Assemblage { lhs, rhs } = interp.kind(lexpr) {
        if matches!(interp.kind(rhs), Kind::Assemblage { .. }) {
            interp.evalseq(env, lhs);
            let mut walk = rhs;
            while let Kind::Assemblage { lhs, rhs } = interp.kind(walk) {
                if matches!(interp.kind(rhs), Kind::Assemblage { .. }) {
                    interp.evalseq(env, lhs);
                    walk = rhs;
                } else {
                    iexpr = rhs;
                    lexpr = lhs;
                    break;
                }
            }
        } else {
            interp.evalseq(env, lhs);
            lexpr = rhs;
        }
    }

    // Iterator clause: `name = iter` or `name : iter`, optionally
    // guarded as `... && cond`.
    let mut clause = lexpr;
    let mut cond = NodeId::ZEN;
    if interp.is_land(clause) {
        if let Kind::Operator { lhs, rhs, .. } = interp.kind(clause) {
            let decl_like =
                interp.is_tag(lhs) || interp.is_const(lhs) || interp.is_assign(lhs);
            let named = matches!(interp.kind(lhs), Kind::Operator { lhs: n, .. }
                if matches!(interp.kind(n), Kind::Identifier { .. }));
            if decl_like && named {
                cond = rhs;
                clause = lhs;
            }
        }
    }

    let decl_like = interp.is_tag(clause) || interp.is_const(clause) || interp.is_assign(clause);
    if decl_like {
        if let Kind::Operator { lhs: name, rhs: iter, .. } = interp.kind(clause) {
            if matches!(interp.kind(name), Kind::Identifier { .. }) {
                if interp.is_array(iter) {
                    if let Kind::Operator { lhs, rhs, .. } = interp.kind(iter) {
                        if lhs.is_zen() || rhs.is_zen() || interp.is_range(rhs) {
                            return loop_array(interp, env, sloc, clause, rexpr, iter, cond);
                        }
                    }
                } else {
                    let iter = interp.undefer(env, iter);
                    if interp.is_range(iter) {
                        return loop_range(interp, env, sloc, clause, rexpr, iter, cond);
                    }
                    if matches!(interp.kind(iter), Kind::Sequence { .. }) {
                        return loop_sequence(interp, env, sloc, clause, rexpr, iter, cond);
                    }
                }
            }
        }
    }

    // Generic loop: re-evaluate the condition each pass.
    let value = interp.evalseq(env, lexpr);
    let mut cond_now = interp.to_bool_value(value) ^ inverted;

    let mut body = rexpr;
    if let Kind::Assemblage { lhs, rhs } = interp.kind(rexpr) {
        if !cond_now {
            return interp.eval(env, rhs);
        }
        body = lhs;
    }

    let ts = interp.heap.stack_top();
    let mut result = NodeId::ZEN;
    while cond_now {
        result = interp.refeval(env, body);

        if !iexpr.is_zen() {
            interp.evalseq(env, iexpr);
        }

        let value = interp.evalseq(env, lexpr);
        cond_now = interp.to_bool_value(value) ^ inverted;

        interp.heap.gc_return(ts, result);
        interp.gc_safepoint();
    }
    result
}

pub fn while_(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    loop_1(interp, env, sloc, lexpr, rexpr, false)
}

pub fn until(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    loop_1(interp, env, sloc, lexpr, rexpr, true)
}
