//! Arithmetic, comparison, bitwise and shift operators.
//!
//! Dispatch is by the (left type, right type) pair after evaluating
//! both operands. The integer path serves Boolean/Integer/Character
//! uniformly; ZEN broadcasts to the neutral element; mixed
//! integer/float promotes to float; strings compare byte-wise and
//! shift codepoint-wise; environments compare element-wise and shift
//! into a fresh environment. Division and modulus by zero are defined
//! to yield zero.

use koan_util::{memhash, Sloc};

use crate::ast::{Kind, NodeId};
use crate::heap::EnvId;
use crate::interp::Interp;

use super::invalid_operand;

type IntOp = fn(u64, u64) -> u64;
type FltOp = fn(f64, f64) -> f64;
type IntCmp = fn(u64, u64) -> bool;
type FltCmp = fn(f64, f64) -> bool;
type StrCmp = fn(&str, &str) -> bool;
type StrMove = fn(&str, u64) -> String;
type EnvMove = fn(&mut Interp, EnvId, u64) -> EnvId;

/// The integer scalar of a numeric node, when it has one.
fn int_val(kind: Kind) -> Option<u64> {
    match kind {
        Kind::Boolean(v) | Kind::Integer(v) => Some(v),
        Kind::Character(c) => Some(c as u64),
        _ => None,
    }
}

// ---- arithmetic ----------------------------------------------------

fn arithmetic(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    iop: IntOp,
    fop: FltOp,
) -> NodeId {
    let l = interp.eval(env, lexpr);
    let r = interp.eval(env, rexpr);
    let (lk, rk) = (interp.kind(l), interp.kind(r));

    match (int_val(lk), lk, int_val(rk), rk) {
        (Some(lv), _, Some(rv), _) => interp.new_node(sloc, Kind::Integer(iop(lv, rv))),
        (Some(lv), _, _, Kind::Float(rv)) => {
            interp.new_node(sloc, Kind::Float(fop(lv as f64, rv)))
        }
        (_, Kind::Float(lv), Some(rv), _) => {
            interp.new_node(sloc, Kind::Float(fop(lv, rv as f64)))
        }
        (_, Kind::Float(lv), _, Kind::Float(rv)) => {
            interp.new_node(sloc, Kind::Float(fop(lv, rv)))
        }
        (Some(lv), _, _, Kind::Zen) => interp.new_node(sloc, Kind::Integer(iop(lv, 0))),
        (_, Kind::Float(lv), _, Kind::Zen) => interp.new_node(sloc, Kind::Float(fop(lv, 0.0))),
        (_, Kind::Zen, Some(rv), _) => interp.new_node(sloc, Kind::Integer(iop(0, rv))),
        (_, Kind::Zen, _, Kind::Float(rv)) => interp.new_node(sloc, Kind::Float(fop(0.0, rv))),
        _ => invalid_operand(interp, sloc, l, r),
    }
}

fn fguard(l: f64, r: f64, f: impl Fn(f64, f64) -> f64) -> f64 {
    if l.is_nan() || r.is_nan() {
        0.0
    } else {
        f(l, r)
    }
}

macro_rules! builtin_arithmetic {
    ($name:ident, $iop:expr, $fop:expr) => {
        pub fn $name(
            interp: &mut Interp,
            env: NodeId,
            sloc: Sloc,
            lexpr: NodeId,
            rexpr: NodeId,
        ) -> NodeId {
            arithmetic(interp, env, sloc, lexpr, rexpr, $iop, $fop)
        }
    };
}

builtin_arithmetic!(add, |l, r| l.wrapping_add(r), |l, r| fguard(l, r, |l, r| l + r));
builtin_arithmetic!(sub, |l, r| l.wrapping_sub(r), |l, r| fguard(l, r, |l, r| l - r));
builtin_arithmetic!(mul, |l, r| l.wrapping_mul(r), |l, r| fguard(l, r, |l, r| l * r));
builtin_arithmetic!(
    div,
    |l, r| if r != 0 { l / r } else { 0 },
    |l, r| fguard(l, r, |l, r| if r != 0.0 { l / r } else { 0.0 })
);
builtin_arithmetic!(
    mod_,
    |l, r| if r != 0 { l % r } else { 0 },
    |l, r| fguard(l, r, |l, r| if r != 0.0 { l % r } else { 0.0 })
);

// ---- comparison ----------------------------------------------------

fn compare_delegate(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    l: NodeId,
    r: NodeId,
    icmp: IntCmp,
    fcmp: FltCmp,
    scmp: StrCmp,
    sense: i32,
) -> i32 {
    let (lk, rk) = (interp.kind(l), interp.kind(r));

    // Environments compare element-wise; a scalar against an
    // environment must hold against every element.
    let lenv = matches!(lk, Kind::Environment { .. });
    let renv = matches!(rk, Kind::Environment { .. });
    if lenv || renv {
        let litems: Vec<NodeId> = match lk {
            Kind::Environment { map, .. } => interp.heap.map(map).items().to_vec(),
            _ => Vec::new(),
        };
        let ritems: Vec<NodeId> = match rk {
            Kind::Environment { map, .. } => interp.heap.map(map).items().to_vec(),
            _ => Vec::new(),
        };
        return if lenv && renv {
            let n = litems.len().min(ritems.len());
            let mut result = 1;
            for i in 0..n {
                if result <= 0 {
                    break;
                }
                result = compare_delegate(
                    interp, env, sloc, litems[i], ritems[i], icmp, fcmp, scmp, sense,
                );
            }
            for &item in litems.iter().skip(n) {
                if result != sense {
                    break;
                }
                result =
                    compare_delegate(interp, env, sloc, item, NodeId::ZEN, icmp, fcmp, scmp, sense);
            }
            for &item in ritems.iter().skip(n) {
                if result != sense {
                    break;
                }
                result =
                    compare_delegate(interp, env, sloc, NodeId::ZEN, item, icmp, fcmp, scmp, sense);
            }
            result
        } else if lenv {
            let mut result = 1;
            for &item in &litems {
                if result <= 0 {
                    break;
                }
                result = compare_delegate(interp, env, sloc, item, r, icmp, fcmp, scmp, sense);
            }
            result
        } else {
            let mut result = 1;
            for &item in &ritems {
                if result <= 0 {
                    break;
                }
                result = compare_delegate(interp, env, sloc, l, item, icmp, fcmp, scmp, sense);
            }
            result
        };
    }

    match (int_val(lk), lk, int_val(rk), rk) {
        (Some(lv), _, Some(rv), _) => icmp(lv, rv) as i32,
        (Some(lv), _, _, Kind::Float(rv)) => fcmp(lv as f64, rv) as i32,
        (_, Kind::Float(lv), Some(rv), _) => fcmp(lv, rv as f64) as i32,
        (_, Kind::Float(lv), _, Kind::Float(rv)) => fcmp(lv, rv) as i32,
        (_, Kind::String(ls), _, Kind::String(rs)) => {
            scmp(interp.str(ls), interp.str(rs)) as i32
        }
        (Some(lv), _, _, Kind::Zen) => icmp(lv, 0) as i32,
        (_, Kind::Float(lv), _, Kind::Zen) => fcmp(lv, 0.0) as i32,
        (_, Kind::String(ls), _, Kind::Zen) => scmp(interp.str(ls), "") as i32,
        (_, Kind::Zen, Some(rv), _) => icmp(0, rv) as i32,
        (_, Kind::Zen, _, Kind::Float(rv)) => fcmp(0.0, rv) as i32,
        (_, Kind::Zen, _, Kind::String(rs)) => scmp("", interp.str(rs)) as i32,
        (_, Kind::Error(le), _, Kind::Error(re)) => icmp(le as u64, re as u64) as i32,
        _ => -1,
    }
}

fn compare(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    icmp: IntCmp,
    fcmp: FltCmp,
    scmp: StrCmp,
    sense: i32,
) -> NodeId {
    let l = interp.eval(env, lexpr);
    let r = interp.eval(env, rexpr);
    let result = compare_delegate(interp, env, sloc, l, r, icmp, fcmp, scmp, sense);
    if result >= 0 {
        interp.new_node(sloc, Kind::Boolean((result != 0) as u64))
    } else {
        invalid_operand(interp, sloc, l, r)
    }
}

fn ford(l: f64, r: f64, f: impl Fn(f64, f64) -> bool) -> bool {
    !l.is_nan() && !r.is_nan() && f(l, r)
}

macro_rules! builtin_compare {
    ($name:ident, $icmp:expr, $fcmp:expr, $scmp:expr, $sense:expr) => {
        pub fn $name(
            interp: &mut Interp,
            env: NodeId,
            sloc: Sloc,
            lexpr: NodeId,
            rexpr: NodeId,
        ) -> NodeId {
            compare(interp, env, sloc, lexpr, rexpr, $icmp, $fcmp, $scmp, $sense)
        }
    };
}

builtin_compare!(lt, |l, r| l < r, |l, r| ford(l, r, |l, r| l < r), |l, r| l < r, 0);
builtin_compare!(lte, |l, r| l <= r, |l, r| ford(l, r, |l, r| l <= r), |l, r| l <= r, 1);
builtin_compare!(eq, |l, r| l == r, |l, r| ford(l, r, |l, r| l == r), |l, r| l == r, 1);
builtin_compare!(neq, |l, r| l != r, |l, r| ford(l, r, |l, r| l != r), |l, r| l != r, 0);
builtin_compare!(gte, |l, r| l >= r, |l, r| ford(l, r, |l, r| l >= r), |l, r| l >= r, 1);
builtin_compare!(gt, |l, r| l > r, |l, r| ford(l, r, |l, r| l > r), |l, r| l > r, 0);

/// Three-way structural comparison; -1 also flags type mismatch.
pub(crate) fn comparator(interp: &Interp, l: NodeId, r: NodeId) -> i32 {
    let (lk, rk) = (interp.kind(l), interp.kind(r));
    match (int_val(lk), lk, int_val(rk), rk) {
        (Some(lv), _, Some(rv), _) => (lv > rv) as i32 - (lv < rv) as i32,
        (Some(lv), _, _, Kind::Float(rv)) => float_order(lv as f64, rv),
        (_, Kind::Float(lv), Some(rv), _) => float_order(lv, rv as f64),
        (_, Kind::Float(lv), _, Kind::Float(rv)) => float_order(lv, rv),
        (_, Kind::String(ls), _, Kind::String(rs)) => {
            str_order(interp.str(ls), interp.str(rs))
        }
        (Some(lv), _, _, Kind::Zen) => (lv > 0) as i32,
        (_, Kind::Float(lv), _, Kind::Zen) => float_order(lv, 0.0).max(0),
        (_, Kind::String(ls), _, Kind::Zen) => str_order(interp.str(ls), ""),
        (_, Kind::Zen, Some(rv), _) => -((0 < rv) as i32),
        (_, Kind::Zen, _, Kind::Float(rv)) => float_order(0.0, rv).min(0),
        (_, Kind::Zen, _, Kind::String(rs)) => str_order("", interp.str(rs)),
        (_, Kind::Error(le), _, Kind::Error(re)) => {
            ((le as u8) > (re as u8)) as i32 - ((le as u8) < (re as u8)) as i32
        }
        _ => -1,
    }
}

fn float_order(l: f64, r: f64) -> i32 {
    (ford(l, r, |l, r| l > r)) as i32 - (ford(l, r, |l, r| l < r)) as i32
}

fn str_order(l: &str, r: &str) -> i32 {
    match l.cmp(r) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }
}

/// Structural equality for `case` matching.
pub(crate) fn are_equal(interp: &Interp, l: NodeId, r: NodeId) -> bool {
    let (lk, rk) = (interp.kind(l), interp.kind(r));
    match (int_val(lk), lk, int_val(rk), rk) {
        (Some(lv), _, Some(rv), _) => lv == rv,
        (Some(lv), _, _, Kind::Float(rv)) => ford(lv as f64, rv, |l, r| l == r),
        (_, Kind::Float(lv), Some(rv), _) => ford(lv, rv as f64, |l, r| l == r),
        (_, Kind::Float(lv), _, Kind::Float(rv)) => ford(lv, rv, |l, r| l == r),
        (_, Kind::String(ls), _, Kind::String(rs)) => interp.str(ls) == interp.str(rs),
        (Some(lv), _, _, Kind::Zen) => lv == 0,
        (_, Kind::Float(lv), _, Kind::Zen) => lv == 0.0,
        (_, Kind::String(ls), _, Kind::Zen) => interp.str(ls).is_empty(),
        (_, Kind::Zen, Some(rv), _) => rv == 0,
        (_, Kind::Zen, _, Kind::Float(rv)) => rv == 0.0,
        (_, Kind::Zen, _, Kind::String(rs)) => interp.str(rs).is_empty(),
        (_, Kind::Error(le), _, Kind::Error(re)) => le == re,
        _ => false,
    }
}

// ---- bitwise -------------------------------------------------------

fn bitwise(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    iop: IntOp,
) -> NodeId {
    let l = interp.eval(env, lexpr);
    let r = interp.eval(env, rexpr);
    let (lk, rk) = (interp.kind(l), interp.kind(r));

    let lv = match (int_val(lk), lk) {
        (Some(v), _) => Some(v),
        (_, Kind::Float(f)) => Some(f.to_bits()),
        (_, Kind::Zen) => Some(0),
        _ => None,
    };
    let rv = match (int_val(rk), rk) {
        (Some(v), _) => Some(v),
        (_, Kind::Float(f)) => Some(f.to_bits()),
        (_, Kind::Zen) => Some(0),
        _ => None,
    };
    match (lv, rv) {
        (Some(lv), Some(rv)) if !(matches!(lk, Kind::Zen) && matches!(rk, Kind::Zen)) => {
            interp.new_node(sloc, Kind::Integer(iop(lv, rv)))
        }
        _ => invalid_operand(interp, sloc, l, r),
    }
}

macro_rules! builtin_bitwise {
    ($name:ident, $iop:expr) => {
        pub fn $name(
            interp: &mut Interp,
            env: NodeId,
            sloc: Sloc,
            lexpr: NodeId,
            rexpr: NodeId,
        ) -> NodeId {
            bitwise(interp, env, sloc, lexpr, rexpr, $iop)
        }
    };
}

builtin_bitwise!(and, |l, r| l & r);
builtin_bitwise!(or, |l, r| l | r);
builtin_bitwise!(xor, |l, r| l ^ r);

// ---- shifts and rotations -----------------------------------------

// Effective counts are masked with 63, so every count is defined.

fn ishl(l: u64, r: u64) -> u64 {
    l << (r & 63)
}
fn ishr(l: u64, r: u64) -> u64 {
    l >> (r & 63)
}
fn iexl(l: u64, r: u64) -> u64 {
    let r = r & 63;
    if r == 0 {
        0
    } else {
        l >> (64 - r)
    }
}
fn iexr(l: u64, r: u64) -> u64 {
    let r = r & 63;
    if r == 0 {
        0
    } else {
        l & (u64::MAX >> (64 - r))
    }
}
fn irol(l: u64, r: u64) -> u64 {
    l.rotate_left((r & 63) as u32)
}
fn iror(l: u64, r: u64) -> u64 {
    l.rotate_right((r & 63) as u32)
}

/// Byte offset of the nth code point (clamped to the string's end).
fn cp_offset(s: &str, n: u64) -> usize {
    s.char_indices()
        .nth(n as usize)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Byte offset of the nth code point from the end.
fn cp_offset_rev(s: &str, n: u64) -> usize {
    let count = s.chars().count() as u64;
    cp_offset(s, count.saturating_sub(n))
}

fn sshl(s: &str, r: u64) -> String {
    s[cp_offset(s, r)..].to_string()
}
fn sshr(s: &str, r: u64) -> String {
    s[..cp_offset_rev(s, r)].to_string()
}
fn sexl(s: &str, r: u64) -> String {
    s[..cp_offset(s, r)].to_string()
}
fn sexr(s: &str, r: u64) -> String {
    s[cp_offset_rev(s, r)..].to_string()
}
fn srol(s: &str, r: u64) -> String {
    let at = cp_offset(s, r);
    format!("{}{}", &s[at..], &s[..at])
}
fn sror(s: &str, r: u64) -> String {
    let at = cp_offset_rev(s, r);
    format!("{}{}", &s[at..], &s[..at])
}

/// Copy a run of slots into a fresh map, duplicating each node and
/// re-indexing named references.
fn env_copy_into(interp: &mut Interp, to: EnvId, from: EnvId, start: usize, n: usize) {
    for i in 0..n {
        let item = interp.heap.map(from).at(start + i).unwrap_or(NodeId::ZEN);
        let sloc = interp.sloc(item);
        let dup = interp.dup_node(sloc, item);
        let index = interp.heap.map_mut(to).push(dup);
        if let Kind::Reference { name, .. } = interp.kind(dup) {
            let hash = memhash(interp.str(name).as_bytes(), 0);
            interp.heap.map_mut(to).map_index(hash, index);
        }
    }
}

macro_rules! env_move {
    ($name:ident, |$len:ident, $r:ident| $body:expr) => {
        fn $name(interp: &mut Interp, from: EnvId, $r: u64) -> EnvId {
            let to = interp.heap.new_map();
            let $len = interp.heap.map(from).len() as u64;
            let runs: &[(u64, u64)] = &$body;
            for &(start, n) in runs {
                env_copy_into(interp, to, from, start as usize, n as usize);
            }
            to
        }
    };
}

env_move!(eshl, |len, r| {
    if len > r {
        [(r, len - r), (0, 0)]
    } else {
        [(0, 0), (0, 0)]
    }
});
env_move!(eshr, |len, r| {
    if len > r {
        [(0, len - r), (0, 0)]
    } else {
        [(0, 0), (0, 0)]
    }
});
env_move!(eexl, |len, r| { [(0, r.min(len)), (0, 0)] });
env_move!(eexr, |len, r| {
    let r = r.min(len);
    [(len - r, r), (0, 0)]
});
env_move!(erol, |len, r| {
    if len > 0 {
        let r = r % len;
        [(r, len - r), (0, r)]
    } else {
        [(0, 0), (0, 0)]
    }
});
env_move!(eror, |len, r| {
    if len > 0 {
        let r = r % len;
        [(len - r, r), (0, len - r)]
    } else {
        [(0, 0), (0, 0)]
    }
});

/// Copy `n` slots starting at `start` into `to` (used by slicing).
pub(crate) fn slice_into(interp: &mut Interp, to: EnvId, from: EnvId, start: usize, n: usize) {
    env_copy_into(interp, to, from, start, n);
}

fn bitmove(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    lexpr: NodeId,
    rexpr: NodeId,
    iop: IntOp,
    sop: StrMove,
    eop: EnvMove,
) -> NodeId {
    let l = interp.eval(env, lexpr);
    let r = interp.eval(env, rexpr);
    let (lk, rk) = (interp.kind(l), interp.kind(r));

    // The count: integer kinds directly, floats by value.
    let count = match (int_val(rk), rk) {
        (Some(v), _) => Some(v),
        (_, Kind::Float(f)) => Some(f as u64),
        (_, Kind::Zen) => Some(0),
        _ => None,
    };
    let Some(count) = count else {
        return invalid_operand(interp, sloc, l, r);
    };

    match (int_val(lk), lk) {
        (Some(lv), _) => interp.new_node(sloc, Kind::Integer(iop(lv, count))),
        (_, Kind::Float(f)) => interp.new_node(sloc, Kind::Integer(iop(f.to_bits(), count))),
        (_, Kind::String(s)) => {
            let moved = sop(interp.str(s), count);
            let sid = interp.heap.new_str_owned(moved);
            interp.new_node(sloc, Kind::String(sid))
        }
        (_, Kind::Environment { map, .. }) if !matches!(rk, Kind::Zen) => {
            let moved = eop(interp, map, count);
            interp.new_node(sloc, Kind::Environment { map: moved, outer: NodeId::ZEN })
        }
        (_, Kind::Zen) if !matches!(rk, Kind::Zen) => {
            interp.new_node(sloc, Kind::Integer(iop(0, count)))
        }
        _ => invalid_operand(interp, sloc, l, r),
    }
}

macro_rules! builtin_bitmove {
    ($name:ident, $iop:expr, $sop:expr, $eop:expr) => {
        pub fn $name(
            interp: &mut Interp,
            env: NodeId,
            sloc: Sloc,
            lexpr: NodeId,
            rexpr: NodeId,
        ) -> NodeId {
            bitmove(interp, env, sloc, lexpr, rexpr, $iop, $sop, $eop)
        }
    };
}

builtin_bitmove!(shl, ishl, sshl, eshl);
builtin_bitmove!(shr, ishr, sshr, eshr);
builtin_bitmove!(exl, iexl, sexl, eexl);
builtin_bitmove!(exr, iexr, sexr, eexr);
builtin_bitmove!(rol, irol, srol, erol);
builtin_bitmove!(ror, iror, sror, eror);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_counts_are_total() {
        // Effective count is k mod 64.
        assert_eq!(ishl(1, 64), 1);
        assert_eq!(ishl(1, 65), 2);
        assert_eq!(ishr(8, 67), 1);
        assert_eq!(irol(1, 63), 1u64 << 63);
        assert_eq!(iror(1, 1), 1u64 << 63);
    }

    #[test]
    fn test_extract_top_and_bottom() {
        assert_eq!(iexl(0xFF00_0000_0000_0000, 8), 0xFF);
        assert_eq!(iexr(0x1234, 8), 0x34);
        assert_eq!(iexl(u64::MAX, 0), 0);
    }

    #[test]
    fn test_string_moves_are_codepoint_aligned() {
        assert_eq!(sshl("aπb", 1), "πb");
        assert_eq!(sshr("aπb", 1), "aπ");
        assert_eq!(sexl("aπb", 2), "aπ");
        assert_eq!(sexr("aπb", 2), "πb");
        assert_eq!(srol("abcd", 1), "bcda");
        assert_eq!(sror("abcd", 1), "dabc");
        // Counts past the end clamp.
        assert_eq!(sshl("ab", 10), "");
        assert_eq!(sexl("ab", 10), "ab");
    }
}
