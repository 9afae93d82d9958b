//! The optional floating-point intrinsic family.
//!
//! Installed into the globals when the driver asks for it. Unary
//! functions accept any numeric and return a float; binary ones take
//! a two-element sequence.

use koan_util::Sloc;

use crate::ast::{Kind, NodeId};
use crate::errors::ErrorKind;
use crate::interp::Interp;

use super::{error_or, invalid_operand, sysfn};

fn math1(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    arg: NodeId,
    f: fn(f64) -> f64,
) -> NodeId {
    let value = interp.eval(env, arg);
    match interp.kind(value) {
        Kind::Boolean(_) | Kind::Integer(_) | Kind::Character(_) | Kind::Float(_) => {
            let x = interp.to_float_value(value);
            interp.new_node(sloc, Kind::Float(f(x)))
        }
        Kind::Error(_) => value,
        _ => error_or(interp, sloc, value, ErrorKind::InvalidOperand),
    }
}

fn math2(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    arg: NodeId,
    f: fn(f64, f64) -> f64,
) -> NodeId {
    if let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        let l = interp.eval(env, lhs);
        let r = interp.eval(env, rhs);
        if interp.kind(l).is_numeric() && interp.kind(r).is_numeric() {
            let x = interp.to_float_value(l);
            let y = interp.to_float_value(r);
            return interp.new_node(sloc, Kind::Float(f(x, y)));
        }
        return invalid_operand(interp, sloc, l, r);
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

macro_rules! math1_fn {
    ($name:ident, $method:ident) => {
        fn $name(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
            math1(interp, env, sloc, arg, f64::$method)
        }
    };
}

macro_rules! math2_fn {
    ($name:ident, $method:ident) => {
        fn $name(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
            math2(interp, env, sloc, arg, f64::$method)
        }
    };
}

math1_fn!(m_ceil, ceil);
math1_fn!(m_floor, floor);
math1_fn!(m_trunc, trunc);
math1_fn!(m_round, round);
math1_fn!(m_cos, cos);
math1_fn!(m_sin, sin);
math1_fn!(m_tan, tan);
math1_fn!(m_cosh, cosh);
math1_fn!(m_sinh, sinh);
math1_fn!(m_tanh, tanh);
math1_fn!(m_acos, acos);
math1_fn!(m_asin, asin);
math1_fn!(m_atan, atan);
math2_fn!(m_atan2, atan2);
math1_fn!(m_acosh, acosh);
math1_fn!(m_asinh, asinh);
math1_fn!(m_atanh, atanh);
math1_fn!(m_exp, exp);
math1_fn!(m_exp2, exp2);
math1_fn!(m_log, ln);
math1_fn!(m_log2, log2);
math1_fn!(m_log10, log10);
math1_fn!(m_sqrt, sqrt);
math1_fn!(m_cbrt, cbrt);
math2_fn!(m_fmin, min);
math2_fn!(m_fmax, max);
math2_fn!(m_hypot, hypot);
math2_fn!(m_pow, powf);

pub fn install(interp: &mut Interp) {
    let globals = interp.globals;
    for (name, f) in [
        ("ceil", m_ceil as crate::ast::BuiltinFn),
        ("floor", m_floor),
        ("trunc", m_trunc),
        ("round", m_round),
        ("cos", m_cos),
        ("sin", m_sin),
        ("tan", m_tan),
        ("cosh", m_cosh),
        ("sinh", m_sinh),
        ("tanh", m_tanh),
        ("acos", m_acos),
        ("asin", m_asin),
        ("atan", m_atan),
        ("atan2", m_atan2),
        ("acosh", m_acosh),
        ("asinh", m_asinh),
        ("atanh", m_atanh),
        ("exp", m_exp),
        ("exp2", m_exp2),
        ("log", m_log),
        ("log2", m_log2),
        ("log10", m_log10),
        ("sqrt", m_sqrt),
        ("cbrt", m_cbrt),
        ("fmin", m_fmin),
        ("fmax", m_fmax),
        ("hypot", m_hypot),
        ("pow", m_pow),
    ] {
        sysfn::install_fn(interp, globals, name, f);
    }
}
