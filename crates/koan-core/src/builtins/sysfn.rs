//! The system environment.
//!
//! Builtin functions and constants, reachable through the scope chain
//! and addressed directly with the `@` sigil. The reflective core
//! (`eval`, `parse`, `load`, `import`) closes the loop between the
//! evaluator and the parser; the file family works over the `file`
//! and `fpos` opaque data types.

use koan_util::Sloc;

use crate::ast::{Attr, BuiltinFn, Kind, NodeId, Tag};
use crate::errors::ErrorKind;
use crate::interp::Interp;
use crate::odt::{FilePosType, FileType};

use super::error_or;

// ---- helpers ------------------------------------------------------

/// Apply `f` to each element of a comma sequence, stopping on the
/// first error; the last result is the value.
fn sequential(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    arg: NodeId,
    f: fn(&mut Interp, NodeId, Sloc, NodeId) -> NodeId,
) -> NodeId {
    let mut arg = arg;
    while let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        let value = f(interp, env, sloc, lhs);
        if interp.is_error(value) {
            return value;
        }
        arg = rhs;
    }
    f(interp, env, sloc, arg)
}

pub(crate) fn install_fn(interp: &mut Interp, env: NodeId, name: &str, f: BuiltinFn) {
    let hash = koan_util::memhash(name.as_bytes(), 0);
    let sid = interp.heap.new_str(name);
    let node = interp.new_node(Sloc::NONE, Kind::BuiltinFunction { name: sid, f });
    interp.define(env, hash, node, Attr::NO_ASSIGN);
}

// ---- the sigil ----------------------------------------------------

/// `@name` looks a name up in the system environment directly; with a
/// left operand, a builtin function is applied to it.
pub fn sigil(interp: &mut Interp, env: NodeId, sloc: Sloc, lexpr: NodeId, rexpr: NodeId) -> NodeId {
    if matches!(interp.kind(rexpr), Kind::Identifier { .. } | Kind::String(_)) {
        let system_env = interp.system_env;
        let found = interp.inenv(system_env, rexpr);
        let found = interp.deref(found);

        if let Kind::BuiltinFunction { f, .. } = interp.kind(found) {
            if !lexpr.is_zen() {
                return f(interp, env, sloc, lexpr);
            }
        }
        if !found.is_zen() {
            return found;
        }
    }
    interp.error(sloc, ErrorKind::InvalidIdentifier)
}

// ---- inspection ---------------------------------------------------

macro_rules! is_kind_fn {
    ($fname:ident, $tag:ident) => {
        fn $fname(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
            let arg = interp.dereference(env, arg);
            let is = (interp.kind(arg).tag() == Tag::$tag) as u64;
            interp.new_node(sloc, Kind::Integer(is))
        }
    };
}

is_kind_fn!(is_zen, Zen);
is_kind_fn!(is_void, Void);
is_kind_fn!(is_boolean, Boolean);
is_kind_fn!(is_integer, Integer);
is_kind_fn!(is_character, Character);
is_kind_fn!(is_float, Float);
is_kind_fn!(is_string, String);
is_kind_fn!(is_operator, Operator);
is_kind_fn!(is_sequence, Sequence);
is_kind_fn!(is_assemblage, Assemblage);
is_kind_fn!(is_quoted, Quoted);
is_kind_fn!(is_reference, Reference);
is_kind_fn!(is_function, Function);
is_kind_fn!(is_operator_function, OperatorFunction);
is_kind_fn!(is_operator_alias, OperatorAlias);
is_kind_fn!(is_builtin_operator, BuiltinOperator);
is_kind_fn!(is_builtin_function, BuiltinFunction);
is_kind_fn!(is_environment, Environment);
is_kind_fn!(is_error_fn, Error);
is_kind_fn!(is_opaque_data_type, OpaqueDataType);
is_kind_fn!(is_opaque_data_reference, OpaqueDataReference);

/// Identifiers are checked on the raw tree (resolving one would
/// replace it with its binding).
fn is_identifier(interp: &mut Interp, _env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let is = matches!(interp.kind(arg), Kind::Identifier { .. }) as u64;
    interp.new_node(sloc, Kind::Integer(is))
}

fn is_tag_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let arg = interp.dereference(env, arg);
    let is = interp.is_tag(arg) as u64;
    interp.new_node(sloc, Kind::Integer(is))
}

fn is_applicate_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let arg = interp.dereference(env, arg);
    let is = interp.is_applicate(arg) as u64;
    interp.new_node(sloc, Kind::Integer(is))
}

fn is_array_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let arg = interp.dereference(env, arg);
    let is = interp.is_array(arg) as u64;
    interp.new_node(sloc, Kind::Integer(is))
}

fn type_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let tag = interp.kind(value).tag() as u64;
    interp.new_node(sloc, Kind::Integer(tag))
}

fn type_name(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let name = interp.kind(value).tag().name();
    interp.new_string_node(sloc, name)
}

fn length(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let len: u64 = match interp.kind(value) {
        Kind::String(s) => interp.str(s).len() as u64,
        Kind::Identifier { name, .. } => interp.str(name).len() as u64,
        Kind::Sequence { .. } => {
            let mut n = 1;
            let mut walk = value;
            while let Kind::Sequence { rhs, .. } = interp.kind(walk) {
                n += 1;
                walk = rhs;
            }
            n
        }
        Kind::Assemblage { .. } => {
            let mut n = 1;
            let mut walk = value;
            while let Kind::Assemblage { rhs, .. } = interp.kind(walk) {
                n += 1;
                walk = rhs;
            }
            n
        }
        Kind::Environment { map, .. } => interp.heap.map(map).len() as u64,
        _ => 0,
    };
    interp.new_node(sloc, Kind::Integer(len))
}

// ---- conversion ---------------------------------------------------

fn to_string_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let s = interp.render(value, false);
    let sid = interp.heap.new_str_owned(s);
    interp.new_node(sloc, Kind::String(sid))
}

fn to_literal(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let s = interp.render(value, true);
    let sid = interp.heap.new_str_owned(s);
    interp.new_node(sloc, Kind::String(sid))
}

fn to_integer(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    match interp.kind(value) {
        Kind::Zen => interp.new_node(sloc, Kind::Integer(0)),
        Kind::Integer(_) => value,
        Kind::Boolean(v) => interp.new_node(sloc, Kind::Integer(v)),
        Kind::Character(c) => interp.new_node(sloc, Kind::Integer(c as u64)),
        Kind::Float(f) => interp.new_node(sloc, Kind::Integer(f as u64)),
        Kind::String(_) => {
            let v = interp.to_integer_value(value);
            interp.new_node(sloc, Kind::Integer(v))
        }
        Kind::Error(kind) => interp.new_node(sloc, Kind::Integer(kind as u64)),
        _ => NodeId::ZEN,
    }
}

fn to_float(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    match interp.kind(value) {
        Kind::Zen => interp.new_node(sloc, Kind::Float(0.0)),
        Kind::Float(_) => value,
        Kind::Boolean(v) | Kind::Integer(v) => interp.new_node(sloc, Kind::Float(v as f64)),
        Kind::Character(c) => interp.new_node(sloc, Kind::Float(c as f64)),
        Kind::String(_) => {
            let v = interp.to_float_value(value);
            interp.new_node(sloc, Kind::Float(v))
        }
        Kind::Error(kind) => interp.new_node(sloc, Kind::Float(kind as u8 as f64)),
        _ => NodeId::ZEN,
    }
}

// ---- diagnostics --------------------------------------------------

fn assert_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let mut cond_expr = arg;
    let mut msg_expr = NodeId::ZEN;
    let mut fatal_expr = NodeId::ZEN;

    if let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        cond_expr = lhs;
        msg_expr = rhs;
        if let Kind::Sequence { lhs, rhs } = interp.kind(rhs) {
            msg_expr = lhs;
            fatal_expr = rhs;
        }
    }

    let value = interp.eval(env, cond_expr);
    if interp.to_bool_value(value) {
        return NodeId::ZEN;
    }

    let msg = interp.eval(env, msg_expr);
    let text = if msg.is_zen() {
        "!ASSERTION FAILED!".to_string()
    } else {
        interp.render(msg, false)
    };
    eprintln!("{}:{}: {}", interp.source_name(sloc.source()), sloc.line(), text);

    let fatal = interp.eval(env, fatal_expr);
    let is_fatal = match interp.kind(fatal) {
        Kind::Integer(v) | Kind::Boolean(v) => v != 0,
        Kind::String(s) => interp.str(s) == "fatal",
        _ => false,
    };
    if is_fatal {
        std::process::exit(1);
    }
    NodeId::ZEN
}

// ---- process wrappers ---------------------------------------------

fn system_1(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    if let Kind::String(s) = interp.kind(value) {
        let command = interp.str(s).to_owned();
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .status();
        let code = match status {
            Ok(status) => status.code().unwrap_or(-1) as i64 as u64,
            Err(_) => return interp.error(sloc, ErrorKind::FailedOperation),
        };
        return interp.new_node(sloc, Kind::Integer(code));
    }
    error_or(interp, sloc, value, ErrorKind::InvalidOperand)
}

fn system_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    sequential(interp, env, sloc, arg, system_1)
}

fn get_env(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if !matches!(interp.kind(arg), Kind::Sequence { .. }) {
        let value = interp.eval(env, arg);
        if let Kind::String(s) = interp.kind(value) {
            let found = std::env::var(interp.str(s)).unwrap_or_default();
            let sid = interp.heap.new_str_owned(found);
            return interp.new_node(sloc, Kind::String(sid));
        }
        return error_or(interp, sloc, value, ErrorKind::InvalidOperand);
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn exit_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if !arg.is_zen() {
        let value = interp.eval(env, arg);
        match interp.kind(value) {
            Kind::Zen => {}
            Kind::Integer(v) => std::process::exit(v as i32),
            _ => {
                print_line(interp, env, sloc, arg);
                std::process::exit(1);
            }
        }
    }
    std::process::exit(0);
}

fn temp_name(interp: &mut Interp, _env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if arg.is_zen() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let path = std::env::temp_dir().join(format!("koan-{}-{:x}", std::process::id(), nanos));
        let sid = interp.heap.new_str_owned(path.to_string_lossy().into_owned());
        return interp.new_node(sloc, Kind::String(sid));
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn rename_1(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if interp.is_tag(arg) {
        if let Kind::Operator { lhs, rhs, .. } = interp.kind(arg) {
            let from = interp.eval(env, lhs);
            let to = interp.eval(env, rhs);
            if let (Kind::String(from), Kind::String(to)) = (interp.kind(from), interp.kind(to)) {
                let from = interp.str(from).to_owned();
                let to = interp.str(to).to_owned();
                return if std::fs::rename(&from, &to).is_ok() {
                    NodeId::ZEN
                } else {
                    interp.error(sloc, ErrorKind::FailedOperation)
                };
            }
        }
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn rename_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    sequential(interp, env, sloc, arg, rename_1)
}

fn remove_1(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    if let Kind::String(s) = interp.kind(value) {
        let path = interp.str(s).to_owned();
        return if std::fs::remove_file(&path).is_ok() {
            NodeId::ZEN
        } else {
            interp.error(sloc, ErrorKind::FailedOperation)
        };
    }
    error_or(interp, sloc, value, ErrorKind::InvalidOperand)
}

fn remove_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    sequential(interp, env, sloc, arg, remove_1)
}

// ---- the reflective core ------------------------------------------

fn eval_fn(interp: &mut Interp, env: NodeId, _sloc: Sloc, arg: NodeId) -> NodeId {
    interp.eval(env, arg)
}

fn parse_fn(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if !matches!(interp.kind(arg), Kind::Sequence { .. }) {
        let value = interp.eval(env, arg);
        if let Kind::String(s) = interp.kind(value) {
            let text = interp.str(s).to_owned();
            let (ast, _, _) = interp.parse_text(&text, sloc.source(), sloc.line(), true);
            return interp.new_node(sloc, Kind::Quoted(ast));
        }
        return error_or(interp, sloc, value, ErrorKind::InvalidOperand);
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn load(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if !matches!(interp.kind(arg), Kind::Sequence { .. }) {
        let value = interp.eval(env, arg);
        if let Kind::String(s) = interp.kind(value) {
            let path = interp.str(s).to_owned();
            if let Ok(text) = interp.map_source_file(&path) {
                let sid = interp.heap.new_str_owned(text);
                return interp.new_node(sloc, Kind::String(sid));
            }
        }
        return error_or(interp, sloc, value, ErrorKind::InvalidOperand);
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn import_1(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    let Kind::String(s) = interp.kind(value) else {
        return error_or(interp, sloc, value, ErrorKind::InvalidOperand);
    };
    let path = interp.str(s).to_owned();
    match interp.import_file(&path) {
        Ok(result) => result,
        Err(_) => error_or(interp, sloc, value, ErrorKind::InvalidOperand),
    }
}

fn import(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    sequential(interp, env, sloc, arg, import_1)
}

// ---- the file family ----------------------------------------------

fn eval_file(interp: &mut Interp, env: NodeId, arg: NodeId) -> NodeId {
    let value = interp.eval(env, arg);
    if let Kind::OpaqueDataRef(inner) = interp.kind(value) {
        return inner;
    }
    value
}

fn file_slot(interp: &Interp, node: NodeId) -> Option<u64> {
    match interp.kind(node) {
        Kind::OpaqueData { ty, slot, .. } if ty == interp.file_type => Some(slot),
        _ => None,
    }
}

fn with_file<R>(
    interp: &mut Interp,
    node: NodeId,
    f: impl FnOnce(&mut crate::odt::FileHandle) -> R,
) -> Option<R> {
    let slot = file_slot(interp, node)?;
    let file_type = interp.file_type;
    let table = interp.odt.downcast_mut::<FileType>(file_type)?;
    table.get(slot).map(f)
}

fn is_file(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let arg = interp.dereference(env, arg);
    let inner = match interp.kind(arg) {
        Kind::OpaqueDataRef(inner) => inner,
        _ => arg,
    };
    let is = file_slot(interp, inner).is_some() as u64;
    interp.new_node(sloc, Kind::Integer(is))
}

fn is_fpos(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let arg = interp.dereference(env, arg);
    let is = matches!(interp.kind(arg), Kind::OpaqueData { ty, .. } if ty == interp.fpos_type);
    interp.new_node(sloc, Kind::Integer(is as u64))
}

fn open(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let (name_expr, mode_expr) = match interp.kind(arg) {
        Kind::Sequence { lhs, rhs } => (lhs, Some(rhs)),
        _ => (arg, None),
    };
    let name_value = interp.eval(env, name_expr);
    let Kind::String(name) = interp.kind(name_value) else {
        return error_or(interp, sloc, name_value, ErrorKind::InvalidOperand);
    };
    let name = interp.str(name).to_owned();

    let mode = match mode_expr {
        Some(expr) => {
            let mode_value = interp.eval(env, expr);
            let Kind::String(mode) = interp.kind(mode_value) else {
                return error_or(interp, sloc, mode_value, ErrorKind::InvalidOperand);
            };
            interp.str(mode).to_owned()
        }
        None => "r".to_string(),
    };

    let file_type = interp.file_type;
    let opened = interp
        .odt
        .downcast_mut::<FileType>(file_type)
        .and_then(|table| table.open(&name, &mode));
    match opened {
        Some(slot) => {
            let data =
                interp.new_node(sloc, Kind::OpaqueData { ty: file_type, slot, aux: 0 });
            interp.new_node(sloc, Kind::OpaqueDataRef(data))
        }
        None => interp.error(sloc, ErrorKind::InvalidOperand),
    }
}

fn close(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    if let Some(slot) = file_slot(interp, file) {
        let file_type = interp.file_type;
        if let Some(table) = interp.odt.downcast_mut::<FileType>(file_type) {
            table.close(slot);
            return NodeId::ZEN;
        }
    }
    error_or(interp, sloc, file, ErrorKind::InvalidOperand)
}

fn flush(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.flush()) {
        Some(()) => NodeId::ZEN,
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn rewind(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.rewind()) {
        Some(true) => NodeId::ZEN,
        Some(false) => interp.error(sloc, ErrorKind::FailedOperation),
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn get_fpos(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.position()) {
        Some(Some(pos)) => {
            let ty = interp.fpos_type;
            interp.new_node(sloc, Kind::OpaqueData { ty, slot: pos, aux: 0 })
        }
        Some(None) => interp.error(sloc, ErrorKind::FailedOperation),
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn set_fpos(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        let pos = interp.eval(env, rhs);
        let file = eval_file(interp, env, lhs);
        if let Kind::OpaqueData { ty, slot: position, .. } = interp.kind(pos) {
            if ty == interp.fpos_type {
                return match with_file(interp, file, |h| h.set_position(position)) {
                    Some(true) => NodeId::ZEN,
                    Some(false) => interp.error(sloc, ErrorKind::FailedOperation),
                    None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
                };
            }
        }
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

fn ferror(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.is_error() as u64) {
        Some(is) => interp.new_node(sloc, Kind::Integer(is)),
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn fclear(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.clear_status()) {
        Some(()) => NodeId::ZEN,
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn eof(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.is_eof() as u64) {
        Some(is) => interp.new_node(sloc, Kind::Integer(is)),
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn write_all(
    interp: &mut Interp,
    env: NodeId,
    sloc: Sloc,
    arg: NodeId,
    archival: bool,
    line_per: bool,
) -> NodeId {
    let Kind::Sequence { lhs, rhs } = interp.kind(arg) else {
        return error_or(interp, sloc, arg, ErrorKind::InvalidOperand);
    };
    let file = eval_file(interp, env, lhs);
    if file_slot(interp, file).is_none() {
        return error_or(interp, sloc, file, ErrorKind::InvalidOperand);
    }

    let mut arg = rhs;
    loop {
        let (element, rest) = match interp.kind(arg) {
            Kind::Sequence { lhs, rhs } => (lhs, Some(rhs)),
            _ => (arg, None),
        };
        let value = interp.eval(env, element);
        let mut text = interp.render(value, archival);
        if line_per || rest.is_none() {
            text.push('\n');
        }
        with_file(interp, file, |h| h.write_str(&text));
        match rest {
            Some(rest) => arg = rest,
            None => break,
        }
    }
    NodeId::ZEN
}

fn write(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    write_all(interp, env, sloc, arg, true, true)
}

fn write_line(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    write_all(interp, env, sloc, arg, true, false)
}

fn print_to(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    write_all(interp, env, sloc, arg, false, true)
}

fn print_line_to(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    write_all(interp, env, sloc, arg, false, false)
}

/// Read one chunk from a file, parse and evaluate it, and store the
/// result into the target's value node.
fn read_1(interp: &mut Interp, env: NodeId, sloc: Sloc, file: NodeId, target: NodeId) -> NodeId {
    let target_value = interp.refeval(env, target);
    let Some(text) = with_file(interp, file, |h| h.read_chunk()) else {
        return interp.error(sloc, ErrorKind::InvalidOperand);
    };

    let globals = interp.globals;
    let ts = interp.heap.stack_top();
    let mut line = 1u32;
    let mut at = 0usize;
    let mut value = NodeId::ZEN;
    while at < text.len() {
        let (ast, consumed, new_line) = interp.parse_text(&text[at..], 0, line, false);
        line = new_line;
        at += consumed;
        if consumed == 0 {
            break;
        }
        if !ast.is_zen() {
            value = interp.eval(globals, ast);
        }
        interp.heap.gc_return(ts, value);
    }

    if !target_value.is_zen() {
        let mut record = *interp.heap.node(value);
        record.sloc = sloc;
        *interp.heap.node_mut(target_value) = record;
        return target_value;
    }
    error_or(interp, sloc, value, ErrorKind::InvalidOperand)
}

fn read(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        let file = eval_file(interp, env, lhs);
        if file_slot(interp, file).is_none() {
            return error_or(interp, sloc, file, ErrorKind::InvalidOperand);
        }
        let mut arg = rhs;
        while let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
            let value = read_1(interp, env, sloc, file, lhs);
            if interp.is_error(value) {
                return value;
            }
            arg = rhs;
        }
        read_1(interp, env, sloc, file, arg)
    } else {
        let file = eval_file(interp, env, arg);
        if file_slot(interp, file).is_none() {
            return error_or(interp, sloc, file, ErrorKind::InvalidOperand);
        }
        let target = interp.new_node(sloc, Kind::Void);
        read_1(interp, env, sloc, file, target)
    }
}

fn read_line(interp: &mut Interp, env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    let file = eval_file(interp, env, arg);
    match with_file(interp, file, |h| h.read_chunk()) {
        Some(text) => {
            let sid = interp.heap.new_str_owned(text);
            interp.new_node(sloc, Kind::String(sid))
        }
        None => error_or(interp, sloc, file, ErrorKind::InvalidOperand),
    }
}

fn get_line(interp: &mut Interp, _env: NodeId, sloc: Sloc, arg: NodeId) -> NodeId {
    if arg.is_zen() {
        let mut text = String::new();
        return match std::io::stdin().read_line(&mut text) {
            Ok(_) => {
                let trimmed = text.trim_end_matches(['\n', '\r']).to_owned();
                let sid = interp.heap.new_str_owned(trimmed);
                interp.new_node(sloc, Kind::String(sid))
            }
            Err(_) => interp.error(sloc, ErrorKind::FailedOperation),
        };
    }
    error_or(interp, sloc, arg, ErrorKind::InvalidOperand)
}

// ---- printing -----------------------------------------------------

fn print_all(interp: &mut Interp, env: NodeId, arg: NodeId, out: &mut dyn std::io::Write) {
    use std::io::Write as _;

    let mut arg = arg;
    while let Kind::Sequence { lhs, rhs } = interp.kind(arg) {
        let value = interp.eval(env, lhs);
        let _ = out.write_all(interp.render(value, false).as_bytes());
        arg = rhs;
    }
    if !arg.is_zen() {
        let value = interp.eval(env, arg);
        let _ = out.write_all(interp.render(value, false).as_bytes());
    }
}

fn print(interp: &mut Interp, env: NodeId, _sloc: Sloc, arg: NodeId) -> NodeId {
    let mut out = std::io::stdout();
    print_all(interp, env, arg, &mut out);
    NodeId::ZEN
}

fn print_line(interp: &mut Interp, env: NodeId, _sloc: Sloc, arg: NodeId) -> NodeId {
    let mut out = std::io::stdout();
    print_all(interp, env, arg, &mut out);
    let _ = std::io::Write::write_all(&mut out, b"\n");
    NodeId::ZEN
}

fn print_error(interp: &mut Interp, env: NodeId, _sloc: Sloc, arg: NodeId) -> NodeId {
    use std::io::Write;
    let _ = std::io::stdout().flush();
    let mut err = std::io::stderr();
    print_all(interp, env, arg, &mut err);
    let _ = err.write_all(b"\n");
    let _ = err.flush();
    NodeId::ZEN
}

// ---- installation -------------------------------------------------

pub fn install(interp: &mut Interp) {
    let system_env = interp.system_env;

    // Data types first, so their ids are known to the file family.
    interp.file_type = interp.odt.register(Box::new(FileType::new()));
    interp.fpos_type = interp.odt.register(Box::new(FilePosType));

    let version = interp.new_string_node(Sloc::NONE, env!("CARGO_PKG_VERSION"));
    interp.addenv_named(system_env, Sloc::NONE, "VERSION", version, Attr::NO_ASSIGN);

    let fns: &[(&str, BuiltinFn)] = &[
        ("system", system_fn),
        ("is_Tag", is_tag_fn),
        ("is_Applicate", is_applicate_fn),
        ("is_Array", is_array_fn),
        ("is_Zen", is_zen),
        ("is_Void", is_void),
        ("is_Boolean", is_boolean),
        ("is_Integer", is_integer),
        ("is_Character", is_character),
        ("is_Float", is_float),
        ("is_String", is_string),
        ("is_Identifier", is_identifier),
        ("is_Operator", is_operator),
        ("is_Sequence", is_sequence),
        ("is_Assemblage", is_assemblage),
        ("is_Quoted", is_quoted),
        ("is_Reference", is_reference),
        ("is_Function", is_function),
        ("is_OperatorFunction", is_operator_function),
        ("is_OperatorAlias", is_operator_alias),
        ("is_BuiltinOperator", is_builtin_operator),
        ("is_BuiltinFunction", is_builtin_function),
        ("is_Environment", is_environment),
        ("is_Error", is_error_fn),
        ("is_OpaqueDataType", is_opaque_data_type),
        ("is_OpaqueDataReference", is_opaque_data_reference),
        ("type", type_fn),
        ("type_name", type_name),
        ("length", length),
        ("to_String", to_string_fn),
        ("to_Literal", to_literal),
        ("to_Integer", to_integer),
        ("to_Float", to_float),
        ("assert", assert_fn),
        ("get_env", get_env),
        ("eval", eval_fn),
        ("parse", parse_fn),
        ("load", load),
        ("import", import),
        ("temp_name", temp_name),
        ("rename", rename_fn),
        ("remove", remove_fn),
        ("is_file", is_file),
        ("is_fpos", is_fpos),
        ("open", open),
        ("close", close),
        ("flush", flush),
        ("rewind", rewind),
        ("get_fpos", get_fpos),
        ("set_fpos", set_fpos),
        ("ferror", ferror),
        ("fclear", fclear),
        ("eof", eof),
        ("write", write),
        ("write_line", write_line),
        ("read", read),
        ("read_line", read_line),
        ("print_to", print_to),
        ("print_line_to", print_line_to),
        ("print", print),
        ("print_line", print_line),
        ("print_error", print_error),
        ("get_line", get_line),
        ("exit", exit_fn),
    ];
    for (name, f) in fns {
        install_fn(interp, system_env, name, *f);
    }

    // One named error value per kind.
    for kind in ErrorKind::ALL {
        let name = format!("ERROR {}", kind.name());
        let value = interp.new_node(Sloc::NONE, Kind::Error(kind));
        interp.addenv_named(system_env, Sloc::NONE, &name, value, Attr::NO_ASSIGN);
    }
}
