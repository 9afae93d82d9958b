//! Value rendering.
//!
//! Two modes: display (what `print` and the REPL show) and archival
//! (`to_Literal`, meant to read back through the parser). Floats use
//! the shortest round-trip form in both modes, with a fraction marker
//! forced so the literal re-parses as a float; archival integers use
//! the hex form for the same reason.

use crate::ast::{Kind, NodeId};
use crate::interp::Interp;

impl Interp {
    /// Render a value. `archival` quotes and escapes string-like
    /// values so the result parses back.
    pub fn render(&self, id: NodeId, archival: bool) -> String {
        let mut out = String::new();
        self.render_into(&mut out, id, archival);
        out
    }

    fn render_into(&self, out: &mut String, id: NodeId, archival: bool) {
        match self.kind(id) {
            Kind::Zen | Kind::Void => {}
            Kind::Boolean(v) | Kind::Integer(v) => {
                if archival {
                    out.push_str(&format!("0x{:016X}", v));
                } else {
                    out.push_str(&format!("{}", v));
                }
            }
            Kind::Character(c) => {
                let c = char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER);
                if archival {
                    out.push('\'');
                    escape_into(out, &c.to_string(), "'");
                    out.push('\'');
                } else {
                    out.push(c);
                }
            }
            Kind::Float(v) => out.push_str(&render_float(v)),
            Kind::String(s) => {
                if archival {
                    out.push('"');
                    escape_into(out, self.str(s), "\"");
                    out.push('"');
                } else {
                    out.push_str(self.str(s));
                }
            }
            Kind::Identifier { name, .. } => out.push_str(self.str(name)),
            Kind::Operator { op, lhs, rhs } => {
                if !lhs.is_zen() {
                    out.push('(');
                    self.render_into(out, lhs, archival);
                    out.push(')');
                }
                out.push_str(self.getops(op));
                if !rhs.is_zen() {
                    out.push('(');
                    self.render_into(out, rhs, archival);
                    out.push(')');
                }
            }
            Kind::Sequence { lhs, rhs } => {
                self.render_pair(out, lhs, ",", rhs, archival);
            }
            Kind::Assemblage { lhs, rhs } => {
                self.render_pair(out, lhs, ";", rhs, archival);
            }
            Kind::Quoted(inner) => {
                out.push('(');
                self.render_into(out, inner, archival);
                out.push(')');
            }
            Kind::Reference { name, value } => {
                out.push_str(self.str(name));
                out.push_str(":(");
                self.render_into(out, value, archival);
                out.push(')');
            }
            Kind::Function { params, body } => {
                out.push('(');
                self.render_into(out, params, archival);
                out.push_str("):(");
                self.render_into(out, body, archival);
                out.push(')');
            }
            Kind::OperatorFunction { name, .. }
            | Kind::OperatorAlias { name, .. }
            | Kind::BuiltinOperator { name, .. }
            | Kind::BuiltinFunction { name, .. } => out.push_str(self.str(name)),
            Kind::Environment { map, .. } => {
                out.push('[');
                let items: Vec<NodeId> = self.heap.map(map).items().to_vec();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if let Kind::Reference { name, value } = self.kind(*item) {
                        out.push_str("('");
                        out.push_str(self.str(name));
                        out.push_str("':(");
                        self.render_into(out, value, archival);
                        out.push_str("))");
                    } else {
                        out.push('(');
                        self.render_into(out, *item, archival);
                        out.push(')');
                    }
                }
                out.push(']');
            }
            Kind::Error(kind) => {
                let sloc = self.sloc(id);
                out.push_str(&format!(
                    "{}:{}:{}:{}: {}",
                    self.source_name(sloc.source()),
                    sloc.line(),
                    sloc.offset() + 1,
                    sloc.span(),
                    kind.name()
                ));
            }
            Kind::OpaqueData { ty, .. } => out.push_str(self.odt.name_of(ty)),
            Kind::OpaqueDataRef(inner) => self.render_into(out, inner, archival),
        }
    }

    fn render_pair(&self, out: &mut String, lhs: NodeId, sep: &str, rhs: NodeId, archival: bool) {
        if !lhs.is_zen() {
            out.push('(');
            self.render_into(out, lhs, archival);
            out.push(')');
        }
        out.push_str(sep);
        if !rhs.is_zen() {
            out.push('(');
            self.render_into(out, rhs, archival);
            out.push(')');
        }
    }
}

/// Shortest round-trip float form with a guaranteed fraction marker,
/// so the text re-parses as a float rather than an integer.
fn render_float(v: f64) -> String {
    let mut s = format!("{}", v);
    if v.is_finite() && !s.contains('.') {
        match s.find(['e', 'E']) {
            Some(at) => s.insert_str(at, ".0"),
            None => s.push_str(".0"),
        }
    }
    s
}

fn escape_into(out: &mut String, s: &str, also: &str) {
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            c if also.contains(c) => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_float_keeps_fraction() {
        assert_eq!(render_float(3.14), "3.14");
        assert_eq!(render_float(3.0), "3.0");
        assert_eq!(render_float(-2.0), "-2.0");
    }

    #[test]
    fn test_render_float_round_trips() {
        for v in [0.0, 1.0, 3.14, 0.001, 1e300, 1e-300, -42.5] {
            let s = render_float(v);
            assert!(s.contains('.') || s.contains('e'), "{}", s);
            assert_eq!(s.parse::<f64>().ok(), Some(v), "{}", s);
        }
    }

    #[test]
    fn test_escape() {
        let mut out = String::new();
        escape_into(&mut out, "a\"b\n", "\"");
        assert_eq!(out, "a\\\"b\\n");
    }
}
