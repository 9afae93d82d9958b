//! The parser.
//!
//! Grammar:
//!
//! ```text
//! primary    := '(' assemblage? ')' | '[' assemblage? ']'
//!             | '{' assemblage? '}' | literal | identifier
//! applicate  := primary ( primary )*
//! operation  := applicate ( operator applicate )*     (precedence climb)
//! sequence   := operation ( ',' operation )*
//! assemblage := sequence  ( ';' sequence )*
//! ```
//!
//! Application is juxtaposition; the climb is driven by an 11-level
//! precedence ladder whose per-operator level is looked up in the
//! `operators` environment at parse time, so user code can add
//! operators between statements. All operators are left-associative.
//! Lexemes with no binding are consumed in the outermost (None-level)
//! pass and carry `u32::MAX` as their table index; evaluation reports
//! them as InvalidOperator unless they are bound by then.
//!
//! The parser is parameterised by a node factory so the same grammar
//! drives both normal construction and the `parse` builtin's
//! introspective form.

use koan_lex::classes::{is_ident_start, is_operator, is_primary};
use koan_lex::{Lexeme, Lexer};
use koan_util::{memhash, Sloc};

use crate::ast::{Kind, NodeId};
use crate::interp::Interp;

/// The 11-level precedence ladder, lowest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Precedence {
    None = 0,
    Declarative,
    Assigning,
    Conditional,
    Logical,
    Relational,
    Bitwise,
    Additive,
    Multiplicative,
    Exponential,
    Binding,
}

impl Precedence {
    /// The next-tighter level, if any.
    pub fn next(self) -> Option<Precedence> {
        use Precedence::*;
        Some(match self {
            None => Declarative,
            Declarative => Assigning,
            Assigning => Conditional,
            Conditional => Logical,
            Logical => Relational,
            Relational => Bitwise,
            Bitwise => Additive,
            Additive => Multiplicative,
            Multiplicative => Exponential,
            Exponential => Binding,
            Binding => return Option::None,
        })
    }
}

impl Interp {
    /// The precedence of an operator lexeme: the level recorded on its
    /// table entry, chasing aliases by name. Unknown lexemes are None.
    pub fn precedence_of(&self, text: &str) -> Precedence {
        let hash = memhash(text.as_bytes(), 0);
        match self.locate(self.operators, hash, text) {
            Some(index) => self.precedence_of_index(index as u32),
            None => Precedence::None,
        }
    }

    fn precedence_of_index(&self, index: u32) -> Precedence {
        let mut index = index;
        // Alias chains are short; the guard only forecloses cycles.
        for _ in 0..8 {
            match self.kind(self.getopr(index)) {
                Kind::BuiltinOperator { prec, .. } => return prec,
                Kind::OperatorFunction { prec, .. } => return prec,
                Kind::OperatorAlias { target, .. } => {
                    let name = self.str(target);
                    let hash = memhash(name.as_bytes(), 0);
                    let key = name.to_owned();
                    match self.locate(self.operators, hash, &key) {
                        Some(i) => index = i as u32,
                        None => return Precedence::None,
                    }
                }
                _ => return Precedence::None,
            }
        }
        Precedence::None
    }

    /// Index of an operator lexeme in the table, `u32::MAX` when
    /// unbound. Aliases resolve to their target here, at parse time,
    /// so every node written through an alias carries the canonical
    /// operator's index and the evaluator's structural predicates see
    /// through the spelling.
    pub fn operator_index(&self, text: &str) -> u32 {
        let hash = memhash(text.as_bytes(), 0);
        let Some(index) = self.locate(self.operators, hash, text) else {
            return u32::MAX;
        };
        let mut index = index as u32;
        for _ in 0..8 {
            match self.kind(self.getopr(index)) {
                Kind::OperatorAlias { target, .. } => {
                    let name = self.str(target);
                    let hash = memhash(name.as_bytes(), 0);
                    let key = name.to_owned();
                    match self.locate(self.operators, hash, &key) {
                        Some(i) => index = i as u32,
                        None => break,
                    }
                }
                _ => break,
            }
        }
        index
    }

    /// Parse `text`, returning the tree, the byte length consumed and
    /// the final line number. `all` parses a whole assemblage; without
    /// it one top-level sequence (plus its trailing `;`) is taken.
    pub fn parse_text(&mut self, text: &str, source: u32, line: u32, all: bool) -> (NodeId, usize, u32) {
        let mut parser = Parser::new(self, text, source, line, node_from_lexeme);
        let ast = if all {
            parser.parse_all()
        } else {
            parser.parse_sequence_top()
        };
        let at = parser.position();
        let line = parser.line();
        (ast, at, line)
    }
}

/// The AST factory signature the parser is parameterised by.
pub type Factory = fn(&mut Interp, Sloc, &str, NodeId, NodeId) -> NodeId;

/// Classify a lexeme and build its node. The empty lexeme is
/// juxtaposition: an operator whose right side is still open takes the
/// new primary, a bracket expression with an open left side takes it
/// as subject, anything else becomes an applicate node.
pub fn node_from_lexeme(
    interp: &mut Interp,
    sloc: Sloc,
    text: &str,
    lhs: NodeId,
    rhs: NodeId,
) -> NodeId {
    let head = text.chars().next().unwrap_or('\0');

    if head == '\0' {
        if let Kind::Operator { op, lhs: l, rhs: r } = interp.kind(lhs) {
            if r.is_zen() {
                interp.heap.node_mut(lhs).kind = Kind::Operator { op, lhs: l, rhs };
                return lhs;
            }
        }
        if let Kind::Operator { op, lhs: l, rhs: r } = interp.kind(rhs) {
            if op == interp.opidx.array && l.is_zen() {
                interp.heap.node_mut(rhs).kind = Kind::Operator { op, lhs, rhs: r };
                return rhs;
            }
        }
        let op = interp.opidx.applicate;
        return interp.new_node(sloc, Kind::Operator { op, lhs, rhs });
    }

    if head.is_ascii_digit() {
        return if text.contains('.') {
            interp.new_node(sloc, Kind::Float(decode_float(text)))
        } else {
            interp.new_node(sloc, Kind::Integer(decode_integer(text)))
        };
    }

    if is_ident_start(head) {
        return interp.new_identifier(sloc, text);
    }

    match head {
        ',' => interp.new_node(sloc, Kind::Sequence { lhs, rhs }),
        ';' => interp.new_node(sloc, Kind::Assemblage { lhs, rhs }),
        '"' => {
            let body = strip_raw_quotes(text);
            interp.new_string_node(sloc, body)
        }
        '\'' => {
            let body = strip_quotes(text, '\'');
            let s = unescape(body);
            let sid = interp.heap.new_str_owned(s);
            interp.new_node(sloc, Kind::String(sid))
        }
        '`' => interp.new_node(sloc, Kind::Character(decode_character(text))),
        '(' => NodeId::ZEN,
        _ => {
            let op = interp.operator_index(text);
            interp.new_node(sloc, Kind::Operator { op, lhs, rhs })
        }
    }
}

// ---- literal decoding ---------------------------------------------

/// Integer literal per the scanner's grammar: decimal or `0x` hex,
/// with `e`/`E` decimal scaling (when the exponent is under 20) and
/// `p`/`P` binary shifts (under 64) as integer suffixes.
pub fn decode_integer(text: &str) -> u64 {
    let bytes = text.as_bytes();
    let (digits, hex) = if bytes.len() > 2 && (bytes[1] == b'x' || bytes[1] == b'X') {
        (&text[2..], true)
    } else {
        (text, false)
    };

    let mut value: u64 = 0;
    let mut rest = "";
    for (i, c) in digits.char_indices() {
        let d = match c.to_digit(if hex { 16 } else { 10 }) {
            Some(d) => d,
            None => {
                rest = &digits[i..];
                break;
            }
        };
        value = value
            .wrapping_mul(if hex { 16 } else { 10 })
            .wrapping_add(d as u64);
    }

    let mut rest_chars = rest.chars();
    match rest_chars.next() {
        Some('e') | Some('E') if !hex => {
            let e: u32 = rest_chars.as_str().parse().unwrap_or(u32::MAX);
            if e < 20 {
                for _ in 0..e {
                    value = value.wrapping_mul(10);
                }
            }
        }
        Some('p') | Some('P') if hex => {
            let e: u32 = rest_chars.as_str().parse().unwrap_or(u32::MAX);
            if e < 64 {
                value <<= e;
            }
        }
        _ => {}
    }
    value
}

/// Float literal: standard decimal forms via the stdlib; `0x...p...`
/// hex floats decoded locally since the stdlib does not accept them.
pub fn decode_float(text: &str) -> f64 {
    let bytes = text.as_bytes();
    if bytes.len() > 2 && (bytes[1] == b'x' || bytes[1] == b'X') {
        return decode_hex_float(&text[2..]);
    }
    text.parse().unwrap_or(0.0)
}

fn decode_hex_float(text: &str) -> f64 {
    let mut mantissa = 0f64;
    let mut scale = 1f64;
    let mut seen_dot = false;
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == '.' {
            seen_dot = true;
            chars.next();
        } else if let Some(d) = c.to_digit(16) {
            if seen_dot {
                scale /= 16.0;
                mantissa += (d as f64) * scale;
            } else {
                mantissa = mantissa * 16.0 + d as f64;
            }
            chars.next();
        } else {
            break;
        }
    }

    let mut exponent = 0i32;
    if matches!(chars.peek(), Some('p') | Some('P')) {
        chars.next();
        let sign = match chars.peek() {
            Some('-') => {
                chars.next();
                -1
            }
            Some('+') => {
                chars.next();
                1
            }
            _ => 1,
        };
        let mut e = 0i32;
        for c in chars {
            match c.to_digit(10) {
                Some(d) => e = e.saturating_mul(10).saturating_add(d as i32),
                None => break,
            }
        }
        exponent = sign * e;
    }

    mantissa * 2f64.powi(exponent)
}

fn strip_raw_quotes(text: &str) -> &str {
    let body = &text[1..];
    body.strip_suffix('"').unwrap_or(body)
}

fn strip_quotes(text: &str, quote: char) -> &str {
    let body = &text[1..];
    body.strip_suffix(quote).unwrap_or(body)
}

/// Decode one escape after a backslash. `\n`, `\t`, and big-endian
/// hex code points `\xHH`, `\wHHHH`, `\uHHHHHH`, `\UHHHHHHHH`
/// (2/4/6/8 digits); anything else stands for itself.
fn decode_escape(chars: &mut std::iter::Peekable<std::str::Chars>) -> u32 {
    let Some(c) = chars.next() else {
        return 0;
    };
    let digits = match c {
        'n' => return '\n' as u32,
        't' => return '\t' as u32,
        'x' | 'X' => 2,
        'w' | 'W' => 4,
        'u' => 6,
        'U' => 8,
        _ => return c as u32,
    };
    let mut value = 0u32;
    for _ in 0..digits {
        match chars.peek().and_then(|c| c.to_digit(16)) {
            Some(d) => {
                value = (value << 4) | d;
                chars.next();
            }
            None => break,
        }
    }
    value
}

fn push_codepoint(out: &mut String, cp: u32) {
    out.push(char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER));
}

/// Unescape a quoted string body.
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let cp = decode_escape(&mut chars);
            push_codepoint(&mut out, cp);
        } else {
            out.push(c);
        }
    }
    out
}

/// A character literal: the (possibly escaped) code point between
/// backticks; degenerate forms are NUL.
pub fn decode_character(text: &str) -> u32 {
    if text.len() < 3 {
        return 0;
    }
    let mut chars = text[1..].chars().peekable();
    match chars.next() {
        Some('\\') => decode_escape(&mut chars),
        Some(c) => c as u32,
        None => 0,
    }
}

// ---- the parser ---------------------------------------------------

pub struct Parser<'a, 'i> {
    interp: &'i mut Interp,
    lexer: Lexer<'a>,
    pending: Option<Lexeme<'a>>,
    source: u32,
    factory: Factory,
}

impl<'a, 'i> Parser<'a, 'i> {
    pub fn new(
        interp: &'i mut Interp,
        text: &'a str,
        source: u32,
        line: u32,
        factory: Factory,
    ) -> Self {
        Parser {
            interp,
            lexer: Lexer::with_line(text, line),
            pending: None,
            source,
            factory,
        }
    }

    /// Byte position of the scan head (past any peeked lexeme).
    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    pub fn line(&self) -> u32 {
        self.lexer.line()
    }

    fn peek(&mut self) -> Option<Lexeme<'a>> {
        if self.pending.is_none() {
            self.pending = self.lexer.next_lexeme();
        }
        self.pending
    }

    fn bump(&mut self) -> Option<Lexeme<'a>> {
        let lex = self.peek();
        self.pending = None;
        lex
    }

    fn peek_head(&mut self) -> char {
        self.peek().map(|l| l.head()).unwrap_or('\0')
    }

    fn sloc_of(&self, lex: Lexeme<'a>) -> Sloc {
        lex.sloc(self.source)
    }

    fn build(&mut self, sloc: Sloc, text: &str, lhs: NodeId, rhs: NodeId) -> NodeId {
        (self.factory)(self.interp, sloc, text, lhs, rhs)
    }

    fn parse_primary(&mut self) -> NodeId {
        let Some(lex) = self.peek() else {
            return NodeId::ZEN;
        };
        let sloc = self.sloc_of(lex);
        let head = lex.head();
        let single = lex.text.chars().count() == 1;

        match head {
            '(' if single => {
                self.bump();
                if self.peek_head() != ')' {
                    let expr = self.parse_assemblage();
                    if self.peek_head() == ')' {
                        self.bump();
                    }
                    return expr;
                }
                self.bump();
                self.build(sloc, "()", NodeId::ZEN, NodeId::ZEN)
            }
            '[' if single => {
                self.bump();
                let expr = if self.peek_head() != ']' {
                    self.parse_assemblage()
                } else {
                    NodeId::ZEN
                };
                if self.peek_head() == ']' {
                    self.bump();
                }
                self.build(sloc, "[]", NodeId::ZEN, expr)
            }
            '{' if single => {
                self.bump();
                let expr = if self.peek_head() != '}' {
                    self.parse_assemblage()
                } else {
                    NodeId::ZEN
                };
                if self.peek_head() == '}' {
                    self.bump();
                }
                self.build(sloc, "{}", NodeId::ZEN, expr)
            }
            ')' | ']' | '}' | ';' | ',' => NodeId::ZEN,
            _ => {
                self.bump();
                self.build(sloc, lex.text, NodeId::ZEN, NodeId::ZEN)
            }
        }
    }

    fn parse_applicate(&mut self) -> NodeId {
        let mut expr = self.parse_primary();
        while is_primary(self.peek_head()) {
            let rexpr = self.parse_primary();
            let sloc = self.interp.sloc(rexpr);
            expr = self.build(sloc, "", expr, rexpr);
        }
        expr
    }

    fn parse_operation(&mut self, prec: Precedence) -> NodeId {
        let mut expr = match prec.next() {
            Some(next) => self.parse_operation(next),
            None => self.parse_applicate(),
        };

        loop {
            let Some(lex) = self.peek() else { break };
            if !is_operator(lex.head()) {
                break;
            }
            if self.interp.precedence_of(lex.text) != prec {
                break;
            }
            let sloc = self.sloc_of(lex);
            let text = lex.text;
            self.bump();
            let rexpr = match prec.next() {
                Some(next) => self.parse_operation(next),
                None => self.parse_applicate(),
            };
            expr = self.build(sloc, text, expr, rexpr);
        }
        expr
    }

    fn parse_sequence(&mut self) -> NodeId {
        let mut expr = self.parse_operation(Precedence::None);
        let mut tail: Option<NodeId> = None;

        while self.peek_head() == ',' {
            let Some(lex) = self.peek() else { break };
            let sloc = self.sloc_of(lex);
            let text = lex.text;
            self.bump();
            let rexpr = self.parse_operation(Precedence::None);

            match tail {
                None => {
                    let node = self.build(sloc, text, expr, rexpr);
                    expr = node;
                    tail = Some(node);
                }
                Some(t) => {
                    if let Kind::Sequence { lhs, rhs } = self.interp.kind(t) {
                        let node = self.build(sloc, text, rhs, rexpr);
                        self.interp.heap.node_mut(t).kind = Kind::Sequence { lhs, rhs: node };
                        tail = Some(node);
                    }
                }
            }
        }
        expr
    }

    fn parse_assemblage(&mut self) -> NodeId {
        let mut expr = self.parse_sequence();
        let mut tail: Option<NodeId> = None;

        while self.peek_head() == ';' {
            let Some(lex) = self.peek() else { break };
            let sloc = self.sloc_of(lex);
            let text = lex.text;
            self.bump();
            let rexpr = self.parse_sequence();

            match tail {
                None => {
                    let node = self.build(sloc, text, expr, rexpr);
                    expr = node;
                    tail = Some(node);
                }
                Some(t) => {
                    if let Kind::Assemblage { lhs, rhs } = self.interp.kind(t) {
                        let node = self.build(sloc, text, rhs, rexpr);
                        self.interp.heap.node_mut(t).kind = Kind::Assemblage { lhs, rhs: node };
                        tail = Some(node);
                    }
                }
            }
        }
        expr
    }

    /// One top-level sequence plus its trailing `;` (the driver's
    /// statement-at-a-time entry).
    pub fn parse_sequence_top(&mut self) -> NodeId {
        let expr = self.parse_sequence();
        if self.peek_head() == ';' {
            self.bump();
        }
        expr
    }

    /// A whole assemblage (the `parse` builtin's entry).
    pub fn parse_all(&mut self) -> NodeId {
        self.parse_assemblage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer_forms() {
        assert_eq!(decode_integer("42"), 42);
        assert_eq!(decode_integer("0"), 0);
        assert_eq!(decode_integer("0x1F"), 0x1F);
        assert_eq!(decode_integer("1e3"), 1000);
        assert_eq!(decode_integer("7e6"), 7_000_000);
        assert_eq!(decode_integer("1e20"), 1); // exponent out of range
        assert_eq!(decode_integer("0x10p4"), 0x100);
    }

    #[test]
    fn test_decode_float_forms() {
        assert_eq!(decode_float("3.14"), 3.14);
        assert_eq!(decode_float("2.5e-3"), 2.5e-3);
        assert_eq!(decode_float("0x1.8p3"), 12.0);
        assert_eq!(decode_float("0x1.0p-1"), 0.5);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r"a\nb"), "a\nb");
        assert_eq!(unescape(r"t\tt"), "t\tt");
        assert_eq!(unescape(r"\x41"), "A");
        assert_eq!(unescape(r"\w0041"), "A");
        assert_eq!(unescape(r"\u000041"), "A");
        assert_eq!(unescape(r"\U00000041"), "A");
        assert_eq!(unescape(r"\\"), "\\");
        assert_eq!(unescape(r"\'"), "'");
    }

    #[test]
    fn test_decode_character() {
        assert_eq!(decode_character("`a`"), 'a' as u32);
        assert_eq!(decode_character("`\\n`"), '\n' as u32);
        assert_eq!(decode_character("`\\x41`"), 0x41);
        assert_eq!(decode_character("``"), 0);
    }

    #[test]
    fn test_precedence_ladder_is_total() {
        let mut level = Precedence::None;
        let mut count = 1;
        while let Some(next) = level.next() {
            assert!(next > level);
            level = next;
            count += 1;
        }
        assert_eq!(count, 11);
        assert_eq!(level, Precedence::Binding);
    }
}
