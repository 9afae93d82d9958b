//! koan-lex - Lexical analysis for the Koan interpreter.
//!
//! The scanner produces lexemes by maximal munch: each call to
//! [`Lexer::next_lexeme`] skips whitespace, end-of-lines and comments,
//! then returns the longest token starting at the cursor as a borrowed
//! slice of the source. Classification into AST nodes happens later,
//! in the parser's node factory; the lexer only finds boundaries and
//! tracks lines for source locations.
//!
//! Token shapes:
//!
//! - numbers: decimal or `0x` hex, optional fraction after `.` when a
//!   digit follows, optional `e`/`E` (decimal) or `p`/`P` (hex)
//!   exponent whose sign is accepted only after a fraction
//! - identifiers: identifier-start then identifier-continue
//! - operators: a maximal run of operator code points
//! - grouping: `(`, `[`, `{`, `)`, `]`, `}`, `;`, `,` as singletons;
//!   immediately-closing pairs (`()`) and operator-only interiors
//!   (`[+]`) as one lexeme
//! - strings: `"..."` raw, `'...'` and `` `...` `` with backslash
//!   escapes; interior end-of-lines are legal and counted
//! - `\op` / `\ident`: a backslash glued to a maximal run, one token

pub mod classes;
pub mod cursor;

use classes::*;
use cursor::Cursor;
use koan_util::Sloc;
use tracing::trace;

/// One lexeme: the source slice plus the line/offset where it starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub text: &'a str,
    /// 1-based line of the first byte.
    pub line: u32,
    /// Byte offset of the first byte from its line start.
    pub offset: u32,
}

impl<'a> Lexeme<'a> {
    /// First character of the lexeme (classification key).
    #[inline]
    pub fn head(&self) -> char {
        self.text.chars().next().unwrap_or('\0')
    }

    /// The packed location of this lexeme within a source.
    #[inline]
    pub fn sloc(&self, source: u32) -> Sloc {
        Sloc::new(source, self.line, self.offset, self.text.len() as u32)
    }
}

/// The lexeme scanner.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { cursor: Cursor::new(source) }
    }

    /// Resume with an inherited line counter (REPL continuation lines).
    pub fn with_line(source: &'a str, line: u32) -> Self {
        Lexer { cursor: Cursor::with_line(source, line) }
    }

    /// Current line number (for the driver's sloc bookkeeping).
    pub fn line(&self) -> u32 {
        self.cursor.line()
    }

    /// Byte position of the scan head in the source.
    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    /// Scan the next lexeme, or `None` at end of input.
    pub fn next_lexeme(&mut self) -> Option<Lexeme<'a>> {
        loop {
            self.skip_blank();
            if self.cursor.is_at_end() {
                return None;
            }

            let start = self.cursor.position();
            let line = self.cursor.line();
            let offset = self.cursor.line_offset() as u32;
            let c = self.cursor.current();

            if c == '#' {
                self.skip_comment();
                continue;
            }

            if is_digit(c) {
                self.scan_number();
            } else if is_ident_start(c) {
                self.scan_ident();
            } else if c == '"' {
                self.scan_raw_string();
            } else if c == '\'' || c == '`' {
                self.scan_escaped_string(c);
            } else if c == '\\' {
                self.scan_escaped_token();
            } else if matches!(c, '(' | '[' | '{') {
                self.scan_open_bracket(c);
            } else if matches!(c, ')' | ']' | '}' | ';' | ',') {
                self.cursor.advance();
            } else if is_operator(c) {
                self.scan_operator_run();
            } else {
                // Stray code point outside every class; skip it.
                self.cursor.advance();
                continue;
            }

            let lexeme = Lexeme { text: self.cursor.slice_from(start), line, offset };
            trace!(line = lexeme.line, offset = lexeme.offset, text = lexeme.text, "lexeme");
            return Some(lexeme);
        }
    }

    fn skip_blank(&mut self) {
        loop {
            let c = self.cursor.current();
            if is_eol(c) {
                self.cursor.advance_eol();
            } else if is_space(c) {
                self.cursor.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        self.cursor.advance(); // '#'
        let c = self.cursor.current();
        if matches!(c, '(' | '[' | '{') {
            let open = c;
            let close = match c {
                '(' => ')',
                '[' => ']',
                _ => '}',
            };
            self.cursor.advance();
            let mut depth = 1usize;
            while !self.cursor.is_at_end() {
                let c = self.cursor.current();
                if c == open {
                    depth += 1;
                    self.cursor.advance();
                } else if c == close {
                    depth -= 1;
                    self.cursor.advance();
                    if depth == 0 {
                        break;
                    }
                } else if is_eol(c) {
                    self.cursor.advance_eol();
                } else {
                    self.cursor.advance();
                }
            }
        } else {
            while !self.cursor.is_at_end() && !is_eol(self.cursor.current()) {
                self.cursor.advance();
            }
        }
    }

    fn scan_number(&mut self) {
        let mut is_hex = false;
        if self.cursor.current() == '0' {
            self.cursor.advance();
            if matches!(self.cursor.current(), 'x' | 'X') {
                is_hex = true;
                self.cursor.advance();
            }
        }
        let digit: fn(char) -> bool = if is_hex { is_xdigit } else { is_digit };

        while digit(self.cursor.current()) {
            self.cursor.advance();
        }

        let mut is_float = false;
        if self.cursor.current() == '.' {
            let dot = self.cursor.position();
            self.cursor.advance();
            if digit(self.cursor.current()) {
                is_float = true;
                while digit(self.cursor.current()) {
                    self.cursor.advance();
                }
            } else {
                self.cursor.rewind(dot);
                return;
            }
        }

        let exponent = if is_hex { ['p', 'P'] } else { ['e', 'E'] };
        if exponent.contains(&self.cursor.current()) {
            let mark = self.cursor.position();
            self.cursor.advance();
            if is_float && matches!(self.cursor.current(), '+' | '-') {
                self.cursor.advance();
            }
            if is_digit(self.cursor.current()) {
                while is_digit(self.cursor.current()) {
                    self.cursor.advance();
                }
            } else {
                self.cursor.rewind(mark);
            }
        }
    }

    fn scan_ident(&mut self) {
        self.cursor.advance();
        while is_ident_continue(self.cursor.current()) {
            self.cursor.advance();
        }
    }

    fn scan_operator_run(&mut self) {
        while is_operator(self.cursor.current()) {
            self.cursor.advance();
        }
    }

    fn scan_escaped_token(&mut self) {
        self.cursor.advance(); // backslash
        let c = self.cursor.current();
        if is_operator(c) {
            self.scan_operator_run();
        } else if is_ident_start(c) {
            self.scan_ident();
        }
    }

    fn scan_open_bracket(&mut self, open: char) {
        let close = match open {
            '(' => ')',
            '[' => ']',
            _ => '}',
        };
        self.cursor.advance();
        let after_open = self.cursor.position();

        // Immediately-closing pair: one "empty" lexeme.
        if self.cursor.current() == close {
            self.cursor.advance();
            return;
        }
        // Operator-only interior, e.g. `(+)`: one "primitive" lexeme.
        if is_operator(self.cursor.current()) {
            self.scan_operator_run();
            if self.cursor.current() == close {
                self.cursor.advance();
                return;
            }
            self.cursor.rewind(after_open);
        }
    }

    fn scan_raw_string(&mut self) {
        self.cursor.advance(); // opening quote
        loop {
            let c = self.cursor.current();
            if c == '\0' && self.cursor.is_at_end() {
                return; // unterminated; the factory copes
            }
            if c == '"' {
                self.cursor.advance();
                return;
            }
            if is_eol(c) {
                self.cursor.advance_eol();
            } else {
                self.cursor.advance();
            }
        }
    }

    fn scan_escaped_string(&mut self, quote: char) {
        self.cursor.advance(); // opening quote
        loop {
            let c = self.cursor.current();
            if c == '\0' && self.cursor.is_at_end() {
                return;
            }
            if c == quote {
                self.cursor.advance();
                return;
            }
            if c == '\\' {
                self.cursor.advance();
                if self.cursor.is_at_end() {
                    return;
                }
                self.cursor.advance();
            } else if is_eol(c) {
                self.cursor.advance_eol();
            } else {
                self.cursor.advance();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(source: &str) -> Vec<String> {
        let mut lexer = Lexer::new(source);
        let mut out = Vec::new();
        while let Some(l) = lexer.next_lexeme() {
            out.push(l.text.to_string());
        }
        out
    }

    #[test]
    fn test_expression() {
        assert_eq!(lex_all("1 + 2 * 3;"), vec!["1", "+", "2", "*", "3", ";"]);
    }

    #[test]
    fn test_maximal_munch_operators() {
        assert_eq!(lex_all("a<<=b"), vec!["a", "<<=", "b"]);
        assert_eq!(lex_all("x:=1"), vec!["x", ":=", "1"]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(lex_all("42 0x1F 3.14 1e3 2.5e-3"), vec!["42", "0x1F", "3.14", "1e3", "2.5e-3"]);
        // A dot with no digit after it ends the number.
        assert_eq!(lex_all("1.x"), vec!["1", ".", "x"]);
        // An exponent sign without a fraction is not consumed.
        assert_eq!(lex_all("1e-3"), vec!["1", "e", "-", "3"]);
        // Hex floats take a p exponent.
        assert_eq!(lex_all("0x1.8p3"), vec!["0x1.8p3"]);
    }

    #[test]
    fn test_line_comment() {
        assert_eq!(lex_all("1 # rest ignored\n2"), vec!["1", "2"]);
    }

    #[test]
    fn test_block_comment_nests() {
        assert_eq!(lex_all("1 #( outer #( inner ) still ) 2"), vec!["1", "2"]);
        assert_eq!(lex_all("a #[ over\nlines ] b"), vec!["a", "b"]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(lex_all(r#""raw \n stays" x"#), vec![r#""raw \n stays""#, "x"]);
        assert_eq!(lex_all(r"'esc\'aped'"), vec![r"'esc\'aped'"]);
        assert_eq!(lex_all("`a`"), vec!["`a`"]);
    }

    #[test]
    fn test_string_interior_newline_counts() {
        let mut lexer = Lexer::new("\"a\nb\" x");
        lexer.next_lexeme().unwrap();
        let x = lexer.next_lexeme().unwrap();
        assert_eq!(x.text, "x");
        assert_eq!(x.line, 2);
    }

    #[test]
    fn test_empty_and_primitive_brackets() {
        assert_eq!(lex_all("()"), vec!["()"]);
        assert_eq!(lex_all("[] {}"), vec!["[]", "{}"]);
        assert_eq!(lex_all("(+)"), vec!["(+)"]);
        assert_eq!(lex_all("[+]"), vec!["[+]"]);
        // A non-operator interior is a plain open bracket.
        assert_eq!(lex_all("(a)"), vec!["(", "a", ")"]);
        assert_eq!(lex_all("(+ a)"), vec!["(", "+", "a", ")"]);
    }

    #[test]
    fn test_escaped_token() {
        assert_eq!(lex_all(r"\+ \name"), vec![r"\+", r"\name"]);
    }

    #[test]
    fn test_offsets() {
        let mut lexer = Lexer::new("ab cd\n  ef");
        let ab = lexer.next_lexeme().unwrap();
        assert_eq!((ab.line, ab.offset), (1, 0));
        let cd = lexer.next_lexeme().unwrap();
        assert_eq!((cd.line, cd.offset), (1, 3));
        let ef = lexer.next_lexeme().unwrap();
        assert_eq!((ef.line, ef.offset), (2, 2));
    }
}
