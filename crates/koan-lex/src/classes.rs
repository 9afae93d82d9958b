//! Character classes.
//!
//! The reserved set `" ' ` ( ) [ ] { } ; , # \` is carved out of the
//! operator space; everything else symbol-like is an operator
//! character, so user-defined operators can use any maximal run of
//! them. Identifier classes stand in for Unicode ID_Start/ID_Continue
//! with the stdlib's alphabetic/alphanumeric queries plus `_` and `$`.

#[inline]
pub fn is_space(c: char) -> bool {
    c == '\t' || c == ' ' || (c.is_whitespace() && !is_eol(c))
}

#[inline]
pub fn is_eol(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\x0b' | '\x0c' | '\u{85}' | '\u{2028}' | '\u{2029}')
}

#[inline]
pub fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

#[inline]
pub fn is_xdigit(c: char) -> bool {
    c.is_ascii_hexdigit()
}

#[inline]
pub fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

#[inline]
pub fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[inline]
pub fn is_reserved(c: char) -> bool {
    matches!(c, '\\' | '"' | '\'' | '`' | '(' | '[' | '{' | ')' | ']' | '}' | ';' | ',' | '#')
}

/// An operator code point: symbol-like, not reserved. Backslash counts
/// so escaped runs lex as one token.
#[inline]
pub fn is_operator(c: char) -> bool {
    match c {
        '\\' => true,
        _ if is_reserved(c) => false,
        _ => {
            !c.is_alphanumeric()
                && !c.is_whitespace()
                && !c.is_control()
                && c != '_'
                && c != '$'
                && c != '\0'
        }
    }
}

/// Can this code point begin a primary expression?
#[inline]
pub fn is_primary(c: char) -> bool {
    match c {
        '"' | '\'' | '`' | '(' | '[' | '{' => true,
        '\\' | ')' | ']' | '}' | ';' | ',' | '#' => false,
        _ => is_ident_start(c) || is_digit(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_excludes_reserved() {
        for c in "\"'`()[]{};,#".chars() {
            assert!(!is_operator(c), "{:?} must not be an operator", c);
        }
        assert!(is_operator('\\'));
        for c in "+-*/%<>=!?:&|~^.@".chars() {
            assert!(is_operator(c), "{:?} must be an operator", c);
        }
    }

    #[test]
    fn test_ident_classes() {
        assert!(is_ident_start('a'));
        assert!(is_ident_start('_'));
        assert!(is_ident_start('λ'));
        assert!(!is_ident_start('1'));
        assert!(is_ident_continue('1'));
        assert!(!is_ident_continue('+'));
    }

    #[test]
    fn test_primary() {
        assert!(is_primary('x'));
        assert!(is_primary('9'));
        assert!(is_primary('('));
        assert!(is_primary('"'));
        assert!(!is_primary(')'));
        assert!(!is_primary(','));
        assert!(!is_primary('+'));
    }

    #[test]
    fn test_eol_variants() {
        for c in ['\n', '\r', '\u{85}', '\u{2028}', '\u{2029}'] {
            assert!(is_eol(c));
            assert!(!is_space(c));
        }
        assert!(is_space('\t'));
        assert!(is_space(' '));
    }
}
