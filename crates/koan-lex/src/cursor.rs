//! Character cursor for traversing source text.
//!
//! Maintains position state while scanning: the byte position, the
//! byte offset of the current line's start, and a line counter. The
//! line data feeds the packed source locations; the cursor itself
//! never interprets lexemes.

/// A cursor over UTF-8 source text.
///
/// # Example
///
/// ```
/// use koan_lex::cursor::Cursor;
///
/// let mut cursor = Cursor::new("ab");
/// assert_eq!(cursor.current(), 'a');
/// cursor.advance();
/// assert_eq!(cursor.current(), 'b');
/// ```
pub struct Cursor<'a> {
    source: &'a str,
    position: usize,
    line_start: usize,
    line: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Cursor { source, position: 0, line_start: 0, line: 1 }
    }

    /// Resume scanning mid-stream with an inherited line counter (the
    /// REPL feeds one logical source line by line).
    pub fn with_line(source: &'a str, line: u32) -> Self {
        Cursor { source, position: 0, line_start: 0, line }
    }

    #[inline]
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Current byte position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// 1-based line number.
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Byte offset of the current position from the start of its line.
    #[inline]
    pub fn line_offset(&self) -> usize {
        self.position.saturating_sub(self.line_start)
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    /// The character at the cursor, or NUL at end of input.
    #[inline]
    pub fn current(&self) -> char {
        self.char_at(self.position)
    }

    /// The character one position ahead of the cursor.
    #[inline]
    pub fn peek(&self) -> char {
        self.char_at(self.position + self.current().len_utf8())
    }

    #[inline]
    fn char_at(&self, pos: usize) -> char {
        if pos >= self.source.len() {
            return '\0';
        }
        // Fast path for ASCII (most common case).
        let b = self.source.as_bytes()[pos];
        if b < 128 {
            return b as char;
        }
        self.source[pos..].chars().next().unwrap_or('\0')
    }

    /// Advance over the current character without line accounting.
    /// Callers that can see an end-of-line must use [`Cursor::advance_eol`].
    #[inline]
    pub fn advance(&mut self) {
        if self.position < self.source.len() {
            self.position += self.current().len_utf8();
        }
    }

    /// Advance over an end-of-line character, collapsing CR/LF and
    /// LF/CR pairs into one line break, and bump the line counter.
    pub fn advance_eol(&mut self) {
        let c = self.current();
        self.advance();
        match (c, self.current()) {
            ('\r', '\n') | ('\n', '\r') => self.advance(),
            _ => {}
        }
        self.line += 1;
        self.line_start = self.position;
    }

    /// The source slice from `start` to the current position.
    #[inline]
    pub fn slice_from(&self, start: usize) -> &'a str {
        &self.source[start..self.position]
    }

    /// Rewind to an earlier byte position on the current line. Used by
    /// the scanner to back out of speculative reads; never crosses an
    /// end-of-line, so the line accounting stays valid.
    #[inline]
    pub(crate) fn rewind(&mut self, position: usize) {
        debug_assert!(position <= self.position);
        debug_assert!(position >= self.line_start);
        self.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_walk() {
        let mut c = Cursor::new("abc");
        assert_eq!(c.current(), 'a');
        c.advance();
        c.advance();
        assert_eq!(c.current(), 'c');
        c.advance();
        assert!(c.is_at_end());
        assert_eq!(c.current(), '\0');
    }

    #[test]
    fn test_utf8_walk() {
        let mut c = Cursor::new("aπb");
        c.advance();
        assert_eq!(c.current(), 'π');
        c.advance();
        assert_eq!(c.current(), 'b');
    }

    #[test]
    fn test_crlf_collapses() {
        let mut c = Cursor::new("a\r\nb");
        c.advance();
        c.advance_eol();
        assert_eq!(c.line(), 2);
        assert_eq!(c.current(), 'b');
        assert_eq!(c.line_offset(), 0);
    }

    #[test]
    fn test_line_offset_tracks_line_start() {
        let mut c = Cursor::new("ab\ncd");
        c.advance();
        c.advance();
        c.advance_eol();
        c.advance();
        assert_eq!(c.line(), 2);
        assert_eq!(c.line_offset(), 1);
    }
}
