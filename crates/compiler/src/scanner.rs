//! Byte stream -> token stream.
//!
//! Handles whitespace/comment skipping, string/char/number literal
//! scanning, automatic semicolon insertion, and (optionally) mixed
//! text/code mode. Errors are accumulated via a handler closure so the
//! parser can keep going and surface every scan error in one pass
//! (spec.md §7).

use crate::token::{Token, TokenKind, lookup_keyword};
use gad_core::Pos;

/// Scanner configuration. `mixed_mode` switches on the text/code
/// alternation described in spec.md §4.1; when off (the default) the
/// scanner behaves as a plain code tokenizer.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub mixed_mode: bool,
    pub mixed_start: String,
    pub mixed_end: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            mixed_mode: false,
            mixed_start: "{{".to_string(),
            mixed_end: "}}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanError {
    pub pos: Pos,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Text,
}

pub struct Scanner<'a> {
    src: &'a [u8],
    base: Pos,
    offset: usize,
    config: ScannerConfig,
    mode: Mode,
    /// Tracks open `( [ {` depth so ASI is suppressed while it's nonzero.
    bracket_depth: i32,
    /// Kind of the previous non-whitespace token, for ASI decisions.
    last_kind: Option<TokenKind>,
    errors: Vec<ScanError>,
    pending_semi: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a [u8], base: Pos, config: ScannerConfig) -> Self {
        let mode = if config.mixed_mode { Mode::Text } else { Mode::Code };
        Scanner {
            src,
            base,
            offset: 0,
            config,
            mode,
            bracket_depth: 0,
            last_kind: None,
            errors: Vec::new(),
            pending_semi: false,
        }
    }

    pub fn errors(&self) -> &[ScanError] {
        &self.errors
    }

    fn error(&mut self, pos: Pos, msg: impl Into<String>) {
        self.errors.push(ScanError {
            pos,
            message: msg.into(),
        });
    }

    fn pos(&self) -> Pos {
        self.base + self.offset as u32
    }

    fn peek(&self) -> u8 {
        *self.src.get(self.offset).unwrap_or(&0)
    }

    fn peek_at(&self, n: usize) -> u8 {
        *self.src.get(self.offset + n).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let b = self.peek();
        if b != 0 {
            self.offset += 1;
        }
        b
    }

    fn at_eof(&self) -> bool {
        self.offset >= self.src.len()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.src[self.offset..].starts_with(s.as_bytes())
    }

    /// Scans and returns the next token. Tokenizes the whole source with
    /// repeated calls until `TokenKind::Eof`.
    pub fn next_token(&mut self) -> Token {
        if self.pending_semi {
            self.pending_semi = false;
            return Token::new(TokenKind::Semi, self.pos(), ";");
        }

        if self.mode == Mode::Text {
            return self.scan_text_mode();
        }

        self.skip_whitespace_and_comments();

        if self.at_eof() {
            let pos = self.pos();
            if self.last_kind.map(|k| k.ends_statement()).unwrap_or(false) {
                self.last_kind = None;
                return Token::new(TokenKind::Semi, pos, ";");
            }
            return Token::new(TokenKind::Eof, pos, "");
        }

        let start = self.pos();
        let c = self.peek();

        let tok = if c == b'#' && self.starts_with("# gad:") {
            self.scan_config_directive(start)
        } else if is_ident_start(c) {
            self.scan_ident_or_keyword(start)
        } else if c.is_ascii_digit() {
            self.scan_number(start)
        } else if c == b'"' {
            self.scan_string(start)
        } else if c == b'\'' {
            self.scan_char(start)
        } else if c == b'`' {
            self.scan_raw_or_heredoc(start)
        } else {
            self.scan_operator(start)
        };

        match tok.kind {
            TokenKind::LParen | TokenKind::LBrack | TokenKind::LBrace => self.bracket_depth += 1,
            TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => {
                self.bracket_depth = (self.bracket_depth - 1).max(0)
            }
            _ => {}
        }
        self.last_kind = Some(tok.kind);
        tok
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.offset += 1;
                }
                b'\n' => {
                    if self.bracket_depth == 0
                        && self.last_kind.map(|k| k.ends_statement()).unwrap_or(false)
                    {
                        self.pending_semi = true;
                        self.offset += 1;
                        return;
                    }
                    self.offset += 1;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.at_eof() && self.peek() != b'\n' {
                        self.offset += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.offset += 2;
                    while !self.at_eof() && !self.starts_with("*/") {
                        self.offset += 1;
                    }
                    if self.starts_with("*/") {
                        self.offset += 2;
                    } else {
                        let pos = self.pos();
                        self.error(pos, "unterminated block comment");
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_config_directive(&mut self, start: Pos) -> Token {
        let mut end = self.offset;
        while end < self.src.len() && self.src[end] != b'\n' {
            end += 1;
        }
        let text = String::from_utf8_lossy(&self.src[self.offset..end]).to_string();
        self.offset = end;
        Token::new(TokenKind::ConfigDirective, start, text)
    }

    fn scan_ident_or_keyword(&mut self, start: Pos) -> Token {
        let begin = self.offset;
        while is_ident_continue(self.peek()) {
            self.offset += 1;
        }
        let text = String::from_utf8_lossy(&self.src[begin..self.offset]).to_string();
        let kind = lookup_keyword(&text).unwrap_or(TokenKind::Ident);
        Token::new(kind, start, text)
    }

    fn scan_number(&mut self, start: Pos) -> Token {
        let begin = self.offset;
        let mut is_float = false;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.offset += 2;
            while self.peek().is_ascii_hexdigit() {
                self.offset += 1;
            }
        } else if self.peek() == b'0' && self.peek_at(1).is_ascii_digit() {
            // old-style leading-zero octal
            self.offset += 1;
            while (b'0'..=b'7').contains(&self.peek()) {
                self.offset += 1;
            }
        } else {
            while self.peek().is_ascii_digit() {
                self.offset += 1;
            }
            if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
                is_float = true;
                self.offset += 1;
                while self.peek().is_ascii_digit() {
                    self.offset += 1;
                }
            }
            if matches!(self.peek(), b'e' | b'E') {
                let save = self.offset;
                let mut probe = self.offset + 1;
                if matches!(self.src.get(probe), Some(b'+') | Some(b'-')) {
                    probe += 1;
                }
                if self.src.get(probe).is_some_and(u8::is_ascii_digit) {
                    is_float = true;
                    self.offset = probe;
                    while self.peek().is_ascii_digit() {
                        self.offset += 1;
                    }
                } else {
                    self.offset = save;
                }
            }
        }

        let mut kind = if is_float { TokenKind::Float } else { TokenKind::Int };
        if self.peek() == b'd' && !is_ident_continue(self.peek_at(1)) {
            kind = TokenKind::Decimal;
            self.offset += 1;
        } else if self.peek() == b'u' && !is_ident_continue(self.peek_at(1)) && !is_float {
            kind = TokenKind::Uint;
            self.offset += 1;
        }
        let text = String::from_utf8_lossy(&self.src[begin..self.offset]).to_string();
        Token::new(kind, start, text)
    }

    fn scan_string(&mut self, start: Pos) -> Token {
        self.offset += 1; // opening quote
        let mut value = String::new();
        loop {
            if self.at_eof() {
                self.error(start, "unterminated string literal");
                break;
            }
            let c = self.bump();
            if c == b'"' {
                break;
            }
            if c == b'\\' {
                match self.scan_escape() {
                    Ok(ch) => value.push(ch),
                    Err(msg) => self.error(self.pos(), msg),
                }
                continue;
            }
            value.push(c as char);
        }
        Token::new(TokenKind::String, start, value)
    }

    fn scan_char(&mut self, start: Pos) -> Token {
        self.offset += 1;
        let ch = if self.peek() == b'\\' {
            self.offset += 1;
            match self.scan_escape() {
                Ok(c) => c,
                Err(msg) => {
                    self.error(self.pos(), msg);
                    '\0'
                }
            }
        } else {
            self.bump() as char
        };
        if self.peek() == b'\'' {
            self.offset += 1;
        } else {
            self.error(self.pos(), "unterminated char literal");
        }
        Token::new(TokenKind::Char, start, ch.to_string())
    }

    /// Scans one escape sequence body (the character(s) after the `\`).
    fn scan_escape(&mut self) -> Result<char, String> {
        let c = self.bump();
        Ok(match c {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'\\' => '\\',
            b'\'' => '\'',
            b'"' => '"',
            b'0' => '\0',
            b'x' => {
                let hi = self.bump();
                let lo = self.bump();
                let v = hex_digit(hi).ok_or("invalid \\x escape")? * 16
                    + hex_digit(lo).ok_or("invalid \\x escape")?;
                v as u8 as char
            }
            b'u' => self.scan_unicode_escape(4)?,
            b'U' => self.scan_unicode_escape(8)?,
            c if (b'1'..=b'7').contains(&c) => {
                let mut v = (c - b'0') as u32;
                for _ in 0..2 {
                    if (b'0'..=b'7').contains(&self.peek()) {
                        v = v * 8 + (self.bump() - b'0') as u32;
                    }
                }
                char::from_u32(v).unwrap_or('\u{FFFD}')
            }
            _ => return Err(format!("invalid escape sequence \\{}", c as char)),
        })
    }

    fn scan_unicode_escape(&mut self, digits: u32) -> Result<char, String> {
        let mut v: u32 = 0;
        for _ in 0..digits {
            let d = hex_digit(self.bump()).ok_or("invalid unicode escape")?;
            v = v * 16 + d;
        }
        char::from_u32(v).ok_or_else(|| "invalid unicode scalar value".to_string())
    }

    fn scan_raw_or_heredoc(&mut self, start: Pos) -> Token {
        let mut ticks = 0;
        while self.peek() == b'`' {
            ticks += 1;
            self.offset += 1;
        }
        if ticks < 3 {
            // plain raw string: consume until the single closing backtick
            let begin = self.offset;
            while !self.at_eof() && self.peek() != b'`' {
                self.offset += 1;
            }
            let text = String::from_utf8_lossy(&self.src[begin..self.offset]).to_string();
            if self.peek() == b'`' {
                self.offset += 1;
            } else {
                self.error(start, "unterminated raw string literal");
            }
            return Token::new(TokenKind::RawString, start, text);
        }

        // heredoc: find a run of `ticks` backticks that closes it.
        let delim: Vec<u8> = vec![b'`'; ticks];
        let begin = self.offset;
        let mut end = None;
        let mut i = self.offset;
        while i + ticks <= self.src.len() {
            if &self.src[i..i + ticks] == delim.as_slice() {
                end = Some(i);
                break;
            }
            i += 1;
        }
        let Some(end) = end else {
            self.error(start, "unterminated heredoc literal");
            self.offset = self.src.len();
            return Token::new(TokenKind::Heredoc, start, "");
        };
        let raw = &self.src[begin..end];
        self.offset = end + ticks;
        let text = strip_common_indent(raw);
        Token::new(TokenKind::Heredoc, start, text)
    }

    fn scan_operator(&mut self, start: Pos) -> Token {
        use TokenKind::*;
        macro_rules! tok {
            ($n:expr, $kind:expr) => {{
                self.offset += $n;
                return Token::new($kind, start, "");
            }};
        }
        let c0 = self.peek();
        let c1 = self.peek_at(1);
        let c2 = self.peek_at(2);
        match (c0, c1, c2) {
            (b'*', b'*', _) => tok!(2, Pow),
            (b'&', b'^', b'=') => tok!(3, AndNotAssign),
            (b'&', b'^', _) => tok!(2, AndNot),
            (b'&', b'&', b'=') => tok!(3, LandAssign),
            (b'&', b'&', _) => tok!(2, Land),
            (b'&', b'=', _) => tok!(2, AndAssign),
            (b'|', b'|', b'=') => tok!(3, LorAssign),
            (b'|', b'|', _) => tok!(2, Lor),
            (b'|', b'=', _) => tok!(2, OrAssign),
            (b'.', b'|', _) => tok!(2, Pipe),
            (b'.', b'.', _) => tok!(2, DotDot),
            (b'?', b'?', b'=') => tok!(3, NullichAssign),
            (b'?', b'?', _) => tok!(2, NullichCoalesce),
            (b'?', b'.', _) => tok!(2, NullDot),
            (b'~', b'~', b'~') => tok!(3, Tilde),
            (b'~', b'~', _) => tok!(2, Tilde),
            (b'=', b'=', _) => tok!(2, Eql),
            (b'!', b'=', _) => tok!(2, Neq),
            (b'<', b'=', _) => tok!(2, Leq),
            (b'>', b'=', _) => tok!(2, Geq),
            (b'<', b'<', b'=') => tok!(3, ShlAssign),
            (b'<', b'<', _) => tok!(2, Shl),
            (b'>', b'>', b'=') => tok!(3, ShrAssign),
            (b'>', b'>', _) => tok!(2, Shr),
            (b':', b'=', _) => tok!(2, Define),
            (b'+', b'+', _) => tok!(2, Inc),
            (b'-', b'-', _) => tok!(2, Dec),
            (b'+', b'=', _) => tok!(2, AddAssign),
            (b'-', b'=', _) => tok!(2, SubAssign),
            (b'*', b'=', _) => tok!(2, MulAssign),
            (b'/', b'=', _) => tok!(2, QuoAssign),
            (b'%', b'=', _) => tok!(2, RemAssign),
            (b'^', b'=', _) => tok!(2, XorAssign),
            _ => {}
        }
        match c0 {
            b'+' => tok!(1, Add),
            b'-' => tok!(1, Sub),
            b'*' => tok!(1, Mul),
            b'/' => tok!(1, Quo),
            b'%' => tok!(1, Rem),
            b'&' => tok!(1, And),
            b'|' => tok!(1, Or),
            b'^' => tok!(1, Xor),
            b'=' => tok!(1, Assign),
            b'<' => tok!(1, Lss),
            b'>' => tok!(1, Gtr),
            b'!' => tok!(1, Not),
            b'~' => tok!(1, Tilde),
            b'(' => tok!(1, LParen),
            b')' => tok!(1, RParen),
            b'[' => tok!(1, LBrack),
            b']' => tok!(1, RBrack),
            b'{' => tok!(1, LBrace),
            b'}' => tok!(1, RBrace),
            b',' => tok!(1, Comma),
            b';' => tok!(1, Semi),
            b':' => tok!(1, Colon),
            b'.' => tok!(1, Dot),
            b'?' => tok!(1, Question),
            b'@' => tok!(1, At),
            0 => Token::new(TokenKind::Eof, start, ""),
            other => {
                self.offset += 1;
                self.error(start, format!("illegal character {:?}", other as char));
                Token::new(TokenKind::Illegal, start, (other as char).to_string())
            }
        }
    }

    fn scan_text_mode(&mut self) -> Token {
        let start = self.pos();
        if self.starts_with(&self.config.mixed_start.clone()) {
            let n = self.config.mixed_start.len();
            self.offset += n;
            self.mode = Mode::Code;
            self.last_kind = None;
            return Token::new(TokenKind::MixedStart, start, &self.config.mixed_start);
        }
        let begin = self.offset;
        while !self.at_eof() && !self.starts_with(&self.config.mixed_start.clone()) {
            self.offset += 1;
        }
        let text = String::from_utf8_lossy(&self.src[begin..self.offset]).to_string();
        Token::new(TokenKind::MixedText, start, text)
    }

    /// Called by the parser when it consumes `MixedEnd`-equivalent closing
    /// delimiter, to switch the scanner back to text mode.
    pub fn enter_text_mode(&mut self) {
        self.mode = Mode::Text;
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn hex_digit(c: u8) -> Option<u32> {
    (c as char).to_digit(16)
}

/// Strips the common leading-whitespace prefix from a heredoc body, using
/// the indentation of the line containing the closing delimiter as the
/// reference (spec.md §4.1).
fn strip_common_indent(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() <= 1 {
        return text.trim_matches('\n').to_string();
    }
    let last = lines.last().copied().unwrap_or("");
    let indent: String = last.chars().take_while(|c| c.is_whitespace()).collect();
    if indent.is_empty() {
        return text.trim_start_matches('\n').to_string();
    }
    let stripped: Vec<&str> = lines
        .iter()
        .map(|l| l.strip_prefix(indent.as_str()).unwrap_or(l))
        .collect();
    let mut out = stripped.join("\n");
    if out.starts_with('\n') {
        out.remove(0);
    }
    out
}

/// Scans the entire source into a token vector, collecting scan errors.
pub fn tokenize(src: &[u8], base: Pos, config: ScannerConfig) -> (Vec<Token>, Vec<ScanError>) {
    let mut scanner = Scanner::new(src, base, config);
    let mut tokens = Vec::new();
    loop {
        let tok = scanner.next_token();
        let is_eof = tok.kind == TokenKind::Eof;
        tokens.push(tok);
        if is_eof {
            break;
        }
    }
    (tokens, scanner.errors().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (toks, errs) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
        assert!(errs.is_empty(), "unexpected scan errors: {errs:?}");
        toks.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn identifier_round_trips() {
        let (toks, errs) = tokenize(b"foo_bar", 0, ScannerConfig::default());
        assert!(errs.is_empty());
        assert_eq!(toks[0].kind, TokenKind::Ident);
        assert_eq!(toks[0].text, "foo_bar");
    }

    #[test]
    fn integer_literal_forms() {
        for (src, expected_kind) in [
            ("123", TokenKind::Int),
            ("0x1F", TokenKind::Int),
            ("017", TokenKind::Int),
            ("1.5", TokenKind::Float),
            ("1e10", TokenKind::Float),
            ("5d", TokenKind::Decimal),
            ("5u", TokenKind::Uint),
        ] {
            let (toks, errs) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
            assert!(errs.is_empty(), "{src}: {errs:?}");
            assert_eq!(toks[0].kind, expected_kind, "for {src}");
        }
    }

    #[test]
    fn string_escapes() {
        let (toks, errs) = tokenize(br#""a\nb\tc\\d""#, 0, ScannerConfig::default());
        assert!(errs.is_empty());
        assert_eq!(toks[0].text, "a\nb\tc\\d");
    }

    #[test]
    fn asi_inserts_semicolon_after_identifier_newline() {
        let ks = kinds("x\ny");
        assert_eq!(
            ks,
            vec![
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn asi_suppressed_inside_parens() {
        let ks = kinds("(x\ny)");
        assert_eq!(
            ks,
            vec![
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::Semi,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn heredoc_strips_common_indent() {
        let src = "```\n  hello\n  world\n  ```";
        let (toks, errs) = tokenize(src.as_bytes(), 0, ScannerConfig::default());
        assert!(errs.is_empty());
        assert_eq!(toks[0].kind, TokenKind::Heredoc);
        assert_eq!(toks[0].text, "hello\nworld");
    }

    #[test]
    fn illegal_character_is_reported() {
        let (_, errs) = tokenize(b"$", 0, ScannerConfig::default());
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn line_comment_is_skipped() {
        let ks = kinds("x // comment\ny");
        assert!(ks.contains(&TokenKind::Ident));
        assert!(!ks.is_empty());
    }
}
