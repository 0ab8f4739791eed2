//! Tokenizer for directive templates.
//!
//! Splits source text into literal text, echoes (`{{ }}` / `{!! !!}`),
//! directives (`@name(args)`) and native Tera `{% block %}` markers.
//! Comments (`{{-- --}}`) and `@php` spans are consumed here and never
//! reach the parser. Every token records the 1-based line it starts on.

use super::ast::Trim;
use crate::core::{BladeError, Result};

/// Directive names the lexer turns into [`Token::Directive`]; any other
/// `@word` is plain text.
const KNOWN_DIRECTIVES: &[&str] = &[
    "extends",
    "section",
    "endsection",
    "stop",
    "show",
    "yield",
    "block",
    "endblock",
    "include",
    "if",
    "elseif",
    "else",
    "endif",
    "unless",
    "endunless",
    "foreach",
    "endforeach",
    "php",
    "endphp",
    "parent",
];

/// Directives recognized even when glued to a preceding word (`Body@endsection`).
const CLOSING_DIRECTIVES: &[&str] = &[
    "endsection",
    "stop",
    "show",
    "endblock",
    "elseif",
    "else",
    "endif",
    "endunless",
    "endforeach",
    "endphp",
    "parent",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    /// Raw expression text between the delimiters, trimmed, with any
    /// `-` whitespace-control markers moved to `trim`.
    Echo {
        expr: String,
        escaped: bool,
        trim: Trim,
        line: usize,
    },
    /// `@{{ x }}` with the `@` removed.
    Verbatim(String),
    /// `@name` or `@name(args)`; `args` excludes the outer parentheses.
    Directive {
        name: String,
        args: Option<String>,
        line: usize,
    },
    /// `{% block name %}`
    NativeBlock { name: String, line: usize },
    /// `{% endblock %}`
    NativeEndBlock { line: usize },
}

/// Tokenize `source`; `template` is only used in error messages.
pub fn tokenize(template: &str, source: &str) -> Result<Vec<Token>> {
    Lexer {
        template,
        src: source,
        pos: 0,
        line: 1,
        text: String::new(),
        tokens: Vec::new(),
    }
    .run()
}

struct Lexer<'a> {
    template: &'a str,
    src: &'a str,
    pos: usize,
    line: usize,
    text: String,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>> {
        while self.pos < self.src.len() {
            let rest = self.rest();
            if rest.starts_with("{{--") {
                self.comment()?;
            } else if rest.starts_with("@{{") {
                self.verbatim()?;
            } else if rest.starts_with("@@") {
                self.text.push('@');
                self.advance(2);
            } else if rest.starts_with('@') {
                self.at_sign()?;
            } else if rest.starts_with("{!!") {
                self.echo("{!!", "!!}", false)?;
            } else if rest.starts_with("{{") {
                self.echo("{{", "}}", true)?;
            } else if rest.starts_with("{%") {
                self.native_tag()?;
            } else if rest.starts_with("{#") {
                let end = rest
                    .find("#}")
                    .map(|idx| idx + 2)
                    .ok_or_else(|| self.error(self.line, "unclosed '{#'"))?;
                self.push_text_span(end);
            } else {
                self.push_char();
            }
        }
        self.flush_text();
        Ok(self.tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.src[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count();
        self.pos += len;
    }

    fn push_char(&mut self) {
        if let Some(ch) = self.rest().chars().next() {
            self.text.push(ch);
            self.advance(ch.len_utf8());
        }
    }

    /// Copy the next `len` bytes to the text buffer unchanged.
    fn push_text_span(&mut self, len: usize) {
        let span = &self.src[self.pos..self.pos + len];
        self.text.push_str(span);
        self.advance(len);
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.tokens.push(Token::Text(std::mem::take(&mut self.text)));
        }
    }

    fn emit(&mut self, token: Token) {
        self.flush_text();
        self.tokens.push(token);
    }

    fn error(&self, line: usize, message: impl Into<String>) -> BladeError {
        BladeError::directive(self.template, line, message)
    }

    /// Byte length from `pos` through the end of `close`, searching after
    /// `open_len` bytes and skipping quoted strings.
    fn require_close(&self, open_len: usize, close: &str, what: &str) -> Result<usize> {
        find_unquoted(self.rest(), open_len, close)
            .map(|idx| idx + close.len())
            .ok_or_else(|| self.error(self.line, format!("unclosed {what}")))
    }

    fn comment(&mut self) -> Result<()> {
        let end = self
            .rest()
            .find("--}}")
            .map(|idx| idx + 4)
            .ok_or_else(|| self.error(self.line, "unclosed comment '{{--'"))?;
        self.advance(end);
        Ok(())
    }

    fn verbatim(&mut self) -> Result<()> {
        let end = self.require_close(3, "}}", "'@{{'")?;
        let literal = self.src[self.pos + 1..self.pos + end].to_string();
        self.advance(end);
        self.emit(Token::Verbatim(literal));
        Ok(())
    }

    fn echo(&mut self, open: &str, close: &str, escaped: bool) -> Result<()> {
        let line = self.line;
        let end = self.require_close(open.len(), close, &format!("'{open}'"))?;
        let mut inner = &self.src[self.pos + open.len()..self.pos + end - close.len()];
        let mut trim = Trim::default();
        if let Some(rest) = inner.strip_prefix('-') {
            trim.left = true;
            inner = rest;
        }
        if let Some(rest) = inner.strip_suffix('-') {
            trim.right = true;
            inner = rest;
        }
        let expr = inner.trim().to_string();
        if expr.is_empty() {
            return Err(self.error(line, format!("empty '{open} {close}' expression")));
        }
        self.advance(end);
        self.emit(Token::Echo {
            expr,
            escaped,
            trim,
            line,
        });
        Ok(())
    }

    fn native_tag(&mut self) -> Result<()> {
        let line = self.line;
        let end = self.require_close(2, "%}", "'{%'")?;
        let inner = self.src[self.pos + 2..self.pos + end - 2]
            .trim_start_matches('-')
            .trim_end_matches('-')
            .trim();
        let mut words = inner.split_whitespace();
        match words.next() {
            Some("raw") => {
                // Everything up to the matching endraw stays untouched
                let close = self.rest()[end..]
                    .find("endraw")
                    .and_then(|idx| {
                        let after = end + idx;
                        self.rest()[after..].find("%}").map(|close| after + close + 2)
                    })
                    .ok_or_else(|| self.error(line, "unclosed '{% raw %}'"))?;
                self.push_text_span(close);
            }
            Some("block") => {
                let name = words
                    .next()
                    .ok_or_else(|| self.error(line, "'{% block %}' requires a name"))?
                    .to_string();
                if !name.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                    return Err(self.error(line, format!("invalid block name '{name}'")));
                }
                self.advance(end);
                self.emit(Token::NativeBlock { name, line });
            }
            Some("endblock") => {
                self.advance(end);
                self.emit(Token::NativeEndBlock { line });
            }
            _ => self.push_text_span(end),
        }
        Ok(())
    }

    fn at_sign(&mut self) -> Result<()> {
        let line = self.line;
        let preceded_by_word = self.src[..self.pos]
            .chars()
            .next_back()
            .is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.');

        let ident_len = self.rest()[1..]
            .bytes()
            .take_while(u8::is_ascii_alphabetic)
            .count();
        let name = &self.rest()[1..1 + ident_len];

        // `me@if.com` is an address, not a directive
        let mut after_ident = self.rest()[1 + ident_len..].chars();
        let looks_like_address = after_ident.next() == Some('.')
            && after_ident.next().is_some_and(char::is_alphanumeric);

        if !KNOWN_DIRECTIVES.contains(&name)
            || looks_like_address
            || (preceded_by_word && !CLOSING_DIRECTIVES.contains(&name))
        {
            self.push_char();
            return Ok(());
        }
        let name = name.to_string();
        let mut consumed = 1 + ident_len;

        // Optional horizontal whitespace before an argument list
        let after = &self.rest()[consumed..];
        let gap = after.len() - after.trim_start_matches([' ', '\t']).len();
        let mut args = None;
        if after[gap..].starts_with('(') {
            let close = find_matching_paren(&after[gap..]).ok_or_else(|| {
                self.error(line, format!("unclosed '(' in @{name}"))
            })?;
            args = Some(after[gap + 1..gap + close].trim().to_string());
            consumed += gap + close + 1;
        }

        if name == "php" {
            if args.is_none() {
                let end = self.rest()[consumed..]
                    .find("@endphp")
                    .ok_or_else(|| self.error(line, "unclosed @php block"))?;
                consumed += end + "@endphp".len();
            }
            self.advance(consumed);
            return Ok(());
        }

        self.advance(consumed);
        self.emit(Token::Directive { name, args, line });
        Ok(())
    }
}

/// Index of `close` in `haystack` at or after `from`, ignoring occurrences
/// inside single- or double-quoted strings.
pub(crate) fn find_unquoted(haystack: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if bytes[i..].starts_with(close.as_bytes()) {
                    return Some(i);
                }
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                }
            }
        }
        i += 1;
    }
    None
}

/// Index of the `)` matching the `(` at the start of `s`.
fn find_matching_paren(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}
