//! Recursive-descent parser from tokens to a [`Document`].
//!
//! Every opening directive consumes tokens until its own closer, so
//! balancing falls out of the recursion: a closer that nobody is waiting for
//! is reported as unexpected, and running out of tokens inside an opener is
//! reported against the line the opener started on.

use super::ast::{Branch, Document, Node, Trim, coalesce, trim_body};
use super::expr;
use super::lexer::{Token, tokenize};
use crate::core::{BladeError, Result};
use std::collections::HashSet;

/// Parse directive source text.
pub fn parse(template: &str, source: &str) -> Result<Document> {
    let tokens = tokenize(template, source)?;
    let mut parser = Parser {
        template,
        tokens,
        pos: 0,
        layout: None,
        sections: HashSet::new(),
    };
    let (nodes, closer) = parser.parse_until(&[])?;
    debug_assert!(closer.is_none());
    Ok(Document {
        layout: parser.layout,
        nodes: coalesce(nodes),
    })
}

/// The directive that ended a nested body.
struct Closer {
    name: String,
    args: Option<String>,
    line: usize,
}

struct Parser<'a> {
    template: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    layout: Option<String>,
    /// Section names already defined in this template
    sections: HashSet<String>,
}

const CLOSERS: &[&str] = &[
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
];

impl Parser<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> BladeError {
        BladeError::directive(self.template, line, message)
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Parse nodes until one of `closers` (or the end of input at top level).
    fn parse_until(&mut self, closers: &[&str]) -> Result<(Vec<Node>, Option<Closer>)> {
        let mut nodes = Vec::new();
        while let Some(token) = self.next_token() {
            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Verbatim(text) => nodes.push(Node::Verbatim(text)),
                Token::Echo {
                    expr,
                    escaped,
                    trim,
                    line,
                } => nodes.push(self.echo(&expr, escaped, trim, line)?),
                Token::NativeBlock { name, line } => {
                    let body = self.parse_body(&["endblock"], "{% block %}", line)?.0;
                    nodes.push(Node::Block { name, body });
                }
                Token::NativeEndBlock { line } => {
                    if closers.contains(&"endblock") {
                        return Ok((
                            nodes,
                            Some(Closer {
                                name: "endblock".to_string(),
                                args: None,
                                line,
                            }),
                        ));
                    }
                    return Err(self.error(line, "unexpected {% endblock %}"));
                }
                Token::Directive { name, args, line } => {
                    if CLOSERS.contains(&name.as_str()) {
                        if closers.contains(&name.as_str()) {
                            return Ok((nodes, Some(Closer { name, args, line })));
                        }
                        return Err(self.error(line, format!("unexpected @{name}")));
                    }
                    if let Some(node) = self.directive(&name, args, line)? {
                        nodes.push(node);
                    }
                }
            }
        }
        Ok((nodes, None))
    }

    /// Parse a nested body, failing if input ends before a closer.
    fn parse_body(
        &mut self,
        closers: &[&str],
        opener: &str,
        line: usize,
    ) -> Result<(Vec<Node>, Closer)> {
        let (nodes, closer) = self.parse_until(closers)?;
        let closer = closer.ok_or_else(|| {
            self.error(
                line,
                format!("unclosed {opener} (expected @{})", closers.join(" or @")),
            )
        })?;
        Ok((coalesce(nodes), closer))
    }

    fn echo(&self, raw: &str, escaped: bool, trim: Trim, line: usize) -> Result<Node> {
        let expr = expr::normalize(raw).map_err(|e| self.error(line, e))?;
        Ok(Node::Echo {
            expr,
            escaped,
            trim,
        })
    }

    fn require_args(&self, name: &str, args: Option<String>, line: usize) -> Result<String> {
        match args {
            Some(args) if !args.trim().is_empty() => Ok(args),
            _ => Err(self.error(line, format!("@{name} requires an argument"))),
        }
    }

    fn condition(&self, raw: &str, line: usize) -> Result<String> {
        expr::normalize(raw).map_err(|e| self.error(line, e))
    }

    fn directive(&mut self, name: &str, args: Option<String>, line: usize) -> Result<Option<Node>> {
        let node = match name {
            "extends" => {
                let args = self.require_args(name, args, line)?;
                if self.layout.is_some() {
                    return Err(self.error(line, "a template may only @extends one layout"));
                }
                self.layout = Some(self.name_arg(name, &args, line)?);
                return Ok(None);
            }
            "section" => self.section(args, line)?,
            "parent" => Node::Parent,
            "block" => {
                let args = self.require_args(name, args, line)?;
                let block_name = self.name_arg(name, &args, line)?;
                let opener = format!("@block('{block_name}')");
                let body = self.parse_body(&["endblock"], &opener, line)?.0;
                Node::Block {
                    name: block_name,
                    body,
                }
            }
            "yield" => {
                let args = self.require_args(name, args, line)?;
                let parts = split_args(&args);
                let slot = self.name_arg(name, &parts[0], line)?;
                let default = match parts.get(1) {
                    Some(raw) => Some(string_literal(raw).ok_or_else(|| {
                        self.error(line, "@yield default must be a string literal")
                    })?),
                    None => None,
                };
                Node::Yield {
                    name: slot,
                    default,
                }
            }
            "include" => {
                let args = self.require_args(name, args, line)?;
                let parts = split_args(&args);
                if parts.len() > 1 {
                    return Err(self.error(line, "@include does not accept data arguments"));
                }
                Node::Include {
                    name: self.name_arg(name, &parts[0], line)?,
                    line,
                }
            }
            "if" => {
                let args = self.require_args(name, args, line)?;
                self.conditional(&args, line)?
            }
            "unless" => {
                let args = self.require_args(name, args, line)?;
                let condition = self.condition(&args, line)?;
                let (body, closer) = self.parse_body(&["else", "endunless"], "@unless", line)?;
                let otherwise = if closer.name == "else" {
                    Some(self.parse_body(&["endunless"], "@else", closer.line)?.0)
                } else {
                    None
                };
                Node::Unless {
                    condition,
                    body,
                    otherwise,
                }
            }
            "foreach" => {
                let args = self.require_args(name, args, line)?;
                let header = expr::parse_loop_header(&args).map_err(|e| self.error(line, e))?;
                let body = self.parse_body(&["endforeach"], "@foreach", line)?.0;
                Node::Foreach {
                    collection: header.collection,
                    key: header.key,
                    item: header.item,
                    body,
                }
            }
            other => return Err(self.error(line, format!("unsupported directive @{other}"))),
        };
        Ok(Some(node))
    }

    fn section(&mut self, args: Option<String>, line: usize) -> Result<Node> {
        let args = self.require_args("section", args, line)?;
        let parts = split_args(&args);
        let name = self.name_arg("section", &parts[0], line)?;
        if !self.sections.insert(name.clone()) {
            return Err(self.error(line, format!("duplicate @section('{name}')")));
        }

        // Inline form: @section('title', 'Home') or @section('title', $page->title)
        if let Some(value) = parts.get(1) {
            let body = match string_literal(value) {
                Some(literal) => vec![Node::Text(literal)],
                None => vec![self.echo(value, true, Trim::default(), line)?],
            };
            return Ok(Node::Section { name, body });
        }

        let opener = format!("@section('{name}')");
        let (body, closer) = self.parse_body(&["endsection", "stop", "show"], &opener, line)?;
        if closer.name == "show" {
            // Defines the slot and renders it in place
            return Ok(Node::Block { name, body });
        }
        Ok(Node::Section {
            name,
            body: trim_body(body),
        })
    }

    fn conditional(&mut self, args: &str, line: usize) -> Result<Node> {
        let mut branches = Vec::new();
        let mut condition = self.condition(args, line)?;
        let mut otherwise = None;
        let mut opener_line = line;

        loop {
            let (body, closer) =
                self.parse_body(&["elseif", "else", "endif"], "@if", opener_line)?;
            branches.push(Branch { condition, body });
            match closer.name.as_str() {
                "elseif" => {
                    let raw = self.require_args("elseif", closer.args, closer.line)?;
                    condition = self.condition(&raw, closer.line)?;
                    opener_line = closer.line;
                }
                "else" => {
                    otherwise = Some(self.parse_body(&["endif"], "@else", closer.line)?.0);
                    break;
                }
                _ => break,
            }
        }
        Ok(Node::If {
            branches,
            otherwise,
        })
    }

    /// Template or slot name argument: a quoted string or a bare path.
    fn name_arg(&self, directive: &str, raw: &str, line: usize) -> Result<String> {
        if let Some(literal) = string_literal(raw) {
            if literal.contains('"') {
                return Err(self.error(
                    line,
                    format!("@{directive} name must not contain '\"', found '{literal}'"),
                ));
            }
            if !literal.is_empty() {
                return Ok(literal);
            }
        }
        let bare = raw.trim();
        if !bare.is_empty()
            && bare.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'))
        {
            return Ok(bare.to_string());
        }
        Err(self.error(line, format!("@{directive} expects a quoted name, found '{bare}'")))
    }
}

/// Split an argument list on top-level commas.
fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut escaped = false;

    for ch in args.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Contents of a single- or double-quoted literal, with `\'` / `\"` unescaped.
fn string_literal(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let quote = raw.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    if raw.len() < 2 || !raw.ends_with(quote) {
        return None;
    }
    let inner = &raw[1..raw.len() - 1];
    Some(inner.replace(&format!("\\{quote}"), &quote.to_string()))
}
