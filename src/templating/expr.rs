//! Expression normalization.
//!
//! Directive templates use PHP-flavoured expressions (`$user->name`,
//! `!$done && $ready`); Tera expects `user.name` and `not done and ready`.
//! [`normalize`] rewrites the former into the latter with a small scanner
//! that leaves string literals untouched. Expressions are never evaluated
//! here.

use super::ast::Trim;
use super::filters::ESCAPE_FILTER;

/// Filters that already decide how an echo is escaped.
const OUTPUT_FILTERS: &[&str] = &[ESCAPE_FILTER, "escape", "escape_xml", "safe", "raw"];

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Append `word` as a standalone token, inserting spaces where the
/// neighbours would otherwise run into it.
fn push_word(out: &mut String, word: &str, next: Option<char>) {
    if out.chars().next_back().is_some_and(|c| !c.is_whitespace() && c != '(') {
        out.push(' ');
    }
    out.push_str(word);
    if next.is_some_and(|c| !c.is_whitespace() && c != ')') {
        out.push(' ');
    }
}

/// Rewrite a directive expression into Tera syntax.
///
/// | input | output |
/// |---|---|
/// | `$name`, `.name` | `name` |
/// | `$user->name` | `user.name` |
/// | `a && b`, `a \|\| b` | `a and b`, `a or b` |
/// | `!a` | `not a` |
/// | `a === b`, `a !== b` | `a == b`, `a != b` |
///
/// Returns an error message when a string literal is unterminated.
pub fn normalize(expr: &str) -> Result<String, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            '\'' | '"' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != ch {
                    if chars[i] == '\\' {
                        i += 1;
                    }
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(format!("unterminated string literal in '{expr}'"));
                }
                out.extend(&chars[start..=i]);
                i += 1;
            }
            '$' if next.is_some_and(is_ident_start) => i += 1,
            '-' if next == Some('>') => {
                out.push('.');
                i += 2;
            }
            '&' if next == Some('&') => {
                push_word(&mut out, "and", chars.get(i + 2).copied());
                i += 2;
            }
            '|' if next == Some('|') => {
                push_word(&mut out, "or", chars.get(i + 2).copied());
                i += 2;
            }
            '=' if next == Some('=') && chars.get(i + 2) == Some(&'=') => {
                out.push_str("==");
                i += 3;
            }
            '!' if next == Some('=') => {
                out.push_str("!=");
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            '!' => {
                let following = chars[i + 1..].iter().copied().find(|c| !c.is_whitespace());
                push_word(&mut out, "not", following);
                i += 1;
                while chars.get(i).is_some_and(|c| c.is_whitespace()) {
                    i += 1;
                }
            }
            '.' if next.is_some_and(is_ident_start) && starts_operand(&out) => i += 1,
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    Ok(out.trim().to_string())
}

/// Whether the next character begins a new operand (so a leading `.` is a
/// root-relative path rather than member access).
fn starts_operand(out: &str) -> bool {
    match out.trim_end().chars().next_back() {
        None => true,
        Some(c) => !(is_ident_char(c) || c == ')' || c == ']' || c == '\'' || c == '"'),
    }
}

/// Name of the last top-level filter applied in `expr`, if any.
pub fn last_filter(expr: &str) -> Option<&str> {
    let bytes = expr.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0i32;
    let mut last_pipe = None;
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
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                b'|' if depth == 0 => {
                    if bytes.get(i + 1) == Some(&b'|') {
                        i += 1;
                    } else {
                        last_pipe = Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }

    let after = expr[last_pipe? + 1..].trim_start();
    let len = after.chars().take_while(|c| is_ident_char(*c)).count();
    (len > 0).then(|| &after[..len])
}

/// Render an echo as Tera output, adding the escaping filter unless the
/// expression already chose one.
pub fn wrap_echo(expr: &str, escaped: bool, trim: Trim) -> String {
    let open = if trim.left { "{{-" } else { "{{" };
    let close = if trim.right { "-}}" } else { "}}" };
    if last_filter(expr).is_some_and(|f| OUTPUT_FILTERS.contains(&f)) {
        return format!("{open} {expr} {close}");
    }
    let filter = if escaped { ESCAPE_FILTER } else { "safe" };
    format!("{open} {expr} | {filter} {close}")
}

/// Parsed `@foreach` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader {
    pub collection: String,
    pub key: Option<String>,
    pub item: String,
}

/// Parse `$items as $item` or `$map as $key => $value`.
pub fn parse_loop_header(args: &str) -> Result<LoopHeader, String> {
    let split = find_keyword(args, "as")
        .ok_or_else(|| format!("expected '<collection> as <variable>' but found '{args}'"))?;
    let collection = normalize(args[..split].trim())?;
    let binding = args[split + 2..].trim();

    let variable = |raw: &str| -> Result<String, String> {
        let name = raw.trim().trim_start_matches('$');
        if !name.is_empty() && name.starts_with(is_ident_start) && name.chars().all(is_ident_char) {
            Ok(name.to_string())
        } else {
            Err(format!("invalid loop variable '{}'", raw.trim()))
        }
    };

    let (key, item) = match binding.split_once("=>") {
        Some((key, item)) => (Some(variable(key)?), variable(item)?),
        None => (None, variable(binding)?),
    };

    if collection.is_empty() {
        return Err("missing collection in @foreach".to_string());
    }
    Ok(LoopHeader {
        collection,
        key,
        item,
    })
}

/// Byte offset of a standalone keyword outside string literals.
fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else if b == b'\'' || b == b'"' {
            quote = Some(b);
        } else if bytes[i..].starts_with(keyword.as_bytes()) {
            let before = i.checked_sub(1).map(|p| bytes[p]);
            let after = bytes.get(i + keyword.len()).copied();
            let boundary = |c: Option<u8>| c.is_none_or(|c| c.is_ascii_whitespace());
            if boundary(before) && boundary(after) && i > 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Wrap a condition in parentheses unless it is a single operand.
pub fn negate(condition: &str) -> String {
    let simple = condition
        .chars()
        .all(|c| is_ident_char(c) || c == '.' || c == '[' || c == ']' || c == '"' || c == '\'');
    if simple {
        format!("not {condition}")
    } else {
        format!("not ({condition})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(expr: &str) -> String {
        normalize(expr).unwrap()
    }

    #[test]
    fn test_variables_and_members() {
        assert_eq!(n("$name"), "name");
        assert_eq!(n("$user->profile->email"), "user.profile.email");
        assert_eq!(n("$user.Name"), "user.Name");
        assert_eq!(n(".title"), "title");
        assert_eq!(n("$items[0].name"), "items[0].name");
        assert_eq!(n("$price * 2"), "price * 2");
    }

    #[test]
    fn test_logical_operators() {
        assert_eq!(n("$a && $b"), "a and b");
        assert_eq!(n("$a||$b"), "a or b");
        assert_eq!(n("!$done"), "not done");
        assert_eq!(n("$a && !($b || $c)"), "a and not (b or c)");
        assert_eq!(n("! $x"), "not x");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(n("$a === 'x'"), "a == 'x'");
        assert_eq!(n("$a !== $b"), "a != b");
        assert_eq!(n("$a != $b"), "a != b");
        assert_eq!(n("$count >= 3"), "count >= 3");
    }

    #[test]
    fn test_strings_untouched() {
        assert_eq!(n(r#""$not && ->var""#), r#""$not && ->var""#);
        assert_eq!(n(r"'it\'s' ~ $x"), r"'it\'s' ~ x");
        assert!(normalize("'open").is_err());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for expr in ["$a && !$b", "$user->name | upper", ".x || $y === 1"] {
            let once = n(expr);
            assert_eq!(n(&once), once);
        }
    }

    #[test]
    fn test_last_filter() {
        assert_eq!(last_filter("x | escape"), Some("escape"));
        assert_eq!(last_filter("x|upper|safe"), Some("safe"));
        assert_eq!(last_filter("a or b"), None);
        assert_eq!(last_filter("x | default(value='|') "), Some("default"));
        assert_eq!(last_filter("f(a | b)"), None);
        assert_eq!(last_filter("'a|b'"), None);
    }

    #[test]
    fn test_wrap_echo() {
        let plain = Trim::default();
        assert_eq!(wrap_echo("name", true, plain), "{{ name | e }}");
        assert_eq!(wrap_echo("html", false, plain), "{{ html | safe }}");
        assert_eq!(wrap_echo("name | escape", true, plain), "{{ name | escape }}");
        assert_eq!(wrap_echo("name | upper", true, plain), "{{ name | upper | e }}");
        assert_eq!(wrap_echo("html | safe", true, plain), "{{ html | safe }}");
        assert_eq!(
            wrap_echo("name", true, Trim { left: true, right: true }),
            "{{- name | e -}}"
        );
        assert_eq!(wrap_echo("name", true, Trim { left: false, right: true }), "{{ name | e -}}");
    }

    #[test]
    fn test_keyword_named_variables_are_escaped() {
        for name in ["raw", "block.title", "set", "filter", "endif"] {
            assert_eq!(wrap_echo(name, true, Trim::default()), format!("{{{{ {name} | e }}}}"));
        }
    }

    #[test]
    fn test_loop_header() {
        assert_eq!(
            parse_loop_header("$items as $item").unwrap(),
            LoopHeader { collection: "items".into(), key: None, item: "item".into() }
        );
        assert_eq!(
            parse_loop_header("$user->roles as $k => $v").unwrap(),
            LoopHeader { collection: "user.roles".into(), key: Some("k".into()), item: "v".into() }
        );
        assert!(parse_loop_header("$items").is_err());
        assert!(parse_loop_header("$items as 1x").is_err());
        assert_eq!(parse_loop_header("$classes as $c").unwrap().collection, "classes");
    }

    #[test]
    fn test_negate() {
        assert_eq!(negate("user.admin"), "not user.admin");
        assert_eq!(negate("a and b"), "not (a and b)");
    }
}
