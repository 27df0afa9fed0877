//! A parser for the makefile subset spec section 6 describes.
//!
//! There is no upstream Rust makefile parser in the teacher or example
//! pack to adapt (`alg.py` leans on `pymake`, a Python library with no
//! Rust equivalent here), so this is written from the grammar spec
//! section 6 lays out, in the same "small recursive-descent over
//! preprocessed lines" shape `alg.py`'s own statement dispatch uses.
//! Constructs outside that grammar (recipe bodies, pattern rules,
//! `define` blocks) are either swallowed inertly or rejected with
//! `Error::Parse`, never silently misparsed.

use crate::ast::{AssignOp, BranchCondition, Element, Expansion, Function, Makefile, Statement};
use crate::error::Error;

pub fn parse(text: &str) -> Result<Makefile, Error> {
    let lines = preprocess(text);
    let mut pos = 0;
    let statements = parse_block(&lines, &mut pos, false)?;
    if pos < lines.len() {
        let (lineno, content) = &lines[pos];
        return Err(Error::Parse(*lineno, format!("unexpected `{content}`")));
    }
    Ok(Makefile { statements })
}

/// Join `\`-continued lines, strip comments, and drop blank lines, while
/// keeping each surviving logical line's original line number for
/// diagnostics. Leading tabs are preserved (recipe-line detection relies
/// on them); everything else is left untrimmed until the statement
/// dispatcher trims on demand.
fn preprocess(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let mut line = strip_comment(raw);
        let continued = line.ends_with('\\');
        if continued {
            line.pop();
            line = line.trim_end().to_string();
        }
        pending = Some(match pending.take() {
            Some((start, mut acc)) => {
                acc.push(' ');
                acc.push_str(line.trim());
                (start, acc)
            }
            None => (lineno, line),
        });
        if !continued {
            let (start, content) = pending.take().unwrap();
            if !content.trim().is_empty() {
                out.push((start, content));
            }
        }
    }
    if let Some((start, content)) = pending {
        if !content.trim().is_empty() {
            out.push((start, content));
        }
    }
    out
}

fn strip_comment(line: &str) -> String {
    let bytes = line.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1] != b'\\') {
            return line[..i].to_string();
        }
    }
    line.to_string()
}

fn parse_block(
    lines: &[(usize, String)],
    pos: &mut usize,
    inside_conditional: bool,
) -> Result<Vec<Statement>, Error> {
    let mut out = Vec::new();
    while *pos < lines.len() {
        let (lineno, raw) = &lines[*pos];
        let trimmed = raw.trim();

        if inside_conditional && (trimmed == "endif" || trimmed.starts_with("else")) {
            break;
        }
        if trimmed.is_empty() {
            *pos += 1;
            continue;
        }
        if is_conditional_start(trimmed) {
            out.push(parse_if_chain(lines, pos)?);
            continue;
        }
        if let Some(rest) = strip_keyword(trimmed, "include")
            .or_else(|| strip_keyword(trimmed, "-include"))
            .or_else(|| strip_keyword(trimmed, "sinclude"))
        {
            out.push(Statement::Include {
                path: parse_expansion(rest.trim()),
            });
            *pos += 1;
            continue;
        }
        if let Some((op_pos, op)) = find_assign_op(trimmed) {
            let op_len = if op == AssignOp::Recursive { 1 } else { 2 };
            let name_part = trimmed[..op_pos].trim();
            let value_part = trimmed[op_pos + op_len..].trim();
            out.push(Statement::Assign {
                name: parse_expansion(name_part),
                op,
                value: parse_expansion(value_part),
            });
            *pos += 1;
            continue;
        }
        if let Some(colon) = find_top_level(trimmed, ':') {
            let target = parse_expansion(trimmed[..colon].trim());
            *pos += 1;
            let mut recipe = Vec::new();
            while *pos < lines.len() && lines[*pos].1.starts_with('\t') {
                recipe.push(lines[*pos].1.trim_start_matches('\t').to_string());
                *pos += 1;
            }
            out.push(Statement::Rule { target, recipe });
            continue;
        }
        return Err(Error::Parse(
            *lineno,
            format!("unrecognized statement: {trimmed}"),
        ));
    }
    Ok(out)
}

fn is_conditional_start(trimmed: &str) -> bool {
    ["ifdef", "ifndef", "ifeq", "ifneq"]
        .iter()
        .any(|kw| strip_keyword(trimmed, kw).is_some())
}

fn parse_if_chain(lines: &[(usize, String)], pos: &mut usize) -> Result<Statement, Error> {
    let mut branches = Vec::new();
    let mut else_branch = None;
    loop {
        let (lineno, raw) = lines[*pos].clone();
        let trimmed = raw.trim();
        let cond_text = match trimmed.strip_prefix("else") {
            Some(rest) => rest.trim_start().to_string(),
            None => trimmed.to_string(),
        };
        let cond = parse_condition(lineno, &cond_text)?;
        *pos += 1;
        let body = parse_block(lines, pos, true)?;
        branches.push((cond, body));

        if *pos >= lines.len() {
            return Err(Error::Parse(
                lineno,
                "unterminated conditional (missing endif)".to_string(),
            ));
        }
        let terminator = lines[*pos].1.trim().to_string();
        if terminator == "endif" {
            *pos += 1;
            break;
        }
        if terminator == "else" {
            *pos += 1;
            let body = parse_block(lines, pos, true)?;
            else_branch = Some(body);
            if *pos >= lines.len() || lines[*pos].1.trim() != "endif" {
                return Err(Error::Parse(
                    lineno,
                    "unterminated conditional (missing endif)".to_string(),
                ));
            }
            *pos += 1;
            break;
        }
        if terminator.starts_with("else") {
            continue;
        }
        return Err(Error::Parse(
            lineno,
            format!("expected `else` or `endif`, found `{terminator}`"),
        ));
    }
    Ok(Statement::Conditional {
        branches,
        else_branch,
    })
}

fn parse_condition(lineno: usize, line: &str) -> Result<BranchCondition, Error> {
    if let Some(rest) = strip_keyword(line, "ifndef") {
        return Ok(BranchCondition::Ifdef {
            name: parse_expansion(rest.trim()),
            negate: true,
        });
    }
    if let Some(rest) = strip_keyword(line, "ifdef") {
        return Ok(BranchCondition::Ifdef {
            name: parse_expansion(rest.trim()),
            negate: false,
        });
    }
    if let Some(rest) = strip_keyword(line, "ifneq") {
        let (lhs, rhs) = parse_ifeq_args(lineno, rest.trim())?;
        return Ok(BranchCondition::Ifeq {
            negate: true,
            lhs,
            rhs,
        });
    }
    if let Some(rest) = strip_keyword(line, "ifeq") {
        let (lhs, rhs) = parse_ifeq_args(lineno, rest.trim())?;
        return Ok(BranchCondition::Ifeq {
            negate: false,
            lhs,
            rhs,
        });
    }
    Err(Error::Parse(lineno, format!("malformed conditional: {line}")))
}

fn parse_ifeq_args(lineno: usize, rest: &str) -> Result<(Expansion, Expansion), Error> {
    let rest = rest.trim();
    if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        let parts = split_top_level(inner, ',');
        if parts.len() != 2 {
            return Err(Error::Parse(
                lineno,
                format!("malformed ifeq arguments: {rest}"),
            ));
        }
        return Ok((
            parse_expansion(parts[0].trim()),
            parse_expansion(parts[1].trim()),
        ));
    }
    let (a, b) = parse_two_quoted(rest).ok_or_else(|| {
        Error::Parse(lineno, format!("malformed ifeq arguments: {rest}"))
    })?;
    Ok((parse_expansion(&a), parse_expansion(&b)))
}

fn parse_two_quoted(s: &str) -> Option<(String, String)> {
    let s = s.trim();
    let quote = s.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &s[quote.len_utf8()..];
    let end = rest.find(quote)?;
    let first = rest[..end].to_string();
    let after = rest[end + quote.len_utf8()..].trim_start();
    let quote2 = after.chars().next()?;
    let rest2 = &after[quote2.len_utf8()..];
    let end2 = rest2.find(quote2)?;
    let second = rest2[..end2].to_string();
    Some((first, second))
}

fn strip_keyword<'a>(line: &'a str, kw: &str) -> Option<&'a str> {
    if line == kw {
        return Some("");
    }
    if line.len() > kw.len() && &line[..kw.len()] == kw {
        match line.as_bytes()[kw.len()] {
            b' ' | b'\t' | b'(' => return Some(&line[kw.len()..]),
            _ => {}
        }
    }
    None
}

/// Find the leftmost assignment operator at paren depth 0. Depth
/// tracking is generic over `(`/`{`/`)`/`}`, which is coarser than
/// tracking only `$(...)` groups specifically, but Kbuild fragments
/// essentially never contain a bare, unmatched paren outside a `$()`
/// form.
fn find_assign_op(line: &str) -> Option<(usize, AssignOp)> {
    let bytes = line.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth -= 1,
            b'+' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                return Some((i, AssignOp::Append))
            }
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                return Some((i, AssignOp::Simple))
            }
            b'?' if depth == 0 && bytes.get(i + 1) == Some(&b'=') => {
                return Some((i, AssignOp::Conditional))
            }
            b'=' if depth == 0 => return Some((i, AssignOp::Recursive)),
            _ => {}
        }
        i += 1;
    }
    None
}

fn find_top_level(s: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, c) in s.char_indices() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ if c == target && depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ if c == sep && depth == 0 => {
                out.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

fn top_level_whitespace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, c) in s.char_indices() {
        match c {
            '(' | '{' => depth += 1,
            ')' | '}' => depth -= 1,
            _ if c.is_whitespace() && depth == 0 => return Some(idx),
            _ => {}
        }
    }
    None
}

const FUNCTIONS: &[&str] = &[
    "subst",
    "patsubst",
    "filter",
    "filter-out",
    "if",
    "addprefix",
    "addsuffix",
    "wildcard",
    "sort",
    "strip",
    "word",
    "words",
    "firstword",
    "lastword",
    "dir",
    "notdir",
    "shell",
    "foreach",
    "call",
    "eval",
    "value",
    "origin",
    "findstring",
    "basename",
    "suffix",
    "join",
    "error",
    "warning",
    "info",
];

/// Parse a `$(...)`/`${...}`-free expansion string into a sequence of
/// literal text and references, descending into `$(...)`/`${...}`/`$x`
/// forms wherever they occur.
pub fn parse_expansion(s: &str) -> Expansion {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();
    let mut literal = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c == '$' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '$' {
                literal.push('$');
                i += 2;
                continue;
            }
            if next == '(' || next == '{' {
                let close = if next == '(' { ')' } else { '}' };
                let start = i + 2;
                let mut depth = 1;
                let mut j = start;
                while j < chars.len() && depth > 0 {
                    if chars[j] == next {
                        depth += 1;
                    } else if chars[j] == close {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    j += 1;
                }
                let inner: String = chars[start..j.min(chars.len())].iter().collect();
                if !literal.is_empty() {
                    out.push(Element::Text(std::mem::take(&mut literal)));
                }
                out.push(parse_inner(&inner));
                i = j + 1;
                continue;
            }
            if next.is_alphanumeric() || next == '_' || next == '@' || next == '<' || next == '^' {
                if !literal.is_empty() {
                    out.push(Element::Text(std::mem::take(&mut literal)));
                }
                out.push(Element::VarRef(vec![Element::Text(next.to_string())]));
                i += 2;
                continue;
            }
        }
        literal.push(c);
        i += 1;
    }
    if !literal.is_empty() {
        out.push(Element::Text(literal));
    }
    out
}

/// Render an `Expansion` back to the textual form `parse_expansion` would
/// have produced it from (`alg.py`'s recursive-flavor variables keep their
/// RHS as raw text; this crate instead keeps it as an already-parsed
/// `Expansion`, so a recursive `+=` that inherits a prior recursive
/// definition needs to turn its RHS back into text before concatenating
/// it with the new raw append text, rather than re-deriving source it
/// never had).
pub fn unparse(expansion: &Expansion) -> String {
    expansion.iter().map(unparse_element).collect()
}

fn unparse_element(el: &Element) -> String {
    match el {
        Element::Text(t) => t.clone(),
        Element::VarRef(name) => format!("$({})", unparse(name)),
        Element::Call(f) => {
            let args: Vec<String> = f.args.iter().map(|a| unparse(a)).collect();
            format!("$({} {})", f.name, args.join(","))
        }
    }
}

fn parse_inner(inner: &str) -> Element {
    let trimmed = inner.trim();
    if let Some(space_idx) = top_level_whitespace(trimmed) {
        let name = &trimmed[..space_idx];
        if FUNCTIONS.contains(&name) {
            let rest = trimmed[space_idx..].trim_start();
            let args = split_top_level(rest, ',')
                .into_iter()
                .map(|a| parse_expansion(a.trim()))
                .collect();
            return Element::Call(Function {
                name: name.to_string(),
                args,
            });
        }
    }
    if let Some((name_part, pattern, replacement)) = split_substitution_ref(trimmed) {
        let var = Element::VarRef(parse_expansion(name_part.trim()));
        // `$(var:str1=str2)` with no literal `%` is shorthand for
        // `$(var:%str1=%str2)` (GNU make manual 6.3.1): the match is
        // anchored to the whole word, not just a suffix.
        let pattern = pattern.trim();
        let replacement = replacement.trim();
        let pattern = if pattern.contains('%') {
            pattern.to_string()
        } else {
            format!("%{pattern}")
        };
        let replacement = if replacement.contains('%') {
            replacement.to_string()
        } else {
            format!("%{replacement}")
        };
        return Element::Call(Function {
            name: "patsubst".to_string(),
            args: vec![
                parse_expansion(&pattern),
                parse_expansion(&replacement),
                vec![var],
            ],
        });
    }
    Element::VarRef(parse_expansion(trimmed))
}

/// Recognize `$(var:pattern=replacement)`, spec 4.6's "SubstitutionRef",
/// and desugar it at parse time into the equivalent `patsubst` call
/// (DESIGN.md's open-question decision (a)).
fn split_substitution_ref(s: &str) -> Option<(&str, &str, &str)> {
    let colon = find_top_level(s, ':')?;
    let after = &s[colon + 1..];
    let eq = find_top_level(after, '=')?;
    let name = &s[..colon];
    let pattern = &after[..eq];
    let replacement = &after[eq + 1..];
    Some((name, pattern, replacement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_assignment() {
        let mf = parse("obj-y += foo.o bar.o\n").unwrap();
        assert_eq!(mf.statements.len(), 1);
        match &mf.statements[0] {
            Statement::Assign { name, op, value } => {
                assert_eq!(name, &vec![Element::Text("obj-y".to_string())]);
                assert_eq!(*op, AssignOp::Append);
                assert_eq!(
                    value,
                    &vec![Element::Text("foo.o bar.o".to_string())]
                );
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_ifdef_else_endif() {
        let src = "ifdef CONFIG_FOO\nobj-y += foo.o\nelse\nobj-y += bar.o\nendif\n";
        let mf = parse(src).unwrap();
        assert_eq!(mf.statements.len(), 1);
        match &mf.statements[0] {
            Statement::Conditional {
                branches,
                else_branch,
            } => {
                assert_eq!(branches.len(), 1);
                assert!(else_branch.is_some());
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn parses_ifeq_parenthesized() {
        let src = "ifeq ($(CONFIG_ARCH),arm)\nobj-y += arm.o\nendif\n";
        let mf = parse(src).unwrap();
        match &mf.statements[0] {
            Statement::Conditional { branches, .. } => {
                let (cond, _) = &branches[0];
                match cond {
                    BranchCondition::Ifeq { negate, .. } => assert!(!negate),
                    other => panic!("expected Ifeq, got {other:?}"),
                }
            }
            other => panic!("expected Conditional, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_function_call() {
        let mf = parse("obj-y := $(patsubst %.c,%.o,$(sources))\n").unwrap();
        match &mf.statements[0] {
            Statement::Assign { value, .. } => match &value[0] {
                Element::Call(f) => {
                    assert_eq!(f.name, "patsubst");
                    assert_eq!(f.args.len(), 3);
                }
                other => panic!("expected Call, got {other:?}"),
            },
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn parses_substitution_ref() {
        let mf = parse("obj-y := $(sources:.c=.o)\n").unwrap();
        match &mf.statements[0] {
            Statement::Assign { value, .. } => match &value[0] {
                Element::Call(f) => assert_eq!(f.name, "patsubst"),
                other => panic!("expected desugared Call, got {other:?}"),
            },
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn unparse_round_trips_plain_and_varref_text() {
        let expansion = parse_expansion("gcc $(CFLAGS) -c");
        assert_eq!(unparse(&expansion), "gcc $(CFLAGS) -c");
    }

    #[test]
    fn parses_include_and_rule() {
        let src = "include $(srctree)/Kbuild.common\nfoo: bar\n\trecipe-line\n";
        let mf = parse(src).unwrap();
        assert_eq!(mf.statements.len(), 2);
        assert!(matches!(mf.statements[0], Statement::Include { .. }));
        match &mf.statements[1] {
            Statement::Rule { recipe, .. } => assert_eq!(recipe, &vec!["recipe-line".to_string()]),
            other => panic!("expected Rule, got {other:?}"),
        }
    }

    #[test]
    fn line_continuation_is_joined() {
        let mf = parse("obj-y += foo.o \\\n\tbar.o\n").unwrap();
        match &mf.statements[0] {
            Statement::Assign { value, .. } => {
                assert_eq!(value, &vec![Element::Text("foo.o bar.o".to_string())]);
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }
}
