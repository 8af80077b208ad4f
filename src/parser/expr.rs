//! Expression grammar: the `Expr` tree and a precedence-ladder parser over
//! source text.
//!
//! The parser accepts everything the DSL's expression subset can contain,
//! plus a few Python shapes (slices, starred arguments, attribute access,
//! dict literals) that parse fine but are rejected later by the evaluator
//! and the translator with a precise message.

use serde::Serialize;

use crate::error::{Result, TranspileError};

use super::utils::{
    find_matching_bracket, find_top_char, find_top_comparisons, find_top_operator, find_top_word,
    is_identifier, split_top_level,
};

/// Expression node kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    NoneLit,
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a and b and c` / `a or b or c` collected into one chain
    BoolChain {
        op: BoolOp,
        values: Vec<Expr>,
    },
    /// `a < b <= c` with the shared operands kept in sequence
    Compare {
        left: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`
    Ternary {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// f"..." split into literal and interpolated pieces
    FString(Vec<Piece>),
    Call {
        func: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    MethodCall {
        owner: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        owner: Box<Expr>,
        attr: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `base[a:b]` — kept only so the translator can reject it precisely
    Slice {
        base: Box<Expr>,
        text: String,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `[elt for target in iter]`, single generator, no filter
    ListComp {
        elt: Box<Expr>,
        target: String,
        iter: Box<Expr>,
    },
    /// `*expr` in argument position
    Starred(Box<Expr>),
}

/// One piece of an f-string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Piece {
    Lit(String),
    Expr(Expr),
    /// A hole using a conversion or format spec; rejected downstream.
    Unsupported(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    pub fn name(s: impl Into<String>) -> Expr {
        Expr::Name(s.into())
    }

    /// True if the tree references any identifier outside the builtin
    /// allow-list. Function names and method-call owners count.
    pub fn has_name_refs(&self) -> bool {
        const SAFE: [&str; 8] = ["len", "abs", "max", "min", "int", "float", "bool", "str"];
        match self {
            Expr::Name(n) => !SAFE.contains(&n.as_str()),
            Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::NoneLit => false,
            Expr::Unary { operand, .. } | Expr::Starred(operand) => operand.has_name_refs(),
            Expr::Binary { left, right, .. } => left.has_name_refs() || right.has_name_refs(),
            Expr::BoolChain { values, .. } => values.iter().any(Expr::has_name_refs),
            Expr::Compare { left, rest } => {
                left.has_name_refs() || rest.iter().any(|(_, e)| e.has_name_refs())
            }
            Expr::Ternary { test, body, orelse } => {
                test.has_name_refs() || body.has_name_refs() || orelse.has_name_refs()
            }
            Expr::FString(pieces) => pieces.iter().any(|p| match p {
                Piece::Expr(e) => e.has_name_refs(),
                _ => false,
            }),
            Expr::Call { func, args, kwargs } => {
                !SAFE.contains(&func.as_str())
                    || args.iter().any(Expr::has_name_refs)
                    || kwargs.iter().any(|(_, e)| e.has_name_refs())
            }
            Expr::MethodCall {
                owner, args, kwargs, ..
            } => {
                owner.has_name_refs()
                    || args.iter().any(Expr::has_name_refs)
                    || kwargs.iter().any(|(_, e)| e.has_name_refs())
            }
            Expr::Attribute { owner, .. } => owner.has_name_refs(),
            Expr::Index { base, index } => base.has_name_refs() || index.has_name_refs(),
            Expr::Slice { base, .. } => base.has_name_refs(),
            Expr::List(items) | Expr::Tuple(items) => items.iter().any(Expr::has_name_refs),
            Expr::Dict(entries) => entries
                .iter()
                .any(|(k, v)| k.has_name_refs() || v.has_name_refs()),
            Expr::ListComp { elt, iter, .. } => elt.has_name_refs() || iter.has_name_refs(),
        }
    }
}

/// Parse an expression from source text.
pub fn parse_expr(src: &str, line: usize) -> Result<Expr> {
    let src = src.trim();
    if src.is_empty() {
        return Err(TranspileError::parse(line, "empty expression"));
    }
    // bare tuple: comma binds loosest
    let parts = split_top_level(src, ',');
    if parts.len() > 1 {
        if parts.last().map(|p| p.trim().is_empty()).unwrap_or(false) {
            // trailing comma: single-element tuple
            let items = parts[..parts.len() - 1]
                .iter()
                .map(|p| parse_expr(p, line))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Expr::Tuple(items));
        }
        let items = parts
            .iter()
            .map(|p| parse_expr(p, line))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expr::Tuple(items));
    }
    parse_ternary(src, line)
}

fn parse_ternary(s: &str, line: usize) -> Result<Expr> {
    let s = s.trim();
    if let Some(if_pos) = find_top_word(s, "if") {
        if if_pos > 0 {
            let rest = &s[if_pos + 2..];
            let else_pos = find_top_word(rest, "else").ok_or_else(|| {
                TranspileError::parse(line, format!("conditional expression missing else: {s}"))
            })?;
            let body = parse_ternary(&s[..if_pos], line)?;
            let test = parse_or(&rest[..else_pos], line)?;
            let orelse = parse_ternary(&rest[else_pos + 4..], line)?;
            return Ok(Expr::Ternary {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
    }
    parse_or(s, line)
}

fn split_top_word_all<'a>(s: &'a str, word: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(pos) = find_top_word(rest, word) {
        parts.push(&rest[..pos]);
        rest = &rest[pos + word.len()..];
    }
    parts.push(rest);
    parts
}

fn parse_or(s: &str, line: usize) -> Result<Expr> {
    let parts = split_top_word_all(s, "or");
    if parts.len() > 1 {
        let values = parts
            .iter()
            .map(|p| parse_and(p, line))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expr::BoolChain {
            op: BoolOp::Or,
            values,
        });
    }
    parse_and(s, line)
}

fn parse_and(s: &str, line: usize) -> Result<Expr> {
    let parts = split_top_word_all(s, "and");
    if parts.len() > 1 {
        let values = parts
            .iter()
            .map(|p| parse_not(p, line))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Expr::BoolChain {
            op: BoolOp::And,
            values,
        });
    }
    parse_not(s, line)
}

fn parse_not(s: &str, line: usize) -> Result<Expr> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("not") {
        if rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            let operand = parse_not(rest, line)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
    }
    parse_comparison(s, line)
}

fn cmp_op_of(token: &str) -> CmpOp {
    match token {
        "==" => CmpOp::Eq,
        "!=" => CmpOp::Ne,
        "<=" => CmpOp::Le,
        ">=" => CmpOp::Ge,
        "<" => CmpOp::Lt,
        _ => CmpOp::Gt,
    }
}

fn parse_comparison(s: &str, line: usize) -> Result<Expr> {
    let found = find_top_comparisons(s);
    if found.is_empty() {
        return parse_bitor(s, line);
    }
    let left = parse_bitor(&s[..found[0].0], line)?;
    let mut rest = Vec::new();
    for (idx, (pos, op)) in found.iter().enumerate() {
        let begin = pos + op.len();
        let end = found.get(idx + 1).map(|(p, _)| *p).unwrap_or(s.len());
        let operand = parse_bitor(&s[begin..end], line)?;
        rest.push((cmp_op_of(op), operand));
    }
    Ok(Expr::Compare {
        left: Box::new(left),
        rest,
    })
}

fn binop_of(token: &str) -> BinOp {
    match token {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "//" => BinOp::FloorDiv,
        "%" => BinOp::Mod,
        "**" => BinOp::Pow,
        "&" => BinOp::BitAnd,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "<<" => BinOp::Shl,
        _ => BinOp::Shr,
    }
}

/// Left-associative binary level: split at the rightmost matching operator.
fn parse_binary_level(
    s: &str,
    line: usize,
    ops: &[&str],
    next: fn(&str, usize) -> Result<Expr>,
) -> Result<Expr> {
    if let Some((pos, op)) = find_top_operator(s, ops, true) {
        let left = parse_binary_level(&s[..pos], line, ops, next)?;
        let right = next(&s[pos + op.len()..], line)?;
        return Ok(Expr::Binary {
            op: binop_of(op),
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    next(s, line)
}

fn parse_bitor(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["|"], parse_bitxor)
}

fn parse_bitxor(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["^"], parse_bitand)
}

fn parse_bitand(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["&"], parse_shift)
}

fn parse_shift(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["<<", ">>"], parse_additive)
}

fn parse_additive(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["+", "-"], parse_multiplicative)
}

fn parse_multiplicative(s: &str, line: usize) -> Result<Expr> {
    parse_binary_level(s, line, &["//", "*", "/", "%"], parse_unary)
}

fn parse_unary(s: &str, line: usize) -> Result<Expr> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix('-') {
        return Ok(Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(parse_unary(rest, line)?),
        });
    }
    if let Some(rest) = s.strip_prefix('+') {
        return Ok(Expr::Unary {
            op: UnaryOp::Pos,
            operand: Box::new(parse_unary(rest, line)?),
        });
    }
    parse_power(s, line)
}

fn parse_power(s: &str, line: usize) -> Result<Expr> {
    // right-associative: split at the leftmost `**`
    if let Some((pos, _)) = find_top_operator(s, &["**"], false) {
        let left = parse_postfix(&s[..pos], line)?;
        let right = parse_unary(&s[pos + 2..], line)?;
        return Ok(Expr::Binary {
            op: BinOp::Pow,
            left: Box::new(left),
            right: Box::new(right),
        });
    }
    parse_postfix(s, line)
}

/// Parse call arguments: positional, keyword, starred.
fn parse_call_args(inner: &str, line: usize) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    let inner = inner.trim();
    if inner.is_empty() {
        return Ok((args, kwargs));
    }
    for part in split_top_level(inner, ',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(starred) = part.strip_prefix('*') {
            args.push(Expr::Starred(Box::new(parse_expr(starred, line)?)));
            continue;
        }
        if let Some(eq) = find_top_char(part, '=') {
            let bytes = part.as_bytes();
            let is_kwarg = eq > 0
                && bytes.get(eq + 1) != Some(&b'=')
                && !matches!(bytes[eq - 1], b'=' | b'!' | b'<' | b'>')
                && is_identifier(part[..eq].trim());
            if is_kwarg {
                let name = part[..eq].trim().to_string();
                let value = parse_expr(&part[eq + 1..], line)?;
                kwargs.push((name, value));
                continue;
            }
        }
        args.push(parse_expr(part, line)?);
    }
    Ok((args, kwargs))
}

fn parse_postfix(s: &str, line: usize) -> Result<Expr> {
    let s = s.trim();
    if s.is_empty() {
        return Err(TranspileError::parse(line, "empty expression"));
    }

    let (mut expr, mut rest) = parse_atom(s, line)?;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(expr);
        }
        if rest.starts_with('(') {
            let close = find_matching_bracket(rest, 0, '(', ')').ok_or_else(|| {
                TranspileError::parse(line, format!("unbalanced parentheses: {s}"))
            })?;
            let (args, kwargs) = parse_call_args(&rest[1..close], line)?;
            expr = match expr {
                Expr::Name(func) => Expr::Call { func, args, kwargs },
                Expr::Attribute { owner, attr } => Expr::MethodCall {
                    owner,
                    method: attr,
                    args,
                    kwargs,
                },
                other => {
                    return Err(TranspileError::unsupported(
                        line,
                        format!("cannot call expression of this form: {other:?}"),
                    ))
                }
            };
            rest = &rest[close + 1..];
            continue;
        }
        if rest.starts_with('[') {
            let close = find_matching_bracket(rest, 0, '[', ']')
                .ok_or_else(|| TranspileError::parse(line, format!("unbalanced brackets: {s}")))?;
            let inner = &rest[1..close];
            expr = if find_top_char(inner, ':').is_some() {
                Expr::Slice {
                    base: Box::new(expr),
                    text: inner.trim().to_string(),
                }
            } else {
                Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(parse_expr(inner, line)?),
                }
            };
            rest = &rest[close + 1..];
            continue;
        }
        if let Some(after_dot) = rest.strip_prefix('.') {
            let end = after_dot
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after_dot.len());
            let attr = &after_dot[..end];
            if attr.is_empty() {
                return Err(TranspileError::parse(line, format!("bad attribute: {s}")));
            }
            expr = Expr::Attribute {
                owner: Box::new(expr),
                attr: attr.to_string(),
            };
            rest = &after_dot[end..];
            continue;
        }
        return Err(TranspileError::parse(
            line,
            format!("unexpected trailing text in expression: {rest}"),
        ));
    }
}

/// Parse one atom and return it with the unconsumed remainder.
fn parse_atom<'a>(s: &'a str, line: usize) -> Result<(Expr, &'a str)> {
    let bytes = s.as_bytes();

    // parenthesized expression or tuple
    if s.starts_with('(') {
        let close = find_matching_bracket(s, 0, '(', ')')
            .ok_or_else(|| TranspileError::parse(line, format!("unbalanced parentheses: {s}")))?;
        let inner = s[1..close].trim();
        if inner.is_empty() {
            return Ok((Expr::Tuple(Vec::new()), &s[close + 1..]));
        }
        return Ok((parse_expr(inner, line)?, &s[close + 1..]));
    }

    // list literal or comprehension
    if s.starts_with('[') {
        let close = find_matching_bracket(s, 0, '[', ']')
            .ok_or_else(|| TranspileError::parse(line, format!("unbalanced brackets: {s}")))?;
        let inner = s[1..close].trim();
        let expr = parse_list_literal(inner, line)?;
        return Ok((expr, &s[close + 1..]));
    }

    // dict literal
    if s.starts_with('{') {
        let close = find_matching_bracket(s, 0, '{', '}')
            .ok_or_else(|| TranspileError::parse(line, format!("unbalanced braces: {s}")))?;
        let inner = s[1..close].trim();
        let mut entries = Vec::new();
        if !inner.is_empty() {
            for part in split_top_level(inner, ',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                let colon = find_top_char(part, ':').ok_or_else(|| {
                    TranspileError::parse(line, format!("invalid dict entry: {part}"))
                })?;
                let key = parse_expr(&part[..colon], line)?;
                let value = parse_expr(&part[colon + 1..], line)?;
                entries.push((key, value));
            }
        }
        return Ok((Expr::Dict(entries), &s[close + 1..]));
    }

    // f-string
    if (s.starts_with("f\"") || s.starts_with("f'") || s.starts_with("F\"") || s.starts_with("F'"))
        && s.len() > 2
    {
        let end = string_literal_end(&s[1..], line).map(|e| e + 1)?;
        let pieces = parse_fstring(&s[2..end - 1], line)?;
        return Ok((Expr::FString(pieces), &s[end..]));
    }

    // plain string literal
    if s.starts_with('"') || s.starts_with('\'') {
        let end = string_literal_end(s, line)?;
        return Ok((Expr::Str(unescape(&s[1..end - 1])), &s[end..]));
    }

    // number literal
    if bytes[0].is_ascii_digit() || (bytes[0] == b'.' && bytes.len() > 1 && bytes[1].is_ascii_digit())
    {
        let end = number_literal_end(bytes);
        let text = &s[..end];
        if let Ok(n) = text.parse::<i64>() {
            return Ok((Expr::Int(n), &s[end..]));
        }
        if let Ok(f) = text.parse::<f64>() {
            return Ok((Expr::Float(f), &s[end..]));
        }
        return Err(TranspileError::parse(
            line,
            format!("invalid number literal: {text}"),
        ));
    }

    // identifier / keyword literal
    if bytes[0].is_ascii_alphabetic() || bytes[0] == b'_' {
        let end = s
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(s.len());
        let word = &s[..end];
        let expr = match word {
            "True" => Expr::Bool(true),
            "False" => Expr::Bool(false),
            "None" => Expr::NoneLit,
            _ => Expr::Name(word.to_string()),
        };
        return Ok((expr, &s[end..]));
    }

    Err(TranspileError::parse(
        line,
        format!("cannot parse expression: {s}"),
    ))
}

fn parse_list_literal(inner: &str, line: usize) -> Result<Expr> {
    if inner.is_empty() {
        return Ok(Expr::List(Vec::new()));
    }
    if let Some(for_pos) = find_top_word(inner, "for") {
        let elt_src = &inner[..for_pos];
        let gen_src = &inner[for_pos + 3..];
        if find_top_word(gen_src, "for").is_some() {
            return Err(TranspileError::unsupported(
                line,
                format!("only single generator comprehensions are supported: [{inner}]"),
            ));
        }
        let in_pos = find_top_word(gen_src, "in").ok_or_else(|| {
            TranspileError::parse(line, format!("comprehension missing 'in': [{inner}]"))
        })?;
        let target = gen_src[..in_pos].trim();
        let mut iter_src = gen_src[in_pos + 2..].trim();
        if let Some(if_pos) = find_top_word(iter_src, "if") {
            let _ = if_pos;
            return Err(TranspileError::unsupported(
                line,
                format!("filtered comprehensions are unsupported: [{inner}]"),
            ));
        }
        if !is_identifier(target) {
            return Err(TranspileError::unsupported(
                line,
                format!("comprehension target must be a simple name: {target}"),
            ));
        }
        iter_src = iter_src.trim();
        let iter = parse_expr(iter_src, line)?;
        let elt = parse_expr(elt_src, line)?;
        return Ok(Expr::ListComp {
            elt: Box::new(elt),
            target: target.to_string(),
            iter: Box::new(iter),
        });
    }
    let items = split_top_level(inner, ',')
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| parse_expr(p, line))
        .collect::<Result<Vec<_>>>()?;
    Ok(Expr::List(items))
}

/// Index just past the closing quote of the string literal starting at 0.
fn string_literal_end(s: &str, line: usize) -> Result<usize> {
    let bytes = s.as_bytes();
    let quote = bytes[0];
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(TranspileError::parse(
        line,
        format!("unterminated string literal: {s}"),
    ))
}

fn number_literal_end(bytes: &[u8]) -> usize {
    let mut i = 0;
    let mut seen_e = false;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_digit() || b == b'.' || b == b'_' {
            i += 1;
        } else if (b == b'e' || b == b'E') && !seen_e && i + 1 < bytes.len() {
            let next = bytes[i + 1];
            if next.is_ascii_digit() || next == b'+' || next == b'-' {
                seen_e = true;
                i += 2;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    i
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split an f-string body into pieces. `{{`/`}}` are literal braces; a hole
/// with a conversion (`!r`) or format spec (`:>8`) is kept but marked
/// unsupported so the evaluator/translator can report it.
fn parse_fstring(body: &str, line: usize) -> Result<Vec<Piece>> {
    let bytes = body.as_bytes();
    let mut pieces = Vec::new();
    let mut lit = String::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                lit.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                lit.push('}');
                i += 2;
            }
            b'{' => {
                let close = find_matching_bracket(body, i, '{', '}').ok_or_else(|| {
                    TranspileError::parse(line, format!("unbalanced f-string hole: {body}"))
                })?;
                if !lit.is_empty() {
                    pieces.push(Piece::Lit(unescape(&std::mem::take(&mut lit))));
                }
                let hole = body[i + 1..close].trim();
                if hole.is_empty() {
                    return Err(TranspileError::parse(line, "empty f-string hole"));
                }
                if find_top_char(hole, ':').is_some()
                    || find_top_operator(hole, &["!"], true).is_some()
                    || hole.ends_with('=')
                {
                    pieces.push(Piece::Unsupported(hole.to_string()));
                } else {
                    pieces.push(Piece::Expr(parse_expr(hole, line)?));
                }
                i = close + 1;
            }
            _ => {
                let ch_len = utf8_len(bytes[i]);
                lit.push_str(&body[i..i + ch_len]);
                i += ch_len;
            }
        }
    }
    if !lit.is_empty() {
        pieces.push(Piece::Lit(unescape(&lit)));
    }
    Ok(pieces)
}

fn utf8_len(b: u8) -> usize {
    if b < 0x80 {
        1
    } else if b >> 5 == 0b110 {
        2
    } else if b >> 4 == 0b1110 {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(src: &str) -> Expr {
        parse_expr(src, 1).unwrap()
    }

    #[test]
    fn test_literals() {
        assert_eq!(p("42"), Expr::Int(42));
        assert_eq!(p("2.5"), Expr::Float(2.5));
        assert_eq!(p("True"), Expr::Bool(true));
        assert_eq!(p("\"hi\""), Expr::Str("hi".to_string()));
        assert_eq!(p("'hi'"), Expr::Str("hi".to_string()));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses with the multiplication nested
        match p("1 + 2 * 3") {
            Expr::Binary { op: BinOp::Add, right, .. } => match *right {
                Expr::Binary { op: BinOp::Mul, .. } => {}
                other => panic!("expected Mul on the right, got {other:?}"),
            },
            other => panic!("expected Add at the top, got {other:?}"),
        }
    }

    #[test]
    fn test_left_associativity() {
        // a - b - c == (a - b) - c
        match p("a - b - c") {
            Expr::Binary { op: BinOp::Sub, left, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinOp::Sub, .. }));
                assert_eq!(*right, Expr::name("c"));
            }
            other => panic!("expected Sub chain, got {other:?}"),
        }
    }

    #[test]
    fn test_chained_comparison() {
        match p("a < b <= c") {
            Expr::Compare { left, rest } => {
                assert_eq!(*left, Expr::name("a"));
                assert_eq!(rest.len(), 2);
                assert_eq!(rest[0].0, CmpOp::Lt);
                assert_eq!(rest[1].0, CmpOp::Le);
            }
            other => panic!("expected comparison chain, got {other:?}"),
        }
    }

    #[test]
    fn test_call_with_kwargs() {
        match p("Servo(9, min_angle=15.0)") {
            Expr::Call { func, args, kwargs } => {
                assert_eq!(func, "Servo");
                assert_eq!(args, vec![Expr::Int(9)]);
                assert_eq!(kwargs, vec![("min_angle".to_string(), Expr::Float(15.0))]);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_method_call() {
        match p("led.set_brightness(128)") {
            Expr::MethodCall { owner, method, args, .. } => {
                assert_eq!(*owner, Expr::name("led"));
                assert_eq!(method, "set_brightness");
                assert_eq!(args, vec![Expr::Int(128)]);
            }
            other => panic!("expected method call, got {other:?}"),
        }
    }

    #[test]
    fn test_list_comprehension() {
        match p("[i * 2 for i in range(5)]") {
            Expr::ListComp { target, iter, .. } => {
                assert_eq!(target, "i");
                assert!(matches!(*iter, Expr::Call { .. }));
            }
            other => panic!("expected comprehension, got {other:?}"),
        }
    }

    #[test]
    fn test_filtered_comprehension_rejected() {
        let err = parse_expr("[i for i in range(5) if i > 2]", 3).unwrap_err();
        assert!(format!("{err}").contains("filtered comprehensions"));
    }

    #[test]
    fn test_slice_is_represented() {
        assert!(matches!(p("xs[1:2]"), Expr::Slice { .. }));
    }

    #[test]
    fn test_fstring_pieces() {
        match p("f\"v={x} end\"") {
            Expr::FString(pieces) => {
                assert_eq!(pieces.len(), 3);
                assert_eq!(pieces[0], Piece::Lit("v=".to_string()));
                assert_eq!(pieces[1], Piece::Expr(Expr::name("x")));
                assert_eq!(pieces[2], Piece::Lit(" end".to_string()));
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn test_fstring_format_spec_marked() {
        match p("f\"{x:>8}\"") {
            Expr::FString(pieces) => assert!(matches!(pieces[0], Piece::Unsupported(_))),
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary_right_associative() {
        match p("a if c1 else b if c2 else d") {
            Expr::Ternary { orelse, .. } => {
                assert!(matches!(*orelse, Expr::Ternary { .. }));
            }
            other => panic!("expected ternary, got {other:?}"),
        }
    }

    #[test]
    fn test_unary_minus_power() {
        // -a ** b parses as -(a ** b)
        match p("-a ** b") {
            Expr::Unary { op: UnaryOp::Neg, operand } => {
                assert!(matches!(*operand, Expr::Binary { op: BinOp::Pow, .. }));
            }
            other => panic!("expected negation of power, got {other:?}"),
        }
    }

    #[test]
    fn test_bool_chain_collects() {
        match p("a and b and c") {
            Expr::BoolChain { op: BoolOp::And, values } => assert_eq!(values.len(), 3),
            other => panic!("expected and-chain, got {other:?}"),
        }
    }
}
