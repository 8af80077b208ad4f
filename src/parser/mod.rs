//! Statement parser: line-oriented recursive descent over
//! indentation-delimited blocks.
//!
//! A line's block membership is decided purely by indentation (space = 1
//! column, tab = 4); blank lines belong to whatever block surrounds them.
//! Assignments are handled before every other pattern so the symbol table is
//! up to date before later lines fold against it. Unrecognized lines are
//! skipped silently by design — only the recognized constructs can abort.

pub mod ast;
pub mod expr;
pub mod utils;

#[cfg(test)]
mod tests;

use std::collections::HashSet;

use crate::error::{Result, TranspileError};
use crate::semantic::eval::{eval_const, Value};
use crate::semantic::functions::{ensure_function_variant, select_functions};
use crate::semantic::infer::infer_expr_type;
use crate::semantic::scope::{
    Binding, Ctx, FunctionMeta, FunctionSource, ListInfo, Scope, Signature,
};
use crate::semantic::translate::to_cpp_expr;
use crate::semantic::types::{default_value_for_cpp, merge_return_types, TypeLabel};

use ast::{Arg, Branch, FunctionDef, GlobalDecl, Handler, Program, Statement};
use expr::{parse_expr, BinOp, Expr};
use utils::{find_matching_bracket, find_top_char, find_top_operator, find_top_word, is_identifier, split_top_level};

/// One prepared source line: 1-based number, indentation columns, trimmed
/// text with any trailing comment removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub number: usize,
    pub indent: usize,
    pub text: String,
}

impl SourceLine {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Setup,
    Loop,
    Function,
}

const DEVICE_CTORS: [&str; 8] = [
    "Led",
    "RGBLed",
    "Buzzer",
    "Servo",
    "Button",
    "Potentiometer",
    "Ultrasonic",
    "SerialMonitor",
];

/// Parse source text into a [`Program`].
pub fn parse(src: &str) -> Result<Program> {
    let lines = source_lines(src);
    let mut ctx = Ctx::default();
    let mut setup_body: Vec<Statement> = Vec::new();
    let mut loop_body: Vec<Statement> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if line.is_blank() {
            i += 1;
            continue;
        }
        let text = line.text.as_str();

        if let Some(port) = extract_target_call(text) {
            ctx.target_port = Some(port);
            i += 1;
            continue;
        }
        if is_import_line(text) {
            i += 1;
            continue;
        }

        if line.indent == 0 && header_condition(text, "while") == Some("True") {
            let end = collect_block(&lines, i);
            let stmts = parse_simple_lines(&lines[i + 1..end], &mut ctx, ScopeKind::Loop, 1, 1, true)?;
            loop_body.extend(stmts);
            i = end;
            continue;
        }

        if line.indent == 0 {
            if header_condition(text, "while").is_some() {
                let end = collect_block(&lines, i);
                let stmts =
                    parse_simple_lines(&lines[i..end], &mut ctx, ScopeKind::Setup, 0, 0, false)?;
                setup_body.extend(stmts);
                i = end;
                continue;
            }
            if let Some((name, params_src, return_annotation)) = def_header(text) {
                let end = collect_block(&lines, i);
                parse_function_block(
                    &name,
                    &params_src,
                    return_annotation,
                    &lines[i + 1..end],
                    line.number,
                    &mut ctx,
                    None,
                )?;
                i = end;
                continue;
            }
            if text.starts_with("for ") {
                let end = collect_block(&lines, i);
                let stmts =
                    parse_simple_lines(&lines[i..end], &mut ctx, ScopeKind::Setup, 0, 0, false)?;
                setup_body.extend(stmts);
                i = end;
                continue;
            }
        }

        if header_condition(text, "if").is_some() {
            let end = collect_if_structure(&lines, i);
            let stmts = parse_simple_lines(&lines[i..end], &mut ctx, ScopeKind::Setup, 0, 0, false)?;
            setup_body.extend(stmts);
            i = end;
            continue;
        }
        if is_try_line(text) {
            let end = collect_try_structure(&lines, i);
            let stmts = parse_simple_lines(&lines[i..end], &mut ctx, ScopeKind::Setup, 0, 0, false)?;
            setup_body.extend(stmts);
            i = end;
            continue;
        }

        let stmts = parse_simple_lines(
            std::slice::from_ref(line),
            &mut ctx,
            ScopeKind::Setup,
            0,
            0,
            false,
        )?;
        setup_body.extend(stmts);
        i += 1;
    }

    // one poll per distinct button, appended to the repeating phase
    for name in ctx.devices.buttons.clone() {
        loop_body.push(Statement::ButtonPoll { name });
    }

    let functions = select_functions(&ctx);
    Ok(Program {
        setup_body,
        loop_body,
        target_port: ctx.target_port.clone(),
        global_decls: ctx.globals.clone(),
        helpers: ctx.helpers,
        functions,
        ultrasonic_measurements: ctx.ultrasonic_reads.clone(),
    })
}

/// Reparse a stored function under a forced call-site signature. Invoked by
/// overload resolution; see `semantic::functions`.
pub(crate) fn reparse_function(
    name: &str,
    source: &FunctionSource,
    ctx: &mut Ctx,
    forced: Option<&Signature>,
) -> Result<()> {
    let block = source.block.clone();
    parse_function_block(
        name,
        &source.params_src.clone(),
        source.return_annotation.clone(),
        &block,
        source.line,
        ctx,
        forced,
    )
}

// ---------------------------------------------------------------------------
// line preparation and block collection

fn source_lines(src: &str) -> Vec<SourceLine> {
    src.lines()
        .enumerate()
        .map(|(idx, raw)| {
            let mut indent = 0usize;
            for ch in raw.chars() {
                match ch {
                    ' ' => indent += 1,
                    '\t' => indent += 4,
                    _ => break,
                }
            }
            SourceLine {
                number: idx + 1,
                indent,
                text: strip_comment(raw.trim()).trim_end().to_string(),
            }
        })
        .collect()
}

/// Remove a trailing `#` comment, ignoring `#` inside string literals.
fn strip_comment(text: &str) -> &str {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() {
                    match bytes[i] {
                        b'\\' => i += 2,
                        b if b == quote => {
                            i += 1;
                            break;
                        }
                        _ => i += 1,
                    }
                }
            }
            b'#' => return &text[..i],
            _ => i += 1,
        }
    }
    text
}

/// End index (exclusive) of the indented block opened at `start`.
fn collect_block(lines: &[SourceLine], start: usize) -> usize {
    let base = lines[start].indent;
    let mut i = start + 1;
    while i < lines.len() {
        if lines[i].is_blank() {
            i += 1;
            continue;
        }
        if lines[i].indent <= base {
            break;
        }
        i += 1;
    }
    i
}

fn collect_if_structure(lines: &[SourceLine], start: usize) -> usize {
    let base = lines[start].indent;
    let mut i = collect_block(lines, start);
    while i < lines.len() {
        if lines[i].is_blank() {
            i += 1;
            continue;
        }
        if lines[i].indent != base {
            break;
        }
        let text = lines[i].text.as_str();
        if elif_condition(text).is_some() || is_else_line(text) {
            i = collect_block(lines, i);
            continue;
        }
        break;
    }
    i
}

fn collect_try_structure(lines: &[SourceLine], start: usize) -> usize {
    let base = lines[start].indent;
    let mut i = collect_block(lines, start);
    while i < lines.len() {
        if lines[i].is_blank() {
            i += 1;
            continue;
        }
        if lines[i].indent != base {
            break;
        }
        if except_clause(lines[i].text.as_str()).is_some() {
            i = collect_block(lines, i);
            continue;
        }
        break;
    }
    i
}

// ---------------------------------------------------------------------------
// line-shape helpers

fn is_import_line(text: &str) -> bool {
    (text.starts_with("from ") || text.starts_with("import ")) && text.contains("Reduino")
}

/// `<keyword> <condition>:` → the condition text.
fn header_condition<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = text.strip_prefix(keyword)?;
    let rest = rest.strip_prefix(char::is_whitespace)?;
    let colon = rest.rfind(':')?;
    if !rest[colon + 1..].trim().is_empty() {
        return None;
    }
    Some(rest[..colon].trim())
}

fn elif_condition(text: &str) -> Option<&str> {
    header_condition(text, "elif")
}

fn is_else_line(text: &str) -> bool {
    text.strip_prefix("else")
        .map(|rest| rest.trim() == ":")
        .unwrap_or(false)
}

fn is_try_line(text: &str) -> bool {
    text.strip_prefix("try")
        .map(|rest| rest.trim() == ":")
        .unwrap_or(false)
}

/// `except [Type [as name]]:` → (exception type, bound name).
fn except_clause(text: &str) -> Option<(Option<String>, Option<String>)> {
    let rest = text.strip_prefix("except")?;
    let colon = rest.rfind(':')?;
    if !rest[colon + 1..].trim().is_empty() {
        return None;
    }
    let middle = rest[..colon].trim();
    if middle.is_empty() {
        return Some((None, None));
    }
    let (type_part, target) = match find_top_word(middle, "as") {
        Some(pos) => {
            let target = middle[pos + 2..].trim();
            if !is_identifier(target) {
                return None;
            }
            (middle[..pos].trim(), Some(target.to_string()))
        }
        None => (middle, None),
    };
    let valid = !type_part.is_empty()
        && type_part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return None;
    }
    Some((Some(type_part.to_string()), target))
}

/// `def name(params) [-> type]:` → (name, params, return annotation).
fn def_header(text: &str) -> Option<(String, String, Option<TypeLabel>)> {
    let rest = text.strip_prefix("def ")?;
    let paren = rest.find('(')?;
    let name = rest[..paren].trim();
    if !is_identifier(name) {
        return None;
    }
    let close = find_matching_bracket(rest, paren, '(', ')')?;
    let params = rest[paren + 1..close].to_string();
    let tail = rest[close + 1..].trim();
    let return_annotation = if let Some(after_arrow) = tail.strip_prefix("->") {
        let colon = after_arrow.rfind(':')?;
        if !after_arrow[colon + 1..].trim().is_empty() {
            return None;
        }
        Some(TypeLabel::from_annotation(after_arrow[..colon].trim()))
    } else if tail == ":" {
        None
    } else {
        return None;
    };
    Some((name.to_string(), params, return_annotation))
}

/// Capture the argument of the last `target(...)` call in the line, if any.
/// The whole statement is stripped wherever the directive appears.
fn extract_target_call(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut found = None;
    let mut i = 0;
    while i + 6 < bytes.len() + 1 {
        if let Some(pos) = text[i..].find("target") {
            let at = i + pos;
            let prev_ok = at == 0
                || !(bytes[at - 1].is_ascii_alphanumeric() || bytes[at - 1] == b'_' || bytes[at - 1] == b'.');
            let after = text[at + 6..].trim_start();
            if prev_ok && after.starts_with('(') {
                let open = at + 6 + (text[at + 6..].len() - after.len());
                if let Some(close) = find_matching_bracket(text, open, '(', ')') {
                    let inner = text[open + 1..close].trim();
                    let unquoted = inner
                        .strip_prefix(['"', '\''])
                        .and_then(|s| s.strip_suffix(['"', '\'']))
                        .unwrap_or(inner)
                        .trim();
                    let valid = !unquoted.is_empty()
                        && unquoted.chars().all(|c| {
                            c.is_ascii_alphanumeric()
                                || matches!(c, ':' | '_' | '-' | '.' | '/' | '\\' | '~')
                        });
                    if valid {
                        found = Some(unquoted.to_string());
                    }
                    i = close + 1;
                    continue;
                }
            }
            i = at + 6;
        } else {
            break;
        }
    }
    found
}

// ---------------------------------------------------------------------------
// the statement loop

fn parse_simple_lines(
    lines: &[SourceLine],
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    loop_depth: usize,
    main_loop: bool,
) -> Result<Vec<Statement>> {
    let mut body: Vec<Statement> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = &lines[i];
        if line.is_blank() {
            i += 1;
            continue;
        }
        let text = line.text.as_str();
        let ln = line.number;

        if is_import_line(text) || text == "pass" || text == "continue" {
            i += 1;
            continue;
        }

        if text == "break" {
            if loop_depth == 0 {
                return Err(TranspileError::parse(
                    ln,
                    "'break' outside a loop is not supported",
                ));
            }
            if main_loop && loop_depth == 1 {
                return Err(TranspileError::parse(
                    ln,
                    "cannot break out of the main loop()",
                ));
            }
            body.push(Statement::Break);
            i += 1;
            continue;
        }

        if text == "return" || text.starts_with("return ") || text.starts_with("return(") {
            if ctx.current_function.is_none() {
                return Err(TranspileError::parse(
                    ln,
                    "'return' outside of a function is not supported",
                ));
            }
            let rest = text["return".len()..].trim();
            if rest.is_empty() {
                if let Some(meta) = ctx.current_function.as_mut() {
                    meta.has_void = true;
                }
                body.push(Statement::Return { expr: None });
            } else {
                let value = parse_expr(rest, ln)
                    .map_err(|_| TranspileError::parse(ln, "invalid return statement"))?;
                let rendered = to_cpp_expr(&value, ctx, ln)?;
                let return_type = infer_expr_type(&value, ctx, ln)?;
                if let Some(meta) = ctx.current_function.as_mut() {
                    meta.return_types.push(return_type);
                }
                body.push(Statement::Return {
                    expr: Some(rendered),
                });
            }
            i += 1;
            continue;
        }

        if let Some(port) = extract_target_call(text) {
            ctx.target_port = Some(port);
            i += 1;
            continue;
        }

        // assignments first: the environment must be current before any
        // later line folds against it
        if let Some(stmts) = handle_assignment(line, ctx, scope_kind, depth)? {
            body.extend(stmts);
            i += 1;
            continue;
        }

        if let Some(cond_src) = header_condition(text, "if") {
            i = parse_if_construct(
                lines, i, cond_src, ctx, scope_kind, depth, loop_depth, main_loop, &mut body,
            )?;
            continue;
        }

        if is_try_line(text) {
            i = parse_try_construct(lines, i, ctx, scope_kind, depth, loop_depth, main_loop, &mut body)?;
            continue;
        }

        if let Some(cond_src) = header_condition(text, "while") {
            i = parse_while_construct(
                lines, i, cond_src, ctx, scope_kind, depth, loop_depth, main_loop, &mut body,
            )?;
            continue;
        }

        if text.starts_with("for ") {
            i = parse_for_construct(lines, i, ctx, scope_kind, depth, loop_depth, main_loop, &mut body)?;
            continue;
        }

        if let Some(stmts) = try_device_decl(line, ctx)? {
            body.extend(stmts);
            i += 1;
            continue;
        }

        if let Some(stmts) = handle_expression_line(line, ctx)? {
            body.extend(stmts);
        }
        i += 1;
    }

    Ok(body)
}

// ---------------------------------------------------------------------------
// assignments

fn aug_op_of(token: &str) -> Option<BinOp> {
    Some(match token {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "//=" => BinOp::FloorDiv,
        "%=" => BinOp::Mod,
        "**=" => BinOp::Pow,
        "&=" => BinOp::BitAnd,
        "|=" => BinOp::BitOr,
        "^=" => BinOp::BitXor,
        "<<=" => BinOp::Shl,
        ">>=" => BinOp::Shr,
        _ => return None,
    })
}

fn split_assignment(text: &str) -> Option<(String, Option<BinOp>, String)> {
    const ASSIGN_OPS: [&str; 13] = [
        "=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", "^=", "<<=", ">>=",
    ];
    let (pos, op) = find_top_operator(text, &ASSIGN_OPS, false)?;
    let lhs = text[..pos].trim().to_string();
    let rhs = text[pos + op.len()..].trim().to_string();
    if lhs.is_empty() || rhs.is_empty() {
        return None;
    }
    Some((lhs, aug_op_of(op), rhs))
}

fn is_device_ctor_call(expr: &Expr) -> bool {
    matches!(expr, Expr::Call { func, .. } if DEVICE_CTORS.contains(&func.as_str()))
}

fn list_length_from_expr(expr: &Expr, ctx: &Ctx) -> Option<usize> {
    match expr {
        Expr::List(items) => Some(items.len()),
        Expr::Name(name) => ctx.list_info.get(name).and_then(|info| info.length),
        _ => None,
    }
}

fn record_list_state(name: &str, label: &TypeLabel, expr: &Expr, binding: &Binding, ctx: &mut Ctx) {
    if !label.is_list() {
        ctx.list_info.remove(name);
        return;
    }
    ctx.helpers.list = true;
    let length = match binding {
        Binding::Const(Value::List(items)) => Some(items.len()),
        _ => list_length_from_expr(expr, ctx),
    };
    ctx.list_info.insert(
        name.to_string(),
        ListInfo {
            elem: label.element(),
            length,
        },
    );
}

/// Fold the right-hand side if possible, and always render it.
fn eval_or_expr(expr: &Expr, ctx: &mut Ctx, ln: usize) -> Result<(String, Binding, bool)> {
    let (binding, is_const) = match eval_const(expr, &ctx.scope) {
        Ok(value) => (Binding::Const(value), true),
        Err(_) => (Binding::Runtime, false),
    };
    let rendered = to_cpp_expr(expr, ctx, ln)?;
    Ok((rendered, binding, is_const))
}

fn handle_assignment(
    line: &SourceLine,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
) -> Result<Option<Vec<Statement>>> {
    let ln = line.number;
    let (lhs, aug, rhs) = match split_assignment(&line.text) {
        Some(parts) => parts,
        None => return Ok(None),
    };
    // annotated assignments and index assignments are not modelled
    if find_top_char(&lhs, ':').is_some() || lhs.ends_with(']') {
        return Ok(None);
    }

    if let Some(op) = aug {
        if !is_identifier(&lhs) {
            return Ok(None);
        }
        let rhs_expr = match parse_expr(&rhs, ln) {
            Ok(expr) => expr,
            Err(_) => return Ok(None),
        };
        let combined = Expr::Binary {
            op,
            left: Box::new(Expr::Name(lhs.clone())),
            right: Box::new(rhs_expr),
        };
        let rendered = to_cpp_expr(&combined, ctx, ln)?;
        let inferred = infer_expr_type(&combined, ctx, ln)?;
        ctx.scope.types.insert(lhs.clone(), inferred);
        ctx.scope.values.insert(lhs.clone(), Binding::Runtime);
        return Ok(Some(vec![Statement::VarAssign {
            name: lhs,
            expr: rendered,
        }]));
    }

    // tuple targets
    let target_names: Vec<&str> = split_top_level(&lhs, ',').iter().map(|p| p.trim()).collect();
    if target_names.len() > 1 {
        return handle_tuple_assignment(&target_names, &rhs, ctx, scope_kind, depth, ln);
    }

    if !is_identifier(&lhs) {
        return Ok(None);
    }
    let rhs_expr = match parse_expr(&rhs, ln) {
        Ok(expr) => expr,
        Err(_) => return Ok(None),
    };
    if is_device_ctor_call(&rhs_expr) {
        return Ok(None);
    }

    let (rendered, binding, is_const) = eval_or_expr(&rhs_expr, ctx, ln)?;
    let uses_names = rhs_expr.has_name_refs();
    let inferred = infer_expr_type(&rhs_expr, ctx, ln)?;
    let existing = ctx.scope.types.get(&lhs).cloned();
    let is_declared = ctx.scope.is_declared(&lhs);

    if is_declared && existing.as_ref().map(TypeLabel::is_list).unwrap_or(false) {
        if !inferred.is_list() {
            return Err(TranspileError::type_error(
                ln,
                format!("cannot assign a non-list value to list variable '{lhs}'"),
            ));
        }
        let new_length = match &binding {
            Binding::Const(Value::List(items)) => Some(items.len()),
            _ => list_length_from_expr(&rhs_expr, ctx),
        };
        let expected = ctx.list_info.get(&lhs).and_then(|info| info.length);
        if let (Some(expected), Some(new_length)) = (expected, new_length) {
            if expected != new_length {
                return Err(TranspileError::type_error(
                    ln,
                    format!(
                        "list assignment size mismatch for '{lhs}': expected {expected}, got {new_length}"
                    ),
                ));
            }
        }
        let old_elem = existing.as_ref().map(TypeLabel::element);
        let new_elem = inferred.element();
        if let Some(old_elem) = old_elem {
            if old_elem != new_elem {
                return Err(TranspileError::type_error(
                    ln,
                    format!("conflicting list element types for '{lhs}'"),
                ));
            }
        }
    }

    if inferred.is_list() {
        ctx.helpers.list = true;
    }
    ctx.scope.types.insert(lhs.clone(), inferred.clone());
    ctx.scope.values.insert(lhs.clone(), binding.clone());
    record_list_state(&lhs, &inferred, &rhs_expr, &binding, ctx);

    // copy-on-assign: a list assigned from another list variable must be
    // deep-copied, never aliased, whether or not the target is new
    let needs_clone =
        inferred.is_list() && (is_declared || matches!(rhs_expr, Expr::Name(_)));
    let (assign_expr, assign_as_expr_stmt) = if needs_clone {
        ctx.helpers.list = true;
        (format!("__hb_list_assign({lhs}, {rendered})"), true)
    } else {
        (rendered.clone(), false)
    };

    let mut nodes = Vec::new();
    if !is_declared {
        ctx.scope.declare(&lhs);
        let cpp = inferred.cpp();
        let is_global = scope_kind == ScopeKind::Setup && depth == 0;
        let needs_runtime_assign = (is_global && (!is_const || uses_names)) || needs_clone;
        let init_expr = if needs_runtime_assign {
            default_value_for_cpp(&cpp)
        } else {
            rendered.clone()
        };
        if is_global {
            ctx.globals.push(GlobalDecl {
                name: lhs.clone(),
                c_type: cpp,
                expr: init_expr,
            });
            if needs_runtime_assign {
                nodes.push(if assign_as_expr_stmt {
                    Statement::ExprStmt { expr: assign_expr }
                } else {
                    Statement::VarAssign {
                        name: lhs,
                        expr: assign_expr,
                    }
                });
            }
        } else {
            nodes.push(Statement::VarDecl {
                name: lhs.clone(),
                c_type: cpp,
                expr: init_expr,
                global_scope: false,
            });
            if needs_clone {
                nodes.push(Statement::ExprStmt { expr: assign_expr });
            }
        }
    } else {
        nodes.push(if assign_as_expr_stmt {
            Statement::ExprStmt { expr: assign_expr }
        } else {
            Statement::VarAssign {
                name: lhs,
                expr: assign_expr,
            }
        });
    }
    Ok(Some(nodes))
}

fn handle_tuple_assignment(
    targets: &[&str],
    rhs: &str,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    ln: usize,
) -> Result<Option<Vec<Statement>>> {
    if !targets.iter().all(|name| is_identifier(name)) {
        return Ok(None);
    }
    let rhs_expr = match parse_expr(rhs, ln) {
        Ok(expr) => expr,
        Err(_) => return Ok(None),
    };
    let elements = match &rhs_expr {
        Expr::Tuple(items) | Expr::List(items) => items,
        _ => return Ok(None),
    };
    if elements.iter().any(is_device_ctor_call) {
        return Ok(None);
    }
    if elements.len() != targets.len() {
        return Ok(None);
    }

    let mut rendered = Vec::with_capacity(elements.len());
    let mut bindings = Vec::with_capacity(elements.len());
    let mut consts = Vec::with_capacity(elements.len());
    let mut inferred = Vec::with_capacity(elements.len());
    for element in elements {
        let (text, binding, is_const) = eval_or_expr(element, ctx, ln)?;
        rendered.push(text);
        bindings.push(binding);
        consts.push(is_const);
        inferred.push(infer_expr_type(element, ctx, ln)?);
    }

    for (idx, name) in targets.iter().enumerate() {
        ctx.scope
            .types
            .insert((*name).to_string(), inferred[idx].clone());
    }

    let is_global = scope_kind == ScopeKind::Setup && depth == 0;
    let all_new = targets.iter().all(|name| !ctx.scope.is_declared(name));
    let mut nodes = Vec::new();

    if all_new && is_global {
        for (idx, name) in targets.iter().enumerate() {
            ctx.scope.declare(name);
            ctx.scope
                .values
                .insert((*name).to_string(), bindings[idx].clone());
            let cpp = inferred[idx].cpp();
            let uses_names = elements[idx].has_name_refs();
            let needs_runtime_assign = !consts[idx] || uses_names;
            let init_expr = if needs_runtime_assign {
                default_value_for_cpp(&cpp)
            } else {
                rendered[idx].clone()
            };
            ctx.globals.push(GlobalDecl {
                name: (*name).to_string(),
                c_type: cpp,
                expr: init_expr,
            });
            if needs_runtime_assign {
                nodes.push(Statement::VarAssign {
                    name: (*name).to_string(),
                    expr: rendered[idx].clone(),
                });
            }
        }
        return Ok(Some(nodes));
    }

    // read all right-hand sides through temporaries before writing any
    // target, so simultaneous swaps stay sound
    let mut tmp_names = Vec::with_capacity(elements.len());
    for (idx, _) in elements.iter().enumerate() {
        let tmp = ctx.next_tmp();
        nodes.push(Statement::VarDecl {
            name: tmp.clone(),
            c_type: inferred[idx].cpp(),
            expr: rendered[idx].clone(),
            global_scope: false,
        });
        tmp_names.push(tmp);
    }
    for (idx, name) in targets.iter().enumerate() {
        ctx.scope
            .values
            .insert((*name).to_string(), bindings[idx].clone());
        if !ctx.scope.is_declared(name) {
            ctx.scope.declare(name);
            nodes.push(Statement::VarDecl {
                name: (*name).to_string(),
                c_type: inferred[idx].cpp(),
                expr: tmp_names[idx].clone(),
                global_scope: false,
            });
        } else {
            nodes.push(Statement::VarAssign {
                name: (*name).to_string(),
                expr: tmp_names[idx].clone(),
            });
        }
    }
    Ok(Some(nodes))
}

// ---------------------------------------------------------------------------
// declaration promotion

fn promote_branch_decls(branch_scopes: &[Scope], ctx: &mut Ctx) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for scope in branch_scopes {
        for name in scope.fresh_names() {
            if ctx.scope.is_declared(&name) {
                continue;
            }
            if !order.contains(&name) {
                let label = scope.type_of(&name);
                ctx.scope.types.insert(name.clone(), label.clone());
                ctx.promotion_cpp_types.insert(name.clone(), label.cpp());
                order.push(name);
            }
        }
    }
    order
}

fn make_promotion_decls(
    promoted: &[String],
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
) -> Vec<Statement> {
    let mut decls = Vec::new();
    for name in promoted {
        let cpp = ctx
            .promotion_cpp_types
            .get(name)
            .cloned()
            .unwrap_or_else(|| ctx.scope.type_of(name).cpp());
        let global = scope_kind == ScopeKind::Setup && depth == 0;
        if global {
            ctx.push_global_unique_name(GlobalDecl {
                name: name.clone(),
                c_type: cpp.clone(),
                expr: default_value_for_cpp(&cpp),
            });
        } else {
            decls.push(Statement::VarDecl {
                name: name.clone(),
                c_type: cpp.clone(),
                expr: default_value_for_cpp(&cpp),
                global_scope: false,
            });
        }
        ctx.scope.declare(name);
        ctx.scope.values.insert(name.clone(), Binding::Runtime);
        ctx.scope
            .types
            .entry(name.clone())
            .or_insert(TypeLabel::Int);
    }
    decls
}

/// Rewrite first declarations of promoted names into plain assignments, all
/// the way down through nested control constructs.
fn rewrite_promoted(nodes: Vec<Statement>, promoted: &HashSet<String>) -> Vec<Statement> {
    nodes
        .into_iter()
        .map(|node| match node {
            Statement::VarDecl {
                name,
                expr,
                global_scope: false,
                ..
            } if promoted.contains(&name) => Statement::VarAssign { name, expr },
            Statement::If { branches, else_body } => Statement::If {
                branches: branches
                    .into_iter()
                    .map(|b| Branch {
                        condition: b.condition,
                        body: rewrite_promoted(b.body, promoted),
                    })
                    .collect(),
                else_body: rewrite_promoted(else_body, promoted),
            },
            Statement::While { condition, body } => Statement::While {
                condition,
                body: rewrite_promoted(body, promoted),
            },
            Statement::ForRange { var, count, body } => Statement::ForRange {
                var,
                count,
                body: rewrite_promoted(body, promoted),
            },
            Statement::Try { body, handlers } => Statement::Try {
                body: rewrite_promoted(body, promoted),
                handlers: handlers
                    .into_iter()
                    .map(|h| Handler {
                        exception: h.exception,
                        target: h.target,
                        body: rewrite_promoted(h.body, promoted),
                    })
                    .collect(),
            },
            other => other,
        })
        .collect()
}

/// Textual-order collection of promoted declarations inside a loop body,
/// searching nested branches and loops.
fn collect_decl_order(nodes: &[Statement], promoted: &HashSet<String>, out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Statement::VarDecl { name, .. } if promoted.contains(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Statement::If { branches, else_body } => {
                for branch in branches {
                    collect_decl_order(&branch.body, promoted, out);
                }
                collect_decl_order(else_body, promoted, out);
            }
            Statement::While { body, .. } | Statement::ForRange { body, .. } => {
                collect_decl_order(body, promoted, out);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// control-flow constructs

#[allow(clippy::too_many_arguments)]
fn parse_if_construct(
    lines: &[SourceLine],
    start: usize,
    cond_src: &str,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    loop_depth: usize,
    main_loop: bool,
    out: &mut Vec<Statement>,
) -> Result<usize> {
    let base_indent = lines[start].indent;
    let ln = lines[start].number;
    let cond_expr = parse_expr(cond_src, ln)?;
    let condition = to_cpp_expr(&cond_expr, ctx, ln)?;

    let base_scope = ctx.scope.clone();
    let mut branch_scopes: Vec<Scope> = Vec::new();
    let mut branches: Vec<Branch> = Vec::new();
    let mut else_body: Vec<Statement> = Vec::new();

    let block_end = collect_block(lines, start);
    ctx.scope = base_scope.branch_snapshot();
    let first_body = parse_simple_lines(
        &lines[start + 1..block_end],
        ctx,
        scope_kind,
        depth + 1,
        loop_depth,
        main_loop,
    )?;
    branch_scopes.push(std::mem::replace(&mut ctx.scope, base_scope.clone()));
    branches.push(Branch {
        condition,
        body: first_body,
    });

    let mut j = block_end;
    while j < lines.len() {
        if lines[j].is_blank() {
            j += 1;
            continue;
        }
        if lines[j].indent != base_indent {
            break;
        }
        let probe = lines[j].text.as_str();
        if let Some(elif_src) = elif_condition(probe) {
            let elif_ln = lines[j].number;
            let elif_expr = parse_expr(elif_src, elif_ln)?;
            let elif_cond = to_cpp_expr(&elif_expr, ctx, elif_ln)?;
            let end = collect_block(lines, j);
            ctx.scope = base_scope.branch_snapshot();
            let branch_body = parse_simple_lines(
                &lines[j + 1..end],
                ctx,
                scope_kind,
                depth + 1,
                loop_depth,
                main_loop,
            )?;
            branch_scopes.push(std::mem::replace(&mut ctx.scope, base_scope.clone()));
            branches.push(Branch {
                condition: elif_cond,
                body: branch_body,
            });
            j = end;
            continue;
        }
        if is_else_line(probe) {
            let end = collect_block(lines, j);
            ctx.scope = base_scope.branch_snapshot();
            else_body = parse_simple_lines(
                &lines[j + 1..end],
                ctx,
                scope_kind,
                depth + 1,
                loop_depth,
                main_loop,
            )?;
            branch_scopes.push(std::mem::replace(&mut ctx.scope, base_scope.clone()));
            j = end;
            break;
        }
        break;
    }

    let promoted = promote_branch_decls(&branch_scopes, ctx);
    if !promoted.is_empty() {
        let promoted_set: HashSet<String> = promoted.iter().cloned().collect();
        for branch in &mut branches {
            branch.body = rewrite_promoted(std::mem::take(&mut branch.body), &promoted_set);
        }
        else_body = rewrite_promoted(else_body, &promoted_set);
        out.extend(make_promotion_decls(&promoted, ctx, scope_kind, depth));
    }
    out.push(Statement::If {
        branches,
        else_body,
    });
    Ok(j)
}

#[allow(clippy::too_many_arguments)]
fn parse_try_construct(
    lines: &[SourceLine],
    start: usize,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    loop_depth: usize,
    main_loop: bool,
    out: &mut Vec<Statement>,
) -> Result<usize> {
    let base_indent = lines[start].indent;
    let base_scope = ctx.scope.clone();
    let mut branch_scopes: Vec<Scope> = Vec::new();

    let block_end = collect_block(lines, start);
    ctx.scope = base_scope.branch_snapshot();
    let mut try_body = parse_simple_lines(
        &lines[start + 1..block_end],
        ctx,
        scope_kind,
        depth + 1,
        loop_depth,
        main_loop,
    )?;
    branch_scopes.push(std::mem::replace(&mut ctx.scope, base_scope.clone()));

    let mut handlers: Vec<Handler> = Vec::new();
    let mut j = block_end;
    while j < lines.len() {
        if lines[j].is_blank() {
            j += 1;
            continue;
        }
        if lines[j].indent != base_indent {
            break;
        }
        if let Some((exception, target)) = except_clause(lines[j].text.as_str()) {
            let end = collect_block(lines, j);
            ctx.scope = base_scope.branch_snapshot();
            let handler_body = parse_simple_lines(
                &lines[j + 1..end],
                ctx,
                scope_kind,
                depth + 1,
                loop_depth,
                main_loop,
            )?;
            branch_scopes.push(std::mem::replace(&mut ctx.scope, base_scope.clone()));
            handlers.push(Handler {
                exception,
                target,
                body: handler_body,
            });
            j = end;
            continue;
        }
        break;
    }

    let promoted = promote_branch_decls(&branch_scopes, ctx);
    if !promoted.is_empty() {
        let promoted_set: HashSet<String> = promoted.iter().cloned().collect();
        try_body = rewrite_promoted(try_body, &promoted_set);
        for handler in &mut handlers {
            handler.body = rewrite_promoted(std::mem::take(&mut handler.body), &promoted_set);
        }
        out.extend(make_promotion_decls(&promoted, ctx, scope_kind, depth));
    }
    out.push(Statement::Try {
        body: try_body,
        handlers,
    });
    Ok(j)
}

#[allow(clippy::too_many_arguments)]
fn parse_while_construct(
    lines: &[SourceLine],
    start: usize,
    cond_src: &str,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    loop_depth: usize,
    main_loop: bool,
    out: &mut Vec<Statement>,
) -> Result<usize> {
    let ln = lines[start].number;
    let cond_expr = parse_expr(cond_src, ln)?;
    let condition = to_cpp_expr(&cond_expr, ctx, ln)?;

    let end = collect_block(lines, start);
    let snapshot = ctx.scope.branch_snapshot();
    let saved = std::mem::replace(&mut ctx.scope, snapshot);
    let body = parse_simple_lines(
        &lines[start + 1..end],
        ctx,
        scope_kind,
        depth + 1,
        loop_depth + 1,
        main_loop,
    );
    let child = std::mem::replace(&mut ctx.scope, saved);
    let body = body?;

    let body = promote_loop_decls(body, &child, ctx, scope_kind, depth, out);
    out.push(Statement::While { condition, body });
    Ok(end)
}

#[allow(clippy::too_many_arguments)]
fn parse_for_construct(
    lines: &[SourceLine],
    start: usize,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    loop_depth: usize,
    main_loop: bool,
    out: &mut Vec<Statement>,
) -> Result<usize> {
    let ln = lines[start].number;
    let text = lines[start].text.as_str();
    let (var, count) = for_range_header(text)
        .ok_or_else(|| TranspileError::parse(ln, format!("for loops must take the form 'for NAME in range(<literal int>):' — got: {text}")))?;

    let end = collect_block(lines, start);
    let mut snapshot = ctx.scope.branch_snapshot();
    snapshot.declared.insert(var.clone());
    snapshot.base_declared.insert(var.clone());
    snapshot.values.insert(var.clone(), Binding::Runtime);
    snapshot.types.insert(var.clone(), TypeLabel::Int);
    let saved = std::mem::replace(&mut ctx.scope, snapshot);
    let body = parse_simple_lines(
        &lines[start + 1..end],
        ctx,
        scope_kind,
        depth + 1,
        loop_depth + 1,
        main_loop,
    );
    let child = std::mem::replace(&mut ctx.scope, saved);
    let body = body?;

    let body = promote_loop_decls(body, &child, ctx, scope_kind, depth, out);
    out.push(Statement::ForRange { var, count, body });
    Ok(end)
}

/// `for NAME in range(N):` with a literal integer bound.
fn for_range_header(text: &str) -> Option<(String, i64)> {
    let rest = text.strip_prefix("for ")?;
    let colon = rest.rfind(':')?;
    if !rest[colon + 1..].trim().is_empty() {
        return None;
    }
    let head = rest[..colon].trim();
    let in_pos = find_top_word(head, "in")?;
    let var = head[..in_pos].trim();
    if !is_identifier(var) {
        return None;
    }
    let iter_src = head[in_pos + 2..].trim();
    let inner = iter_src
        .strip_prefix("range")
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))?;
    let count = inner.trim().parse::<i64>().ok()?;
    Some((var.to_string(), count))
}

/// Shared loop-promotion path: hoist names declared anywhere in the loop
/// body (searching nested constructs in textual order) to the enclosing
/// scope, and rewrite the declarations into assignments.
fn promote_loop_decls(
    body: Vec<Statement>,
    child: &Scope,
    ctx: &mut Ctx,
    scope_kind: ScopeKind,
    depth: usize,
    out: &mut Vec<Statement>,
) -> Vec<Statement> {
    let fresh = child.fresh_names();
    if fresh.is_empty() {
        return body;
    }
    let promoted_set: HashSet<String> = fresh.iter().cloned().collect();
    let mut order: Vec<String> = Vec::new();
    collect_decl_order(&body, &promoted_set, &mut order);
    for name in &fresh {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }
    for name in &order {
        let label = child.type_of(name);
        ctx.scope.types.insert(name.clone(), label.clone());
        ctx.promotion_cpp_types.insert(name.clone(), label.cpp());
    }
    out.extend(make_promotion_decls(&order, ctx, scope_kind, depth));
    rewrite_promoted(body, &promoted_set)
}

// ---------------------------------------------------------------------------
// function definitions

#[allow(clippy::too_many_arguments)]
pub(crate) fn parse_function_block(
    name: &str,
    params_src: &str,
    return_annotation: Option<TypeLabel>,
    block: &[SourceLine],
    def_line: usize,
    ctx: &mut Ctx,
    forced: Option<&Signature>,
) -> Result<()> {
    let mut param_names: Vec<String> = Vec::new();
    let mut annotations: Vec<Option<TypeLabel>> = Vec::new();
    if !params_src.trim().is_empty() {
        for part in split_top_level(params_src, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part.starts_with('*') {
                return Err(TranspileError::parse(
                    def_line,
                    "*args/**kwargs are not supported in function definitions",
                ));
            }
            if find_top_char(part, '=').is_some() {
                return Err(TranspileError::parse(
                    def_line,
                    "default argument values are not supported",
                ));
            }
            let (pname, annotation) = match find_top_char(part, ':') {
                Some(colon) => (
                    part[..colon].trim(),
                    Some(TypeLabel::from_annotation(&part[colon + 1..])),
                ),
                None => (part, None),
            };
            if !is_identifier(pname) {
                return Err(TranspileError::parse(
                    def_line,
                    format!("invalid parameter name: {pname}"),
                ));
            }
            param_names.push(pname.to_string());
            annotations.push(annotation);
        }
    }

    if let Some(forced) = forced {
        if forced.len() != param_names.len() {
            return Err(TranspileError::type_error(
                def_line,
                "call signature arity does not match the function definition",
            ));
        }
    }

    ctx.functions.sources.insert(
        name.to_string(),
        FunctionSource {
            params_src: params_src.to_string(),
            return_annotation: return_annotation.clone(),
            block: block.to_vec(),
            line: def_line,
        },
    );
    if !ctx.functions.order.iter().any(|n| n == name) {
        ctx.functions.order.push(name.to_string());
    }
    ctx.functions.returns.entry(name.to_string()).or_default();
    ctx.functions.aliases.entry(name.to_string()).or_default();
    ctx.functions.defs.entry(name.to_string()).or_default();

    let snapshot = ctx.scope.branch_snapshot();
    let saved_scope = std::mem::replace(&mut ctx.scope, snapshot);
    let saved_meta = std::mem::replace(&mut ctx.current_function, Some(FunctionMeta::default()));

    for (idx, pname) in param_names.iter().enumerate() {
        let label = if let Some(forced) = forced {
            forced[idx].clone()
        } else if let Some(annotation) = &annotations[idx] {
            annotation.clone()
        } else {
            ctx.functions
                .param_types
                .get(name)
                .and_then(|per_idx| per_idx.get(&idx))
                .cloned()
                .unwrap_or(TypeLabel::Int)
        };
        ctx.scope.types.insert(pname.clone(), label);
        ctx.scope.declare(pname);
        ctx.scope.values.insert(pname.clone(), Binding::Runtime);
    }

    let body_result = parse_simple_lines(block, ctx, ScopeKind::Function, 1, 0, false);
    let meta = std::mem::replace(&mut ctx.current_function, saved_meta)
        .expect("function meta installed above");
    let child_scope = std::mem::replace(&mut ctx.scope, saved_scope);
    let body = body_result?;

    let mut merged = merge_return_types(&meta.return_types, meta.has_void)
        .map_err(|msg| TranspileError::type_error(def_line, msg))?;
    if let Some(annotated) = &return_annotation {
        if merged == TypeLabel::Void && *annotated != TypeLabel::Void {
            merged = annotated.clone();
        } else if *annotated != merged && !meta.return_types.is_empty() {
            merged = annotated.clone();
        }
    }

    let mut final_signature: Signature = Vec::with_capacity(param_names.len());
    let mut params_out: Vec<(String, String)> = Vec::with_capacity(param_names.len());
    {
        let type_entry = ctx.functions.param_types.entry(name.to_string()).or_default();
        for (idx, pname) in param_names.iter().enumerate() {
            let label = child_scope
                .types
                .get(pname)
                .cloned()
                .unwrap_or_else(|| type_entry.get(&idx).cloned().unwrap_or(TypeLabel::Int));
            type_entry.insert(idx, label.clone());
            params_out.push((pname.clone(), label.cpp()));
            final_signature.push(label);
        }
    }
    ctx.functions
        .param_orders
        .insert(name.to_string(), param_names.clone());

    let requested: Signature = forced.cloned().unwrap_or_else(|| final_signature.clone());
    {
        let returns = ctx.functions.returns.get_mut(name).expect("entry above");
        returns.insert(final_signature.clone(), merged.clone());
        if requested != final_signature {
            returns.insert(requested.clone(), merged.clone());
        }
    }
    if requested != final_signature {
        ctx.functions
            .aliases
            .get_mut(name)
            .expect("entry above")
            .insert(requested, final_signature.clone());
    }

    let def = FunctionDef {
        name: name.to_string(),
        params: params_out,
        body,
        return_type: merged.cpp(),
    };
    {
        let defs = ctx.functions.defs.get_mut(name).expect("entry above");
        if let Some(slot) = defs.iter_mut().find(|(sig, _)| *sig == final_signature) {
            slot.1 = def;
        } else {
            defs.push((final_signature.clone(), def));
        }
    }

    if forced.is_none() {
        ctx.functions
            .primary
            .insert(name.to_string(), final_signature.clone());
        let pending = ctx
            .functions
            .call_signatures
            .get(name)
            .cloned()
            .unwrap_or_default();
        for requested_sig in pending {
            if requested_sig != final_signature {
                ensure_function_variant(name, &requested_sig, ctx, def_line)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// device declarations

fn call_arg<'a>(
    args: &'a [Expr],
    kwargs: &'a [(String, Expr)],
    position: usize,
    keyword: &str,
) -> Option<&'a Expr> {
    kwargs
        .iter()
        .find(|(name, _)| name == keyword)
        .map(|(_, value)| value)
        .or_else(|| args.get(position))
}

/// Resolve a numeric configuration argument: a folded literal when the
/// expression is name-free and constant, otherwise a runtime expression.
fn resolve_int_arg(opt: Option<&Expr>, default: i64, ctx: &mut Ctx, ln: usize) -> Result<Arg> {
    let expr = match opt {
        Some(expr) => expr,
        None => return Ok(Arg::Int(default)),
    };
    if !expr.has_name_refs() {
        if let Ok(value) = eval_const(expr, &ctx.scope) {
            if let Ok(n) = value.as_i64() {
                return Ok(Arg::Int(n));
            }
        }
    }
    Ok(Arg::Expr(to_cpp_expr(expr, ctx, ln)?))
}

/// Like [`resolve_int_arg`] but preserves fractional literals.
fn resolve_float_arg(opt: Option<&Expr>, default: f64, ctx: &mut Ctx, ln: usize) -> Result<Arg> {
    let expr = match opt {
        Some(expr) => expr,
        None => return Ok(Arg::Float(default)),
    };
    if !expr.has_name_refs() {
        if let Ok(value) = eval_const(expr, &ctx.scope) {
            match value {
                Value::Int(n) => return Ok(Arg::Int(n)),
                Value::Float(f) => return Ok(Arg::Float(f)),
                Value::Bool(b) => return Ok(Arg::Int(i64::from(b))),
                _ => {}
            }
        }
    }
    Ok(Arg::Expr(to_cpp_expr(expr, ctx, ln)?))
}

fn arg_as_f64(arg: &Arg) -> Option<f64> {
    match arg {
        Arg::Int(n) => Some(*n as f64),
        Arg::Float(f) => Some(*f),
        Arg::Expr(_) => None,
    }
}

fn try_device_decl(line: &SourceLine, ctx: &mut Ctx) -> Result<Option<Vec<Statement>>> {
    let ln = line.number;
    let (lhs, aug, rhs) = match split_assignment(&line.text) {
        Some(parts) => parts,
        None => return Ok(None),
    };
    if aug.is_some() || !is_identifier(&lhs) {
        return Ok(None);
    }
    let (func, args, kwargs) = match parse_expr(&rhs, ln) {
        Ok(Expr::Call { func, args, kwargs }) if DEVICE_CTORS.contains(&func.as_str()) => {
            (func, args, kwargs)
        }
        _ => return Ok(None),
    };
    let name = lhs;

    let stmt = match func.as_str() {
        "Led" => {
            let pin = resolve_int_arg(call_arg(&args, &kwargs, 0, "pin"), 13, ctx, ln)?;
            ctx.devices.leds.insert(name.clone());
            Statement::LedDecl { name, pin }
        }
        "SerialMonitor" => {
            let baud = resolve_int_arg(call_arg(&args, &kwargs, 0, "baud_rate"), 9600, ctx, ln)?;
            ctx.devices.serial_monitors.insert(name.clone());
            ctx.scope.values.insert(name.clone(), Binding::Runtime);
            Statement::SerialMonitorDecl { name, baud }
        }
        "RGBLed" => {
            let red = call_arg(&args, &kwargs, 0, "red_pin");
            let green = call_arg(&args, &kwargs, 1, "green_pin");
            let blue = call_arg(&args, &kwargs, 2, "blue_pin");
            if red.is_none() || green.is_none() || blue.is_none() {
                return Err(TranspileError::parse(
                    ln,
                    "RGBLed requires red_pin, green_pin and blue_pin",
                ));
            }
            let red_pin = resolve_int_arg(red, 0, ctx, ln)?;
            let green_pin = resolve_int_arg(green, 0, ctx, ln)?;
            let blue_pin = resolve_int_arg(blue, 0, ctx, ln)?;
            ctx.devices.rgb_leds.insert(name.clone());
            Statement::RgbLedDecl {
                name,
                red_pin,
                green_pin,
                blue_pin,
            }
        }
        "Buzzer" => {
            let pin = resolve_int_arg(call_arg(&args, &kwargs, 0, "pin"), 8, ctx, ln)?;
            let default_frequency = resolve_float_arg(
                call_arg(&args, &kwargs, 1, "default_frequency"),
                440.0,
                ctx,
                ln,
            )?;
            ctx.devices.buzzers.insert(name.clone());
            Statement::BuzzerDecl {
                name,
                pin,
                default_frequency,
            }
        }
        "Servo" => {
            let pin = resolve_int_arg(call_arg(&args, &kwargs, 0, "pin"), 9, ctx, ln)?;
            let min_angle =
                resolve_float_arg(call_arg(&args, &kwargs, 1, "min_angle"), 0.0, ctx, ln)?;
            let max_angle =
                resolve_float_arg(call_arg(&args, &kwargs, 2, "max_angle"), 180.0, ctx, ln)?;
            let min_pulse_us =
                resolve_float_arg(call_arg(&args, &kwargs, 3, "min_pulse_us"), 544.0, ctx, ln)?;
            let max_pulse_us =
                resolve_float_arg(call_arg(&args, &kwargs, 4, "max_pulse_us"), 2400.0, ctx, ln)?;
            if let (Some(lo), Some(hi)) = (arg_as_f64(&min_angle), arg_as_f64(&max_angle)) {
                if lo >= hi {
                    return Err(TranspileError::parse(
                        ln,
                        "min_angle must be smaller than max_angle",
                    ));
                }
            }
            if let (Some(lo), Some(hi)) = (arg_as_f64(&min_pulse_us), arg_as_f64(&max_pulse_us)) {
                if lo >= hi {
                    return Err(TranspileError::parse(
                        ln,
                        "min_pulse_us must be smaller than max_pulse_us",
                    ));
                }
            }
            ctx.devices.servos.insert(name.clone());
            Statement::ServoDecl {
                name,
                pin,
                min_angle,
                max_angle,
                min_pulse_us,
                max_pulse_us,
            }
        }
        "Button" => {
            let pin_expr = call_arg(&args, &kwargs, 0, "pin").ok_or_else(|| {
                TranspileError::parse(ln, "Button requires a pin")
            })?;
            let pin = resolve_int_arg(Some(pin_expr), 2, ctx, ln)?;
            let on_click = match kwargs.iter().find(|(key, _)| key == "on_click") {
                Some((_, Expr::Name(callback))) => Some(callback.clone()),
                Some(_) => {
                    return Err(TranspileError::parse(
                        ln,
                        "on_click must be the name of a function",
                    ))
                }
                None => None,
            };
            let mode = match kwargs.iter().find(|(key, _)| key == "mode") {
                Some((_, Expr::Str(mode))) => mode.clone(),
                Some(_) => {
                    return Err(TranspileError::parse(ln, "mode must be a string literal"))
                }
                None => "INPUT_PULLUP".to_string(),
            };
            if !ctx.devices.has_button(&name) {
                ctx.devices.buttons.push(name.clone());
            }
            Statement::ButtonDecl {
                name,
                pin,
                on_click,
                mode,
            }
        }
        "Potentiometer" => {
            let pin_expr = call_arg(&args, &kwargs, 0, "pin").ok_or_else(|| {
                TranspileError::parse(ln, "Potentiometer requires a pin")
            })?;
            let pin = match pin_expr {
                Expr::Str(token)
                    if token.starts_with('A')
                        && token.len() > 1
                        && token[1..].chars().all(|c| c.is_ascii_digit()) =>
                {
                    Arg::Expr(token.clone())
                }
                Expr::Int(n) if (0..=7).contains(n) => Arg::Int(*n),
                _ => {
                    return Err(TranspileError::parse(
                        ln,
                        "Potentiometer pin must be an analogue pin literal (\"A0\"-style or 0-7)",
                    ))
                }
            };
            ctx.devices
                .potentiometers
                .insert(name.clone(), pin.clone());
            Statement::PotentiometerDecl { name, pin }
        }
        "Ultrasonic" => {
            let trig_expr = call_arg(&args, &kwargs, 0, "trig");
            let echo_expr = call_arg(&args, &kwargs, 1, "echo");
            if trig_expr.is_none() || echo_expr.is_none() {
                return Err(TranspileError::parse(
                    ln,
                    "Ultrasonic requires trig and echo pins",
                ));
            }
            let model = match kwargs
                .iter()
                .find(|(key, _)| key == "model" || key == "sensor")
            {
                Some((_, Expr::Str(model))) => model.clone(),
                Some(_) => {
                    return Err(TranspileError::parse(
                        ln,
                        "ultrasonic model must be a string literal",
                    ))
                }
                None => "HC-SR04".to_string(),
            };
            if model != "HC-SR04" {
                return Err(TranspileError::parse(
                    ln,
                    format!("unsupported ultrasonic sensor model: {model}"),
                ));
            }
            let trig = resolve_int_arg(trig_expr, 0, ctx, ln)?;
            let echo = resolve_int_arg(echo_expr, 0, ctx, ln)?;
            ctx.devices.ultrasonics.insert(name.clone());
            Statement::UltrasonicDecl {
                name,
                trig,
                echo,
                model,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(vec![stmt]))
}

// ---------------------------------------------------------------------------
// actions and standalone expressions

fn handle_expression_line(line: &SourceLine, ctx: &mut Ctx) -> Result<Option<Vec<Statement>>> {
    let ln = line.number;
    let parsed = match parse_expr(&line.text, ln) {
        Ok(expr) => expr,
        Err(_) => return Ok(None),
    };

    // Sleep(ms) / sleep(ms)
    if let Expr::Call { func, args, kwargs } = &parsed {
        if (func == "Sleep" || func == "sleep") && args.len() == 1 && kwargs.is_empty() {
            let ms = resolve_int_arg(Some(&args[0]), 0, ctx, ln)?;
            return Ok(Some(vec![Statement::Sleep { ms }]));
        }
    }

    if let Expr::MethodCall {
        owner,
        method,
        args,
        kwargs,
    } = &parsed
    {
        if let Expr::Name(owner_name) = owner.as_ref() {
            if ctx.devices.leds.contains(owner_name) {
                if let Some(stmts) = led_action(owner_name, method, args, kwargs, ctx, ln)? {
                    return Ok(Some(stmts));
                }
            }
            if ctx.devices.rgb_leds.contains(owner_name) {
                if let Some(stmts) = rgb_action(owner_name, method, args, kwargs, ctx, ln)? {
                    return Ok(Some(stmts));
                }
            }
            if ctx.devices.buzzers.contains(owner_name) {
                if let Some(stmts) = buzzer_action(owner_name, method, args, kwargs, ctx, ln)? {
                    return Ok(Some(stmts));
                }
            }
            if ctx.devices.servos.contains(owner_name) {
                if let Some(stmts) = servo_action(owner_name, method, args, kwargs, ctx, ln)? {
                    return Ok(Some(stmts));
                }
            }
            if ctx.devices.serial_monitors.contains(owner_name)
                && method == "write"
                && kwargs.is_empty()
                && args.len() <= 1
            {
                let value = match args.first() {
                    Some(arg) => to_cpp_expr(arg, ctx, ln)?,
                    None => "\"\"".to_string(),
                };
                return Ok(Some(vec![Statement::SerialWrite {
                    name: owner_name.clone(),
                    value,
                    newline: true,
                }]));
            }
        }
    }

    // standalone expression: keep it only when translation succeeds
    let rendered = match to_cpp_expr(&parsed, ctx, ln) {
        Ok(text) => text,
        Err(_) => return Ok(None),
    };

    // list mutation bookkeeping for append/remove statements
    if let Expr::MethodCall {
        owner,
        method,
        args,
        ..
    } = &parsed
    {
        if let Expr::Name(owner_name) = owner.as_ref() {
            if (method == "append" || method == "remove")
                && ctx.scope.type_of(owner_name).is_list()
            {
                apply_list_mutation(owner_name, method, args.first(), ctx);
            }
        }
    }

    if parsed.has_name_refs() {
        return Ok(Some(vec![Statement::ExprStmt { expr: rendered }]));
    }
    if eval_const(&parsed, &ctx.scope).is_err() {
        return Ok(Some(vec![Statement::ExprStmt { expr: rendered }]));
    }
    // a name-free constant expression has no effect; drop it
    Ok(None)
}

fn apply_list_mutation(name: &str, method: &str, arg: Option<&Expr>, ctx: &mut Ctx) {
    ctx.helpers.list = true;
    let elem = ctx.scope.type_of(name).element();
    let arg_value = arg.and_then(|a| eval_const(a, &ctx.scope).ok());

    let entry = ctx
        .list_info
        .entry(name.to_string())
        .or_insert_with(|| ListInfo { elem, length: None });
    if let Some(length) = entry.length {
        entry.length = if method == "append" {
            Some(length + 1)
        } else if length > 0 {
            Some(length - 1)
        } else {
            Some(length)
        };
    }

    let tracks_const_list = matches!(
        ctx.scope.values.get(name),
        Some(Binding::Const(Value::List(_)))
    );
    if !tracks_const_list {
        ctx.scope.values.insert(name.to_string(), Binding::Runtime);
        return;
    }
    if method == "append" && arg_value.is_none() {
        // the appended value is runtime-only; stop tracking contents
        ctx.scope.values.insert(name.to_string(), Binding::Runtime);
        return;
    }
    if let Some(Binding::Const(Value::List(items))) = ctx.scope.values.get_mut(name) {
        if method == "append" {
            items.push(arg_value.expect("checked above"));
        } else {
            match arg_value {
                Some(value) => {
                    if let Some(pos) = items.iter().position(|item| *item == value) {
                        items.remove(pos);
                    }
                }
                None => {
                    if !items.is_empty() {
                        items.remove(0);
                    }
                }
            }
        }
    }
}

fn led_action(
    name: &str,
    method: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    ln: usize,
) -> Result<Option<Vec<Statement>>> {
    let name = name.to_string();
    let stmt = match method {
        "on" if args.is_empty() && kwargs.is_empty() => Statement::LedOn { name },
        "off" if args.is_empty() && kwargs.is_empty() => Statement::LedOff { name },
        "toggle" if args.is_empty() && kwargs.is_empty() => Statement::LedToggle { name },
        "set_brightness" => {
            let value = resolve_int_arg(call_arg(args, kwargs, 0, "value"), 0, ctx, ln)?;
            Statement::LedSetBrightness { name, value }
        }
        "blink" => {
            let duration_ms =
                resolve_int_arg(call_arg(args, kwargs, 0, "duration_ms"), 0, ctx, ln)?;
            let times = resolve_int_arg(call_arg(args, kwargs, 1, "times"), 1, ctx, ln)?;
            Statement::LedBlink {
                name,
                duration_ms,
                times,
            }
        }
        "fade_in" | "fade_out" => {
            let step = resolve_int_arg(call_arg(args, kwargs, 0, "step"), 5, ctx, ln)?;
            let delay_ms = resolve_int_arg(call_arg(args, kwargs, 1, "delay_ms"), 10, ctx, ln)?;
            if method == "fade_in" {
                Statement::LedFadeIn {
                    name,
                    step,
                    delay_ms,
                }
            } else {
                Statement::LedFadeOut {
                    name,
                    step,
                    delay_ms,
                }
            }
        }
        "flash_pattern" => {
            let pattern = match call_arg(args, kwargs, 0, "pattern") {
                Some(expr) => literal_pattern(expr, ln)?,
                None => Vec::new(),
            };
            let delay_ms = resolve_int_arg(call_arg(args, kwargs, 1, "delay_ms"), 200, ctx, ln)?;
            Statement::LedFlashPattern {
                name,
                pattern,
                delay_ms,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(vec![stmt]))
}

/// A flash pattern must be a literal sequence of numeric entries.
fn literal_pattern(expr: &Expr, ln: usize) -> Result<Vec<i64>> {
    let empty = Scope::default();
    let folded = eval_const(expr, &empty)
        .map_err(|_| TranspileError::parse(ln, "flash_pattern requires a literal pattern list"))?;
    let items = match folded {
        Value::List(items) | Value::Tuple(items) => items,
        _ => {
            return Err(TranspileError::parse(
                ln,
                "flash_pattern requires a literal pattern list",
            ))
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Bool(b) => Ok(i64::from(b)),
            Value::Int(n) => Ok(n),
            Value::Float(f) => Ok(f as i64),
            _ => Err(TranspileError::parse(
                ln,
                "flash_pattern values must be numeric",
            )),
        })
        .collect()
}

fn rgb_action(
    name: &str,
    method: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    ln: usize,
) -> Result<Option<Vec<Statement>>> {
    let name = name.to_string();
    let component = |args: &[Expr],
                     kwargs: &[(String, Expr)],
                     position: usize,
                     keyword: &str,
                     default: i64,
                     ctx: &mut Ctx|
     -> Result<Arg> {
        resolve_int_arg(call_arg(args, kwargs, position, keyword), default, ctx, ln)
    };
    let stmt = match method {
        "set_color" => {
            let red = component(args, kwargs, 0, "red", 0, ctx)?;
            let green = component(args, kwargs, 1, "green", 0, ctx)?;
            let blue = component(args, kwargs, 2, "blue", 0, ctx)?;
            Statement::RgbSetColor {
                name,
                red,
                green,
                blue,
            }
        }
        "on" => {
            let red = component(args, kwargs, 0, "red", 255, ctx)?;
            let green = component(args, kwargs, 1, "green", 255, ctx)?;
            let blue = component(args, kwargs, 2, "blue", 255, ctx)?;
            Statement::RgbOn {
                name,
                red,
                green,
                blue,
            }
        }
        "off" if args.is_empty() && kwargs.is_empty() => Statement::RgbOff { name },
        "fade" => {
            let red = component(args, kwargs, 0, "red", 0, ctx)?;
            let green = component(args, kwargs, 1, "green", 0, ctx)?;
            let blue = component(args, kwargs, 2, "blue", 0, ctx)?;
            let duration_ms = component(args, kwargs, 3, "duration_ms", 1000, ctx)?;
            let steps = component(args, kwargs, 4, "steps", 50, ctx)?;
            Statement::RgbFade {
                name,
                red,
                green,
                blue,
                duration_ms,
                steps,
            }
        }
        "blink" => {
            let red = component(args, kwargs, 0, "red", 0, ctx)?;
            let green = component(args, kwargs, 1, "green", 0, ctx)?;
            let blue = component(args, kwargs, 2, "blue", 0, ctx)?;
            let times = component(args, kwargs, 3, "times", 1, ctx)?;
            let delay_ms = component(args, kwargs, 4, "delay_ms", 200, ctx)?;
            Statement::RgbBlink {
                name,
                red,
                green,
                blue,
                times,
                delay_ms,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(vec![stmt]))
}

fn buzzer_action(
    name: &str,
    method: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    ln: usize,
) -> Result<Option<Vec<Statement>>> {
    let name = name.to_string();
    let stmt = match method {
        "play_tone" => {
            let frequency_expr = call_arg(args, kwargs, 0, "frequency").ok_or_else(|| {
                TranspileError::parse(ln, "play_tone requires a frequency")
            })?;
            let frequency = resolve_float_arg(Some(frequency_expr), 0.0, ctx, ln)?;
            let duration_ms = match call_arg(args, kwargs, 1, "duration_ms") {
                Some(expr) => Some(resolve_float_arg(Some(expr), 0.0, ctx, ln)?),
                None => None,
            };
            Statement::BuzzerPlayTone {
                name,
                frequency,
                duration_ms,
            }
        }
        "stop" if args.is_empty() && kwargs.is_empty() => Statement::BuzzerStop { name },
        "beep" => {
            let frequency = match call_arg(args, kwargs, 0, "frequency") {
                Some(expr) => Some(resolve_float_arg(Some(expr), 0.0, ctx, ln)?),
                None => None,
            };
            let on_ms = resolve_int_arg(call_arg(args, kwargs, 1, "on_ms"), 100, ctx, ln)?;
            let off_ms = resolve_int_arg(call_arg(args, kwargs, 2, "off_ms"), 100, ctx, ln)?;
            let times = resolve_int_arg(call_arg(args, kwargs, 3, "times"), 1, ctx, ln)?;
            Statement::BuzzerBeep {
                name,
                frequency,
                on_ms,
                off_ms,
                times,
            }
        }
        "sweep" => {
            let start_hz = call_arg(args, kwargs, 0, "start_hz");
            let end_hz = call_arg(args, kwargs, 1, "end_hz");
            let duration = call_arg(args, kwargs, 2, "duration_ms");
            if start_hz.is_none() || end_hz.is_none() || duration.is_none() {
                return Err(TranspileError::parse(
                    ln,
                    "sweep requires start_hz, end_hz and duration_ms",
                ));
            }
            let start_hz = resolve_float_arg(start_hz, 0.0, ctx, ln)?;
            let end_hz = resolve_float_arg(end_hz, 0.0, ctx, ln)?;
            let duration_ms = resolve_int_arg(duration, 0, ctx, ln)?;
            let steps = resolve_int_arg(call_arg(args, kwargs, 3, "steps"), 10, ctx, ln)?;
            Statement::BuzzerSweep {
                name,
                start_hz,
                end_hz,
                duration_ms,
                steps,
            }
        }
        "melody" => {
            let melody = match call_arg(args, kwargs, 0, "name") {
                Some(Expr::Str(cue)) => cue.clone(),
                _ => {
                    return Err(TranspileError::parse(
                        ln,
                        "melody requires a cue name string literal",
                    ))
                }
            };
            let tempo = match call_arg(args, kwargs, 1, "tempo") {
                Some(expr) => Some(resolve_float_arg(Some(expr), 0.0, ctx, ln)?),
                None => None,
            };
            Statement::BuzzerMelody { name, melody, tempo }
        }
        _ => return Ok(None),
    };
    Ok(Some(vec![stmt]))
}

fn servo_action(
    name: &str,
    method: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    ln: usize,
) -> Result<Option<Vec<Statement>>> {
    let name = name.to_string();
    let stmt = match method {
        "write" => {
            let angle_expr = call_arg(args, kwargs, 0, "angle")
                .ok_or_else(|| TranspileError::parse(ln, "servo write requires an angle"))?;
            let angle = resolve_float_arg(Some(angle_expr), 0.0, ctx, ln)?;
            Statement::ServoWrite { name, angle }
        }
        "write_us" => {
            let pulse_expr = call_arg(args, kwargs, 0, "pulse_us").ok_or_else(|| {
                TranspileError::parse(ln, "servo write_us requires a pulse width")
            })?;
            let pulse_us = resolve_float_arg(Some(pulse_expr), 0.0, ctx, ln)?;
            Statement::ServoWriteMicroseconds { name, pulse_us }
        }
        _ => return Ok(None),
    };
    Ok(Some(vec![stmt]))
}
