//! Expression translation: render the restricted expression grammar into
//! fully parenthesized Arduino C++ text.
//!
//! Every binary/boolean/comparison subexpression is wrapped in parentheses;
//! nothing relies on target-language precedence. Chained comparisons desugar
//! into a short-circuiting conjunction whose shared middle operands are
//! re-rendered (and therefore re-evaluated at runtime) once per pair — a
//! known inefficiency preserved for output compatibility.

use crate::error::{Result, TranspileError};
use crate::parser::expr::{BinOp, BoolOp, CmpOp, Expr, Piece, UnaryOp};

use super::infer::{ensure_range_iter, infer_expr_type, literal_length};
use super::scope::{Binding, Ctx};
use super::types::TypeLabel;

// ---------------------------------------------------------------------------
// Synthesized runtime-state names, shared with the emitter.

pub fn led_state_var(name: &str) -> String {
    format!("__hb_state_{name}")
}

pub fn led_brightness_var(name: &str) -> String {
    format!("__hb_brightness_{name}")
}

pub fn rgb_state_var(name: &str) -> String {
    format!("__hb_rgb_state_{name}")
}

pub fn rgb_color_vars(name: &str) -> (String, String, String) {
    (
        format!("__hb_rgb_red_{name}"),
        format!("__hb_rgb_green_{name}"),
        format!("__hb_rgb_blue_{name}"),
    )
}

pub fn buzzer_state_var(name: &str) -> String {
    format!("__hb_buzzer_state_{name}")
}

pub fn buzzer_current_var(name: &str) -> String {
    format!("__hb_buzzer_current_{name}")
}

pub fn buzzer_last_var(name: &str) -> String {
    format!("__hb_buzzer_last_{name}")
}

pub fn servo_object_var(name: &str) -> String {
    format!("__hb_servo_{name}")
}

pub fn servo_var(name: &str, field: &str) -> String {
    format!("__hb_servo_{field}_{name}")
}

pub fn button_prev_var(name: &str) -> String {
    format!("__hb_button_prev_{name}")
}

pub fn button_value_var(name: &str) -> String {
    format!("__hb_button_value_{name}")
}

pub fn button_next_var(name: &str) -> String {
    format!("__hb_button_next_{name}")
}

pub fn ultrasonic_helper_fn(name: &str) -> String {
    format!("__hb_read_distance_{name}")
}

// ---------------------------------------------------------------------------

/// Escape a source string into a C/C++ literal body.
pub fn escape_c_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn bin_token(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div | BinOp::FloorDiv => "/",
        BinOp::Mod => "%",
        BinOp::Pow => "**",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
    }
}

fn cmp_token(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

/// Render `expr` as C++ text, or fail deterministically on genuinely
/// unsupported syntax.
pub fn to_cpp_expr(expr: &Expr, ctx: &mut Ctx, line: usize) -> Result<String> {
    match expr {
        Expr::Int(n) => Ok(n.to_string()),
        Expr::Float(f) => Ok(super::eval::format_float(*f)),
        Expr::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Expr::Str(s) => Ok(format!("\"{}\"", escape_c_string(s))),
        Expr::NoneLit => Err(TranspileError::unsupported(line, "None literal")),

        Expr::Name(name) => Ok(name.clone()),

        Expr::Binary { op, left, right } => Ok(format!(
            "({} {} {})",
            to_cpp_expr(left, ctx, line)?,
            bin_token(*op),
            to_cpp_expr(right, ctx, line)?
        )),

        Expr::Unary { op, operand } => {
            let token = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "!",
            };
            Ok(format!("({token}{})", to_cpp_expr(operand, ctx, line)?))
        }

        Expr::BoolChain { op, values } => {
            let token = if *op == BoolOp::And { "&&" } else { "||" };
            let rendered = values
                .iter()
                .map(|v| to_cpp_expr(v, ctx, line))
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("({})", rendered.join(&format!(" {token} "))))
        }

        Expr::Compare { left, rest } => {
            let mut parts = Vec::with_capacity(rest.len());
            let mut lhs = to_cpp_expr(left, ctx, line)?;
            for (op, comparator) in rest {
                let rhs = to_cpp_expr(comparator, ctx, line)?;
                parts.push(format!("{lhs} {} {rhs}", cmp_token(*op)));
                lhs = rhs;
            }
            Ok(format!("({})", parts.join(" && ")))
        }

        Expr::Ternary { test, body, orelse } => Ok(format!(
            "({} ? {} : {})",
            to_cpp_expr(test, ctx, line)?,
            to_cpp_expr(body, ctx, line)?,
            to_cpp_expr(orelse, ctx, line)?
        )),

        Expr::FString(pieces) => translate_fstring(pieces, ctx, line),

        Expr::Index { base, index } => {
            let base_text = to_cpp_expr(base, ctx, line)?;
            let index_text = to_cpp_expr(index, ctx, line)?;
            let base_type = infer_expr_type(base, ctx, line)?;
            if base_type.is_list() {
                ctx.helpers.list = true;
                Ok(format!("__hb_list_get({base_text}, {index_text})"))
            } else {
                Ok(format!("{base_text}[{index_text}]"))
            }
        }

        Expr::Slice { base: _, text } => Err(TranspileError::unsupported(
            line,
            format!("slices are unsupported: [{text}]"),
        )),

        Expr::List(items) => {
            ctx.helpers.list = true;
            let rendered = items
                .iter()
                .map(|item| to_cpp_expr(item, ctx, line))
                .collect::<Result<Vec<_>>>()?;
            let elem_cpp = infer_expr_type(expr, ctx, line)?.element().cpp();
            if rendered.is_empty() {
                Ok(format!("__hb_make_list<{elem_cpp}>()"))
            } else {
                Ok(format!("__hb_make_list<{elem_cpp}>({})", rendered.join(", ")))
            }
        }

        Expr::ListComp { elt, target, iter } => {
            ensure_range_iter(iter, line)?;
            let (start, stop, step) = match iter.as_ref() {
                Expr::Call { args, .. } => {
                    let mut start = "0".to_string();
                    let stop;
                    let mut step = "1".to_string();
                    if args.len() >= 2 {
                        start = to_cpp_expr(&args[0], ctx, line)?;
                        stop = to_cpp_expr(&args[1], ctx, line)?;
                    } else {
                        stop = to_cpp_expr(&args[0], ctx, line)?;
                    }
                    if args.len() == 3 {
                        step = to_cpp_expr(&args[2], ctx, line)?;
                    }
                    (start, stop, step)
                }
                _ => unreachable!("ensure_range_iter accepted a non-call"),
            };

            let saved_value = ctx
                .scope
                .values
                .insert(target.clone(), Binding::Runtime);
            let saved_type = ctx.scope.types.insert(target.clone(), TypeLabel::Int);
            let body = to_cpp_expr(elt, ctx, line);
            match saved_value {
                Some(v) => {
                    ctx.scope.values.insert(target.clone(), v);
                }
                None => {
                    ctx.scope.values.remove(target);
                }
            }
            match saved_type {
                Some(t) => {
                    ctx.scope.types.insert(target.clone(), t);
                }
                None => {
                    ctx.scope.types.remove(target);
                }
            }
            let body = body?;

            let elem_cpp = infer_expr_type(expr, ctx, line)?.element().cpp();
            ctx.helpers.list = true;
            Ok(format!(
                "__hb_list_from_range<{elem_cpp}>({start}, {stop}, {step}, [&](int {target}) {{ return {body}; }})"
            ))
        }

        Expr::MethodCall {
            owner,
            method,
            args,
            kwargs,
        } => translate_method_call(owner, method, args, kwargs, ctx, line),

        Expr::Call { func, args, kwargs } => translate_call(func, args, kwargs, ctx, line),

        Expr::Attribute { attr, .. } => Err(TranspileError::unsupported(
            line,
            format!("attribute access is unsupported: .{attr}"),
        )),

        Expr::Starred(_) => Err(TranspileError::unsupported(
            line,
            "starred arguments are unsupported",
        )),

        Expr::Tuple(_) => Err(TranspileError::unsupported(
            line,
            "tuple expressions are unsupported here",
        )),

        Expr::Dict(_) => Err(TranspileError::unsupported(line, "dict literals are unsupported")),
    }
}

fn translate_fstring(pieces: &[Piece], ctx: &mut Ctx, line: usize) -> Result<String> {
    let has_holes = pieces.iter().any(|p| !matches!(p, Piece::Lit(_)));
    if !has_holes {
        let literal: String = pieces
            .iter()
            .map(|p| match p {
                Piece::Lit(text) => text.as_str(),
                _ => "",
            })
            .collect();
        return Ok(format!("\"{}\"", escape_c_string(&literal)));
    }

    let mut expr: Option<String> = None;
    for piece in pieces {
        let segment = match piece {
            Piece::Lit(text) => {
                if text.is_empty() {
                    continue;
                }
                format!("String(\"{}\")", escape_c_string(text))
            }
            Piece::Expr(inner) => format!("String({})", to_cpp_expr(inner, ctx, line)?),
            Piece::Unsupported(text) => {
                return Err(TranspileError::unsupported(
                    line,
                    format!("unsupported f-string component: {{{text}}}"),
                ))
            }
        };
        expr = Some(match expr {
            None => segment,
            Some(acc) => format!("({acc} + {segment})"),
        });
    }
    Ok(expr.unwrap_or_else(|| "\"\"".to_string()))
}

fn translate_method_call(
    owner: &Expr,
    method: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    line: usize,
) -> Result<String> {
    if method == "append" || method == "remove" {
        if args.len() != 1 || !kwargs.is_empty() {
            return Err(TranspileError::unsupported(
                line,
                format!("unsupported list method usage: .{method}()"),
            ));
        }
        ctx.helpers.list = true;
        let owner_text = to_cpp_expr(owner, ctx, line)?;
        let arg_text = to_cpp_expr(&args[0], ctx, line)?;
        let helper = if method == "append" {
            "__hb_list_append"
        } else {
            "__hb_list_remove"
        };
        return Ok(format!("{helper}({owner_text}, {arg_text})"));
    }

    let no_args = args.is_empty() && kwargs.is_empty();
    if let Expr::Name(owner_name) = owner {
        match method {
            "get_state" if no_args && ctx.devices.leds.contains(owner_name) => {
                return Ok(led_state_var(owner_name));
            }
            "get_state" if no_args && ctx.devices.rgb_leds.contains(owner_name) => {
                return Ok(rgb_state_var(owner_name));
            }
            "get_brightness" if no_args && ctx.devices.leds.contains(owner_name) => {
                return Ok(led_brightness_var(owner_name));
            }
            "read" if no_args && ctx.devices.serial_monitors.contains(owner_name) => {
                return Ok("Serial.readStringUntil('\\n')".to_string());
            }
            "read" if no_args && ctx.devices.potentiometers.contains_key(owner_name) => {
                let pin = &ctx.devices.potentiometers[owner_name];
                return Ok(format!("analogRead({pin})"));
            }
            "read" if no_args && ctx.devices.servos.contains(owner_name) => {
                return Ok(servo_var(owner_name, "angle"));
            }
            "read_us" if no_args && ctx.devices.servos.contains(owner_name) => {
                return Ok(servo_var(owner_name, "pulse"));
            }
            "is_pressed" if no_args && ctx.devices.has_button(owner_name) => {
                return Ok(button_value_var(owner_name));
            }
            "measure_distance" if no_args && ctx.devices.ultrasonics.contains(owner_name) => {
                ctx.ultrasonic_reads.insert(owner_name.clone());
                return Ok(format!("{}()", ultrasonic_helper_fn(owner_name)));
            }
            _ => {}
        }
    }

    Err(TranspileError::unsupported(
        line,
        format!("unsupported attribute call: .{method}()"),
    ))
}

fn translate_call(
    func: &str,
    args: &[Expr],
    kwargs: &[(String, Expr)],
    ctx: &mut Ctx,
    line: usize,
) -> Result<String> {
    if func == "str" && args.len() == 1 && kwargs.is_empty() {
        return Ok(format!("String({})", to_cpp_expr(&args[0], ctx, line)?));
    }
    if (func == "int" || func == "float") && args.len() == 1 && kwargs.is_empty() {
        let arg_text = to_cpp_expr(&args[0], ctx, line)?;
        let arg_type = infer_expr_type(&args[0], ctx, line)?;
        if arg_type == TypeLabel::Str {
            let convert = if func == "int" { "toInt" } else { "toFloat" };
            if arg_text.starts_with('"') {
                return Ok(format!("String({arg_text}).{convert}()"));
            }
            return Ok(format!("({arg_text}).{convert}()"));
        }
        return Ok(format!("static_cast<{func}>({arg_text})"));
    }
    if func == "bool" && args.len() == 1 && kwargs.is_empty() {
        return Ok(format!(
            "static_cast<bool>({})",
            to_cpp_expr(&args[0], ctx, line)?
        ));
    }
    if func == "len" && args.len() == 1 && kwargs.is_empty() {
        if let Some(known) = literal_length(&args[0], ctx) {
            return Ok(known.to_string());
        }
        ctx.helpers.len = true;
        return Ok(format!(
            "static_cast<int>(__hb_len({}))",
            to_cpp_expr(&args[0], ctx, line)?
        ));
    }
    if func == "abs" && args.len() == 1 && kwargs.is_empty() {
        return Ok(format!("abs({})", to_cpp_expr(&args[0], ctx, line)?));
    }
    if (func == "max" || func == "min") && !args.is_empty() && kwargs.is_empty() {
        if args.len() == 1 {
            return to_cpp_expr(&args[0], ctx, line);
        }
        let rendered = args
            .iter()
            .map(|arg| to_cpp_expr(arg, ctx, line))
            .collect::<Result<Vec<_>>>()?;
        let mut acc = rendered[0].clone();
        for sub in &rendered[1..] {
            acc = format!("{func}({acc}, {sub})");
        }
        return Ok(acc);
    }
    if !kwargs.is_empty() {
        return Err(TranspileError::unsupported(
            line,
            format!("unsupported keyword arguments in call to {func}()"),
        ));
    }
    let rendered = args
        .iter()
        .map(|arg| to_cpp_expr(arg, ctx, line))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{func}({})", rendered.join(", ")))
}
