//! Coarse type inference over expression trees.
//!
//! Inference threads the mutable scope through every call because it has one
//! documented side effect: when a `String` promotion is forced onto a named
//! operand of a binary expression, that name's binding is retroactively
//! widened to `String` for the remainder of the scope. Sibling expressions
//! inferred later observe the widened type. This ordering sensitivity is
//! intentional and pinned by tests.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{Result, TranspileError};
use crate::parser::expr::{Expr, UnaryOp};

use super::functions::ensure_function_variant;
use super::scope::{Binding, Ctx};
use super::types::{merge_branch_types, merge_element_types, TypeLabel};

/// Fixed return types of the builtin call allow-list.
static BUILTIN_RETURNS: Lazy<HashMap<&'static str, TypeLabel>> = Lazy::new(|| {
    HashMap::from([
        ("int", TypeLabel::Int),
        ("float", TypeLabel::Float),
        ("bool", TypeLabel::Bool),
        ("str", TypeLabel::Str),
        ("len", TypeLabel::Int),
        ("abs", TypeLabel::Int),
        ("max", TypeLabel::Int),
        ("min", TypeLabel::Int),
    ])
});

/// Infer the coarse type of `expr`, defaulting to `int` on ambiguity.
pub fn infer_expr_type(expr: &Expr, ctx: &mut Ctx, line: usize) -> Result<TypeLabel> {
    match expr {
        Expr::Int(_) => Ok(TypeLabel::Int),
        Expr::Float(_) => Ok(TypeLabel::Float),
        Expr::Bool(_) => Ok(TypeLabel::Bool),
        Expr::Str(_) => Ok(TypeLabel::Str),
        Expr::NoneLit => Ok(TypeLabel::Int),

        Expr::Name(name) => Ok(ctx.scope.type_of(name)),

        Expr::Index { base, .. } | Expr::Slice { base, .. } => {
            let base_type = infer_expr_type(base, ctx, line)?;
            if base_type.is_list() {
                Ok(base_type.element())
            } else {
                Ok(TypeLabel::Int)
            }
        }

        Expr::List(items) => {
            let mut elem_types = Vec::with_capacity(items.len());
            for item in items {
                elem_types.push(infer_expr_type(item, ctx, line)?);
            }
            let element = merge_element_types(&elem_types)
                .map_err(|msg| TranspileError::type_error(line, msg))?;
            Ok(TypeLabel::List(Box::new(element)))
        }

        Expr::ListComp { elt, target, iter } => {
            ensure_range_iter(iter, line)?;
            let saved_type = ctx.scope.types.insert(target.clone(), TypeLabel::Int);
            let element = infer_expr_type(elt, ctx, line);
            match saved_type {
                Some(t) => {
                    ctx.scope.types.insert(target.clone(), t);
                }
                None => {
                    ctx.scope.types.remove(target);
                }
            }
            Ok(TypeLabel::List(Box::new(element?)))
        }

        Expr::Unary { op, operand } => {
            if *op == UnaryOp::Not {
                Ok(TypeLabel::Bool)
            } else {
                infer_expr_type(operand, ctx, line)
            }
        }

        Expr::BoolChain { .. } | Expr::Compare { .. } => Ok(TypeLabel::Bool),

        Expr::Ternary { body, orelse, .. } => {
            let body_type = infer_expr_type(body, ctx, line)?;
            let else_type = infer_expr_type(orelse, ctx, line)?;
            Ok(merge_branch_types(&body_type, &else_type))
        }

        Expr::FString(_) => Ok(TypeLabel::Str),

        Expr::MethodCall { owner, method, .. } => {
            if let Expr::Name(owner_name) = owner.as_ref() {
                match method.as_str() {
                    "get_state"
                        if ctx.devices.leds.contains(owner_name)
                            || ctx.devices.rgb_leds.contains(owner_name) =>
                    {
                        return Ok(TypeLabel::Bool)
                    }
                    "get_brightness" if ctx.devices.leds.contains(owner_name) => {
                        return Ok(TypeLabel::Int)
                    }
                    "read" if ctx.devices.serial_monitors.contains(owner_name) => {
                        return Ok(TypeLabel::Str)
                    }
                    "read" if ctx.devices.potentiometers.contains_key(owner_name) => {
                        return Ok(TypeLabel::Int)
                    }
                    "read" | "read_us" if ctx.devices.servos.contains(owner_name) => {
                        return Ok(TypeLabel::Float)
                    }
                    "is_pressed" if ctx.devices.has_button(owner_name) => {
                        return Ok(TypeLabel::Int)
                    }
                    "measure_distance" if ctx.devices.ultrasonics.contains(owner_name) => {
                        return Ok(TypeLabel::Float)
                    }
                    _ => {}
                }
            }
            Ok(TypeLabel::Int)
        }

        Expr::Call { func, args, .. } => {
            let mut arg_types = Vec::with_capacity(args.len());
            for arg in args {
                arg_types.push(infer_expr_type(arg, ctx, line)?);
            }
            if let Some(builtin) = BUILTIN_RETURNS.get(func.as_str()) {
                return Ok(builtin.clone());
            }
            let signature = arg_types;
            let recorded = ctx
                .functions
                .call_signatures
                .entry(func.clone())
                .or_default();
            if !recorded.contains(&signature) {
                recorded.push(signature.clone());
            }
            ensure_function_variant(func, &signature, ctx, line)?;
            if let Some(variants) = ctx.functions.returns.get(func) {
                let canonical = ctx.functions.resolve_alias(func, &signature);
                if let Some(ret) = variants.get(&canonical) {
                    return Ok(ret.clone());
                }
                if let Some(ret) = variants.get(&signature) {
                    return Ok(ret.clone());
                }
                for (candidate, ret) in variants {
                    if candidate.len() == signature.len() {
                        return Ok(ret.clone());
                    }
                }
            }
            Ok(TypeLabel::Int)
        }

        Expr::Binary { left, right, .. } => {
            let left_type = infer_expr_type(left, ctx, line)?;
            let right_type = infer_expr_type(right, ctx, line)?;
            if left_type == TypeLabel::Str || right_type == TypeLabel::Str {
                // retroactive widening: a named operand forced to String
                // keeps that type for the rest of the scope
                if let Expr::Name(name) = left.as_ref() {
                    if left_type != TypeLabel::Str {
                        ctx.scope.types.insert(name.clone(), TypeLabel::Str);
                    }
                }
                if let Expr::Name(name) = right.as_ref() {
                    if right_type != TypeLabel::Str {
                        ctx.scope.types.insert(name.clone(), TypeLabel::Str);
                    }
                }
                return Ok(TypeLabel::Str);
            }
            if left_type == TypeLabel::Float || right_type == TypeLabel::Float {
                return Ok(TypeLabel::Float);
            }
            Ok(TypeLabel::Int)
        }

        _ => Ok(TypeLabel::Int),
    }
}

/// A comprehension iterator must be a plain `range(...)` call.
pub fn ensure_range_iter(iter: &Expr, line: usize) -> Result<()> {
    match iter {
        Expr::Call { func, args, kwargs } if func == "range" => {
            if args.is_empty() || args.len() > 3 || !kwargs.is_empty() {
                return Err(TranspileError::unsupported(
                    line,
                    "unsupported range() form in comprehension",
                ));
            }
            Ok(())
        }
        _ => Err(TranspileError::unsupported(
            line,
            "only range() comprehensions are supported",
        )),
    }
}

/// Length of a literal (or a name bound to a folded constant), when known.
pub fn literal_length(expr: &Expr, ctx: &Ctx) -> Option<usize> {
    match expr {
        Expr::Str(s) => Some(s.chars().count()),
        Expr::List(items) | Expr::Tuple(items) => Some(items.len()),
        Expr::Name(name) => match ctx.scope.values.get(name) {
            Some(Binding::Const(value)) => match value {
                super::eval::Value::Str(s) => Some(s.chars().count()),
                super::eval::Value::List(items) | super::eval::Value::Tuple(items) => {
                    Some(items.len())
                }
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}
