//! Best-effort constant folding over the expression grammar.
//!
//! The folder mirrors the source language's operator semantics (true
//! division produces a float, string `+` concatenates, comparisons chain
//! with early exit, `and`/`or` return operands by truthiness). Folding is
//! all-or-nothing: any unsupported node anywhere fails the whole
//! expression. A successful fold only decides whether an expression can be
//! embedded as a compile-time literal — it never changes program semantics.

use crate::parser::expr::{BinOp, BoolOp, CmpOp, Expr, Piece, UnaryOp};

use super::scope::{Binding, Scope};

/// A folded constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
}

/// Why a fold failed. The reason is internal diagnostics only; callers fall
/// back to runtime translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldError(pub &'static str);

pub type FoldResult = Result<Value, FoldError>;

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
        }
    }

    /// Numeric view with bools coerced like the source language does.
    fn as_number(&self) -> Result<Number, FoldError> {
        match self {
            Value::Int(n) => Ok(Number::Int(*n)),
            Value::Float(f) => Ok(Number::Float(*f)),
            Value::Bool(b) => Ok(Number::Int(i64::from(*b))),
            _ => Err(FoldError("unsupported operand type")),
        }
    }

    pub fn as_i64(&self) -> Result<i64, FoldError> {
        match self.as_number()? {
            Number::Int(n) => Ok(n),
            Number::Float(f) => Ok(f as i64),
        }
    }

    pub fn as_f64(&self) -> Result<f64, FoldError> {
        match self.as_number()? {
            Number::Int(n) => Ok(n as f64),
            Number::Float(f) => Ok(f),
        }
    }

    /// Render the value the way the source language's `str()` would.
    pub fn py_str(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::py_repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::py_repr).collect();
                format!("({})", inner.join(", "))
            }
        }
    }

    fn py_repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            other => other.py_str(),
        }
    }
}

pub fn format_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

/// Fold `expr` against the known bindings in `scope`, or report why it
/// cannot be folded.
pub fn eval_const(expr: &Expr, scope: &Scope) -> FoldResult {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::NoneLit => Err(FoldError("unsupported")),

        // only scalar bindings fold through a name; container-valued
        // bindings exist for length tracking alone
        Expr::Name(name) => match scope.values.get(name) {
            Some(Binding::Const(v)) if !matches!(v, Value::List(_) | Value::Tuple(_)) => {
                Ok(v.clone())
            }
            _ => Err(FoldError("non-const name")),
        },

        Expr::Unary { op, operand } => {
            let v = eval_const(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
                UnaryOp::Pos => {
                    v.as_number()?;
                    Ok(v)
                }
                UnaryOp::Neg => match v.as_number()? {
                    Number::Int(n) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or(FoldError("overflow")),
                    Number::Float(f) => Ok(Value::Float(-f)),
                },
            }
        }

        Expr::Binary { op, left, right } => {
            let l = eval_const(left, scope)?;
            let r = eval_const(right, scope)?;
            apply_bin(*op, &l, &r)
        }

        Expr::BoolChain { op, values } => {
            // `and`/`or` return an operand, not a bool
            match op {
                BoolOp::And => {
                    let mut result = Value::Bool(true);
                    for value in values {
                        let v = eval_const(value, scope)?;
                        if !v.truthy() {
                            return Ok(v);
                        }
                        result = v;
                    }
                    Ok(result)
                }
                BoolOp::Or => {
                    let mut result = Value::Bool(false);
                    for value in values {
                        let v = eval_const(value, scope)?;
                        if v.truthy() {
                            return Ok(v);
                        }
                        result = v;
                    }
                    Ok(result)
                }
            }
        }

        Expr::Compare { left, rest } => {
            let mut lhs = eval_const(left, scope)?;
            for (op, comparator) in rest {
                let rhs = eval_const(comparator, scope)?;
                if !compare(*op, &lhs, &rhs)? {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }

        Expr::Ternary { test, body, orelse } => {
            let cond = eval_const(test, scope)?;
            if cond.truthy() {
                eval_const(body, scope)
            } else {
                eval_const(orelse, scope)
            }
        }

        Expr::FString(pieces) => {
            let mut out = String::new();
            for piece in pieces {
                match piece {
                    Piece::Lit(text) => out.push_str(text),
                    Piece::Expr(e) => out.push_str(&eval_const(e, scope)?.py_str()),
                    Piece::Unsupported(_) => return Err(FoldError("unsupported f-string")),
                }
            }
            Ok(Value::Str(out))
        }

        Expr::Call { func, args, kwargs } => {
            if !kwargs.is_empty() {
                return Err(FoldError("unsupported"));
            }
            eval_builtin_call(func, args, scope)
        }

        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| eval_const(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }

        Expr::Tuple(items) => {
            let values = items
                .iter()
                .map(|item| eval_const(item, scope))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Tuple(values))
        }

        _ => Err(FoldError("unsupported")),
    }
}

fn eval_builtin_call(func: &str, args: &[Expr], scope: &Scope) -> FoldResult {
    match func {
        "int" | "float" | "str" | "bool" if args.len() == 1 => {
            let inner = eval_const(&args[0], scope)?;
            cast(func, &inner)
        }
        "len" if args.len() == 1 => {
            let inner = eval_const(&args[0], scope)?;
            match inner {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) | Value::Tuple(items) => Ok(Value::Int(items.len() as i64)),
                _ => Err(FoldError("len() on non-constant")),
            }
        }
        "abs" if args.len() == 1 => {
            let inner = eval_const(&args[0], scope)?;
            match inner.as_number()? {
                Number::Int(n) => n.checked_abs().map(Value::Int).ok_or(FoldError("overflow")),
                Number::Float(f) => Ok(Value::Float(f.abs())),
            }
        }
        "max" | "min" if !args.is_empty() => {
            let mut best = eval_const(&args[0], scope)?;
            for arg in &args[1..] {
                let candidate = eval_const(arg, scope)?;
                let replace = if func == "max" {
                    compare(CmpOp::Gt, &candidate, &best)?
                } else {
                    compare(CmpOp::Lt, &candidate, &best)?
                };
                if replace {
                    best = candidate;
                }
            }
            Ok(best)
        }
        _ => Err(FoldError("unsupported")),
    }
}

fn cast(func: &str, value: &Value) -> FoldResult {
    match func {
        "int" => match value {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| FoldError("cast failed")),
            _ => Err(FoldError("cast failed")),
        },
        "float" => match value {
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| FoldError("cast failed")),
            _ => Err(FoldError("cast failed")),
        },
        "str" => Ok(Value::Str(value.py_str())),
        _ => Ok(Value::Bool(value.truthy())),
    }
}

fn apply_bin(op: BinOp, l: &Value, r: &Value) -> FoldResult {
    // string concatenation is the one non-numeric binary operation
    if op == BinOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (l, r) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    let ln = l.as_number()?;
    let rn = r.as_number()?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => match (ln, rn) {
            (Number::Int(a), Number::Int(b)) => {
                let out = match op {
                    BinOp::Add => a.checked_add(b),
                    BinOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                out.map(Value::Int).ok_or(FoldError("overflow"))
            }
            (a, b) => {
                let (a, b) = (num_f64(a), num_f64(b));
                Ok(Value::Float(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    _ => a * b,
                }))
            }
        },
        BinOp::Div => {
            let b = num_f64(rn);
            if b == 0.0 {
                return Err(FoldError("division by zero"));
            }
            Ok(Value::Float(num_f64(ln) / b))
        }
        BinOp::FloorDiv => {
            let (a, b) = (num_f64(ln), num_f64(rn));
            if b == 0.0 {
                return Err(FoldError("division by zero"));
            }
            let q = (a / b).floor();
            match (l, r) {
                (Value::Float(_), _) | (_, Value::Float(_)) => Ok(Value::Float(q)),
                _ => Ok(Value::Int(q as i64)),
            }
        }
        BinOp::Mod => match (ln, rn) {
            (Number::Int(a), Number::Int(b)) => {
                if b == 0 {
                    return Err(FoldError("division by zero"));
                }
                // remainder takes the divisor's sign
                let mut m = a % b;
                if m != 0 && (m < 0) != (b < 0) {
                    m += b;
                }
                Ok(Value::Int(m))
            }
            (a, b) => {
                let (a, b) = (num_f64(a), num_f64(b));
                if b == 0.0 {
                    return Err(FoldError("division by zero"));
                }
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        },
        BinOp::Pow => match (ln, rn) {
            (Number::Int(a), Number::Int(b)) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| FoldError("overflow"))?;
                a.checked_pow(exp).map(Value::Int).ok_or(FoldError("overflow"))
            }
            (a, b) => Ok(Value::Float(num_f64(a).powf(num_f64(b)))),
        },
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            match (ln, rn) {
                (Number::Int(a), Number::Int(b)) => {
                    let out = match op {
                        BinOp::BitAnd => a & b,
                        BinOp::BitOr => a | b,
                        BinOp::BitXor => a ^ b,
                        BinOp::Shl => {
                            let shift = u32::try_from(b).map_err(|_| FoldError("overflow"))?;
                            a.checked_shl(shift).ok_or(FoldError("overflow"))?
                        }
                        _ => {
                            let shift = u32::try_from(b).map_err(|_| FoldError("overflow"))?;
                            a.checked_shr(shift).ok_or(FoldError("overflow"))?
                        }
                    };
                    Ok(Value::Int(out))
                }
                _ => Err(FoldError("unsupported operand type")),
            }
        }
    }
}

fn num_f64(n: Number) -> f64 {
    match n {
        Number::Int(v) => v as f64,
        Number::Float(v) => v,
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, FoldError> {
    // equality works across types; ordering needs compatible operands
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let eq = values_equal(l, r);
            Ok(if op == CmpOp::Eq { eq } else { !eq })
        }
        _ => {
            let ordering = match (l, r) {
                (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                _ => {
                    let a = l.as_f64()?;
                    let b = r.as_f64()?;
                    a.partial_cmp(&b)
                }
            }
            .ok_or(FoldError("unsupported"))?;
            Ok(match op {
                CmpOp::Lt => ordering.is_lt(),
                CmpOp::Le => ordering.is_le(),
                CmpOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Str(_), _) | (_, Value::Str(_)) => false,
        (Value::List(_) | Value::Tuple(_), _) | (_, Value::List(_) | Value::Tuple(_)) => false,
        _ => match (l.as_f64(), r.as_f64()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::expr::parse_expr;

    fn fold(src: &str) -> FoldResult {
        let expr = parse_expr(src, 1).unwrap();
        eval_const(&expr, &Scope::default())
    }

    #[test]
    fn test_arithmetic_folds() {
        assert_eq!(fold("2 + 3 * 4"), Ok(Value::Int(14)));
        assert_eq!(fold("7 // 2"), Ok(Value::Int(3)));
        assert_eq!(fold("-7 // 2"), Ok(Value::Int(-4)));
        assert_eq!(fold("2 ** 10"), Ok(Value::Int(1024)));
    }

    #[test]
    fn test_true_division_is_float() {
        assert_eq!(fold("7 / 2"), Ok(Value::Float(3.5)));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(
            fold("\"ab\" + \"cd\""),
            Ok(Value::Str("abcd".to_string()))
        );
    }

    #[test]
    fn test_chained_comparison_early_exit() {
        assert_eq!(fold("1 < 2 < 3"), Ok(Value::Bool(true)));
        assert_eq!(fold("1 < 2 < 2"), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_bool_ops_return_operands() {
        assert_eq!(fold("0 or 5"), Ok(Value::Int(5)));
        assert_eq!(fold("2 and 3"), Ok(Value::Int(3)));
    }

    #[test]
    fn test_unbound_name_fails() {
        assert_eq!(fold("x + 1"), Err(FoldError("non-const name")));
    }

    #[test]
    fn test_runtime_binding_fails() {
        let mut scope = Scope::default();
        scope.values.insert("x".to_string(), Binding::Runtime);
        let expr = parse_expr("x + 1", 1).unwrap();
        assert_eq!(eval_const(&expr, &scope), Err(FoldError("non-const name")));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(fold("len(\"hello\")"), Ok(Value::Int(5)));
        assert_eq!(fold("abs(-4)"), Ok(Value::Int(4)));
        assert_eq!(fold("max(1, 5, 3)"), Ok(Value::Int(5)));
        assert_eq!(fold("min(1, 5, 3)"), Ok(Value::Int(1)));
        assert_eq!(fold("int(\"42\")"), Ok(Value::Int(42)));
        assert_eq!(fold("str(3.0)"), Ok(Value::Str("3.0".to_string())));
    }

    #[test]
    fn test_fstring_folds_when_holes_fold() {
        assert_eq!(
            fold("f\"v={2 + 3}\""),
            Ok(Value::Str("v=5".to_string()))
        );
    }

    #[test]
    fn test_ternary() {
        assert_eq!(fold("1 if 2 > 1 else 0"), Ok(Value::Int(1)));
    }

    #[test]
    fn test_partial_failure_is_total() {
        // a single unsupported node poisons the whole fold
        assert!(fold("1 + unknown").is_err());
        assert!(fold("[1, unknown]").is_err());
    }
}
