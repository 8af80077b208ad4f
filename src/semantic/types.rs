//! Coarse type labels used by inference, declaration typing and emission.

use serde::Serialize;
use std::fmt;

/// The transpiler's coarse type lattice: `int`, `float`, `bool`, `String`,
/// `list[T]` and `void` (function returns only). Ambiguous shapes default to
/// `int` — a deliberate weak-typing heuristic, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TypeLabel {
    Int,
    Float,
    Bool,
    Str,
    Void,
    List(Box<TypeLabel>),
}

impl fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeLabel::Int => write!(f, "int"),
            TypeLabel::Float => write!(f, "float"),
            TypeLabel::Bool => write!(f, "bool"),
            TypeLabel::Str => write!(f, "String"),
            TypeLabel::Void => write!(f, "void"),
            TypeLabel::List(elem) => write!(f, "list[{elem}]"),
        }
    }
}

impl TypeLabel {
    pub fn is_list(&self) -> bool {
        matches!(self, TypeLabel::List(_))
    }

    /// Element type of a list label; `int` otherwise.
    pub fn element(&self) -> TypeLabel {
        match self {
            TypeLabel::List(elem) => (**elem).clone(),
            _ => TypeLabel::Int,
        }
    }

    /// Render the corresponding C++ declaration type.
    pub fn cpp(&self) -> String {
        match self {
            TypeLabel::Int => "int".to_string(),
            TypeLabel::Float => "float".to_string(),
            TypeLabel::Bool => "bool".to_string(),
            TypeLabel::Str => "String".to_string(),
            TypeLabel::Void => "void".to_string(),
            TypeLabel::List(elem) => format!("__hb_list<{}>", elem.cpp()),
        }
    }

    /// Translate a source annotation name into a label.
    pub fn from_annotation(name: &str) -> TypeLabel {
        match name.trim() {
            "int" => TypeLabel::Int,
            "float" => TypeLabel::Float,
            "bool" => TypeLabel::Bool,
            "str" | "String" | "string" => TypeLabel::Str,
            "None" | "void" => TypeLabel::Void,
            _ => TypeLabel::Int,
        }
    }
}

/// Default initializer for a rendered C++ type.
pub fn default_value_for_cpp(c_type: &str) -> String {
    if c_type == "bool" {
        return "false".to_string();
    }
    if c_type == "float" {
        return "0.0".to_string();
    }
    if c_type == "String" {
        return "\"\"".to_string();
    }
    if c_type.starts_with("__hb_list<") {
        return format!("{c_type}()");
    }
    "0".to_string()
}

/// Merge the element types of a list literal or comprehension.
///
/// Uniform types win outright; a scalar mix promotes String > float > int >
/// bool; nested lists must match exactly and never mix with scalars.
pub fn merge_element_types(types: &[TypeLabel]) -> Result<TypeLabel, &'static str> {
    if types.is_empty() {
        return Ok(TypeLabel::Int);
    }
    let mut unique: Vec<&TypeLabel> = Vec::new();
    for t in types {
        if !unique.contains(&t) {
            unique.push(t);
        }
    }
    if unique.len() == 1 {
        return Ok(unique[0].clone());
    }
    let list_count = unique.iter().filter(|t| t.is_list()).count();
    if list_count > 0 {
        if list_count != unique.len() {
            return Err("mixed list and scalar element types");
        }
        // unique already deduplicates, so >1 surviving list type is a conflict
        return Err("conflicting nested list element types");
    }
    for preferred in [TypeLabel::Str, TypeLabel::Float, TypeLabel::Int, TypeLabel::Bool] {
        if unique.contains(&&preferred) {
            return Ok(preferred);
        }
    }
    Ok(unique[0].clone())
}

/// Merge a ternary's branch types.
pub fn merge_branch_types(a: &TypeLabel, b: &TypeLabel) -> TypeLabel {
    if a == b {
        return a.clone();
    }
    if *a == TypeLabel::Str || *b == TypeLabel::Str {
        return TypeLabel::Str;
    }
    if *a == TypeLabel::Float || *b == TypeLabel::Float {
        return TypeLabel::Float;
    }
    TypeLabel::Int
}

/// Combine the inferred types of every value-carrying `return` in a
/// function. `has_void` is set when a bare `return` was seen.
pub fn merge_return_types(
    types: &[TypeLabel],
    has_void: bool,
) -> Result<TypeLabel, &'static str> {
    let mut unique: Vec<&TypeLabel> = Vec::new();
    for t in types {
        if !unique.contains(&t) {
            unique.push(t);
        }
    }
    if has_void {
        if !unique.is_empty() {
            return Err("cannot mix value and bare return statements");
        }
        return Ok(TypeLabel::Void);
    }
    if unique.is_empty() {
        return Ok(TypeLabel::Void);
    }
    if unique.contains(&&TypeLabel::Str) {
        if unique.len() > 1 {
            return Err("conflicting return types");
        }
        return Ok(TypeLabel::Str);
    }
    if unique.contains(&&TypeLabel::Float) {
        return Ok(TypeLabel::Float);
    }
    if unique.len() == 1 && *unique[0] == TypeLabel::Bool {
        return Ok(TypeLabel::Bool);
    }
    if unique.contains(&&TypeLabel::Int) {
        return Ok(TypeLabel::Int);
    }
    if unique.len() == 1 {
        return Ok(unique[0].clone());
    }
    Ok(TypeLabel::Int)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let t = TypeLabel::List(Box::new(TypeLabel::Str));
        assert_eq!(t.to_string(), "list[String]");
        assert_eq!(t.cpp(), "__hb_list<String>");
    }

    #[test]
    fn test_merge_elements_dominance() {
        assert_eq!(
            merge_element_types(&[TypeLabel::Int, TypeLabel::Float]),
            Ok(TypeLabel::Float)
        );
        assert_eq!(
            merge_element_types(&[TypeLabel::Int, TypeLabel::Str, TypeLabel::Float]),
            Ok(TypeLabel::Str)
        );
        assert_eq!(
            merge_element_types(&[TypeLabel::Bool, TypeLabel::Bool]),
            Ok(TypeLabel::Bool)
        );
    }

    #[test]
    fn test_merge_elements_rejects_mixed_nesting() {
        let nested = TypeLabel::List(Box::new(TypeLabel::Int));
        assert!(merge_element_types(&[nested.clone(), TypeLabel::Int]).is_err());
        let other = TypeLabel::List(Box::new(TypeLabel::Str));
        assert!(merge_element_types(&[nested, other]).is_err());
    }

    #[test]
    fn test_merge_returns() {
        assert_eq!(merge_return_types(&[], false), Ok(TypeLabel::Void));
        assert_eq!(
            merge_return_types(&[TypeLabel::Int, TypeLabel::Float], false),
            Ok(TypeLabel::Float)
        );
        assert!(merge_return_types(&[TypeLabel::Int], true).is_err());
        assert!(merge_return_types(&[TypeLabel::Str, TypeLabel::Int], false).is_err());
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_value_for_cpp("bool"), "false");
        assert_eq!(default_value_for_cpp("String"), "\"\"");
        assert_eq!(default_value_for_cpp("__hb_list<int>"), "__hb_list<int>()");
    }
}
