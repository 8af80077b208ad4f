//! Scope-chained symbol tables and the shared parse context.
//!
//! Each branch of a conditional, loop body or try/except handler is parsed
//! against an independent snapshot of the enclosing `Scope` (values, types,
//! declared set). Branches therefore cannot observe each other's in-progress
//! declarations; only the post-hoc promotion pass reconciles them. Helper
//! flags, globals, device registries, the function tables and the captured
//! target port are program-wide and live on `Ctx` instead.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::parser::ast::{Arg, FunctionDef, GlobalDecl, HelperFlags};
use crate::parser::SourceLine;

use super::eval::Value;
use super::types::TypeLabel;

/// A name binding: a concrete folded constant, or a value known only at
/// runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Const(Value),
    Runtime,
}

/// One lexical scope's bindings. Cloned per branch; the `base_declared` set
/// remembers what was declared when the snapshot was taken so promotion can
/// tell fresh declarations apart.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub values: HashMap<String, Binding>,
    pub types: HashMap<String, TypeLabel>,
    pub declared: HashSet<String>,
    pub base_declared: HashSet<String>,
    /// Names declared since the snapshot, in textual order.
    pub decl_order: Vec<String>,
}

impl Scope {
    /// Snapshot for parsing a branch body.
    pub fn branch_snapshot(&self) -> Scope {
        Scope {
            values: self.values.clone(),
            types: self.types.clone(),
            declared: self.declared.clone(),
            base_declared: self.declared.clone(),
            decl_order: Vec::new(),
        }
    }

    pub fn declare(&mut self, name: &str) {
        if self.declared.insert(name.to_string()) {
            self.decl_order.push(name.to_string());
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    /// Names declared in this scope but not in its snapshot base, in
    /// declaration order.
    pub fn fresh_names(&self) -> Vec<String> {
        self.decl_order
            .iter()
            .filter(|name| !self.base_declared.contains(*name))
            .cloned()
            .collect()
    }

    pub fn type_of(&self, name: &str) -> TypeLabel {
        self.types.get(name).cloned().unwrap_or(TypeLabel::Int)
    }
}

/// Static list metadata: element type plus the length when it is known at
/// compile time. Used to reject length-changing or type-changing
/// reassignment of a list variable.
#[derive(Debug, Clone)]
pub struct ListInfo {
    pub elem: TypeLabel,
    pub length: Option<usize>,
}

/// Names of every declared device, per feature. Actions and the state
/// inlining in the translator consult this registry.
#[derive(Debug, Clone, Default)]
pub struct Devices {
    pub leds: HashSet<String>,
    pub rgb_leds: HashSet<String>,
    pub buzzers: HashSet<String>,
    pub servos: HashSet<String>,
    pub serial_monitors: HashSet<String>,
    pub ultrasonics: HashSet<String>,
    /// Potentiometer name → analogue pin token, kept for `read()` inlining.
    pub potentiometers: HashMap<String, Arg>,
    /// Buttons in declaration order; each gets one poll action in the loop.
    pub buttons: Vec<String>,
}

impl Devices {
    pub fn has_button(&self, name: &str) -> bool {
        self.buttons.iter().any(|b| b == name)
    }
}

/// A concrete parameter-type tuple.
pub type Signature = Vec<TypeLabel>;

/// The stored, unspecialized source of a function, reparsed once per
/// distinct call-site signature.
#[derive(Debug, Clone)]
pub struct FunctionSource {
    pub params_src: String,
    pub return_annotation: Option<TypeLabel>,
    pub block: Vec<SourceLine>,
    pub line: usize,
}

/// Per-function monomorphization state.
#[derive(Debug, Default)]
pub struct Functions {
    /// name → signature → resolved return type
    pub returns: HashMap<String, HashMap<Signature, TypeLabel>>,
    /// name → parameter index → last-resolved type (seed for lazy params)
    pub param_types: HashMap<String, HashMap<usize, TypeLabel>>,
    pub param_orders: HashMap<String, Vec<String>>,
    pub sources: HashMap<String, FunctionSource>,
    /// name → (signature, specialized definition), in creation order
    pub defs: HashMap<String, Vec<(Signature, FunctionDef)>>,
    /// function names in definition order, for deterministic output
    pub order: Vec<String>,
    /// requested signature → resolved signature, when reparsing widened it
    pub aliases: HashMap<String, HashMap<Signature, Signature>>,
    /// every distinct signature requested by some call site, in call order
    pub call_signatures: HashMap<String, Vec<Signature>>,
    /// the signature produced by the annotation-driven first parse
    pub primary: HashMap<String, Signature>,
    /// (name, signature) pairs currently being specialized; recursive
    /// requests for these short-circuit instead of recursing forever
    pub refreshing: HashSet<(String, Signature)>,
}

impl Functions {
    pub fn def_for(&self, name: &str, signature: &Signature) -> Option<&FunctionDef> {
        self.defs
            .get(name)?
            .iter()
            .find(|(sig, _)| sig == signature)
            .map(|(_, def)| def)
    }

    pub fn resolve_alias(&self, name: &str, signature: &Signature) -> Signature {
        self.aliases
            .get(name)
            .and_then(|per_fn| per_fn.get(signature))
            .cloned()
            .unwrap_or_else(|| signature.clone())
    }
}

/// Return-statement bookkeeping for the function currently being parsed.
#[derive(Debug, Clone, Default)]
pub struct FunctionMeta {
    pub return_types: Vec<TypeLabel>,
    pub has_void: bool,
}

/// The full parse context: the current scope plus all program-wide state.
#[derive(Debug, Default)]
pub struct Ctx {
    pub scope: Scope,
    pub helpers: HelperFlags,
    pub globals: Vec<GlobalDecl>,
    pub devices: Devices,
    pub list_info: HashMap<String, ListInfo>,
    pub functions: Functions,
    pub tmp_counter: usize,
    pub target_port: Option<String>,
    /// Ultrasonic sensors whose distance is actually read somewhere.
    pub ultrasonic_reads: BTreeSet<String>,
    pub current_function: Option<FunctionMeta>,
    /// C++ types chosen for promoted names, keyed by name.
    pub promotion_cpp_types: HashMap<String, String>,
}

impl Ctx {
    pub fn next_tmp(&mut self) -> String {
        let id = self.tmp_counter;
        self.tmp_counter += 1;
        format!("__hb_tmp_{id}")
    }

    /// Register a global declaration unless one with the same name exists.
    pub fn push_global_unique_name(&mut self, decl: GlobalDecl) {
        if self.globals.iter().all(|g| g.name != decl.name) {
            self.globals.push(decl);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_snapshot_is_isolated() {
        let mut parent = Scope::default();
        parent.declare("a");
        let mut child = parent.branch_snapshot();
        child.declare("b");
        assert!(child.is_declared("a"));
        assert_eq!(child.fresh_names(), vec!["b".to_string()]);
        assert!(!parent.is_declared("b"));
    }

    #[test]
    fn test_fresh_names_preserve_order() {
        let mut scope = Scope::default();
        scope.declare("x");
        let mut child = scope.branch_snapshot();
        child.declare("m");
        child.declare("n");
        child.declare("m");
        assert_eq!(child.fresh_names(), vec!["m".to_string(), "n".to_string()]);
    }

    #[test]
    fn test_tmp_counter_is_monotonic() {
        let mut ctx = Ctx::default();
        assert_eq!(ctx.next_tmp(), "__hb_tmp_0");
        assert_eq!(ctx.next_tmp(), "__hb_tmp_1");
    }
}
