//! Function overload resolution: lazy per-signature monomorphization.
//!
//! The first call-site request for a (name, argument-type tuple) pair
//! reparses the stored function source with those types seeding the
//! unannotated parameters. If the body's own usage widens a parameter, an
//! alias maps the requested tuple to the resolved one so both converge on a
//! single cached definition. A signature currently being specialized
//! short-circuits instead of recursing when the function calls itself.

use crate::error::Result;
use crate::parser::ast::FunctionDef;

use super::scope::{Ctx, Signature};

/// Make sure a specialization compatible with `signature` exists, reparsing
/// the stored source if needed. Unknown functions are ignored — the call
/// renders as-is and the target language resolves it.
pub fn ensure_function_variant(
    name: &str,
    signature: &Signature,
    ctx: &mut Ctx,
    _line: usize,
) -> Result<()> {
    let canonical = ctx.functions.resolve_alias(name, signature);
    if ctx.functions.def_for(name, &canonical).is_some() {
        return Ok(());
    }
    let source = match ctx.functions.sources.get(name) {
        Some(source) => source.clone(),
        None => return Ok(()),
    };
    let key = (name.to_string(), signature.clone());
    if ctx.functions.refreshing.contains(&key) {
        return Ok(());
    }
    ctx.functions.refreshing.insert(key.clone());
    let result = crate::parser::reparse_function(name, &source, ctx, Some(signature));
    ctx.functions.refreshing.remove(&key);
    result.map(|_| ())
}

/// Pick the specializations that survive into the generated output: one per
/// exercised call-site signature, or the primary definition for a function
/// that is never called.
pub fn select_functions(ctx: &Ctx) -> Vec<FunctionDef> {
    let mut selected = Vec::new();
    for name in &ctx.functions.order {
        let variants = match ctx.functions.defs.get(name) {
            Some(variants) if !variants.is_empty() => variants,
            _ => continue,
        };
        let mut keep: Vec<Signature> = Vec::new();
        let used = ctx
            .functions
            .call_signatures
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        if !used.is_empty() {
            for sig in used {
                let canonical = ctx.functions.resolve_alias(name, sig);
                let exists = variants.iter().any(|(s, _)| *s == canonical);
                if exists && !keep.contains(&canonical) {
                    keep.push(canonical);
                }
            }
        } else {
            match ctx.functions.primary.get(name) {
                Some(primary) if variants.iter().any(|(s, _)| s == primary) => {
                    keep.push(primary.clone());
                }
                _ => keep.push(variants[0].0.clone()),
            }
        }
        for sig in keep {
            if let Some(def) = ctx.functions.def_for(name, &sig) {
                selected.push(def.clone());
            }
        }
    }
    selected
}
