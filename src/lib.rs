//! hebi - Python-flavoured embedded DSL to Arduino C++ transpiler
//!
//! # Overview
//! Translates a constrained, Python-flavoured DSL describing embedded-device
//! behaviour (LEDs, buzzers, servos, sensors, serial I/O, control flow,
//! functions, lists) into a single compilable `setup()`/`loop()` C++ source
//! unit. Translation is static: a best-effort constant folder only decides
//! between compile-time literals and runtime expressions.

pub mod emitter;
pub mod error;
pub mod parser;
pub mod semantic;

use error::Result;
use std::path::Path;

pub use parser::ast::{required_libraries, Program};

/// Parse DSL source into a [`Program`].
pub fn parse(source: &str) -> Result<Program> {
    parser::parse(source)
}

/// Transpile DSL source into Arduino C++ source text.
pub fn transpile(source: &str) -> Result<String> {
    let program = parser::parse(source)?;
    Ok(emitter::emit(&program))
}

/// Transpile a DSL file into a C++ file.
pub fn transpile_file(input: &Path, output: &Path) -> Result<()> {
    let source = std::fs::read_to_string(input)?;
    let cpp = transpile(&source)?;
    std::fs::write(output, cpp)?;
    Ok(())
}
