//! AST definitions shared by the parser and the emitter.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A device/action argument: a folded literal or a rendered runtime
/// expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Expr(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Float(v) => write!(f, "{}", crate::semantic::eval::format_float(*v)),
            Arg::Expr(text) => write!(f, "{text}"),
        }
    }
}

/// Which inlined helper blocks the generated source needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HelperFlags {
    /// bounded growable-array helper family
    pub list: bool,
    /// generic length helper
    pub len: bool,
}

/// A program-level variable declaration emitted before `setup()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalDecl {
    pub name: String,
    pub c_type: String,
    pub expr: String,
}

/// One branch of a conditional.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub condition: String,
    pub body: Vec<Statement>,
}

/// One `except` clause of a try statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handler {
    pub exception: Option<String>,
    pub target: Option<String>,
    pub body: Vec<Statement>,
}

/// A specialized function definition (one per exercised signature).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    /// (parameter name, rendered C++ type) in order
    pub params: Vec<(String, String)>,
    pub body: Vec<Statement>,
    pub return_type: String,
}

/// Statement nodes. Tree-shaped ownership: nested blocks are owned
/// `Vec<Statement>` children, no back-references.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Statement {
    // -- device declarations ------------------------------------------------
    LedDecl {
        name: String,
        pin: Arg,
    },
    RgbLedDecl {
        name: String,
        red_pin: Arg,
        green_pin: Arg,
        blue_pin: Arg,
    },
    BuzzerDecl {
        name: String,
        pin: Arg,
        default_frequency: Arg,
    },
    ServoDecl {
        name: String,
        pin: Arg,
        min_angle: Arg,
        max_angle: Arg,
        min_pulse_us: Arg,
        max_pulse_us: Arg,
    },
    ButtonDecl {
        name: String,
        pin: Arg,
        on_click: Option<String>,
        mode: String,
    },
    /// Implicit per-button poll appended to the repeating phase.
    ButtonPoll {
        name: String,
    },
    PotentiometerDecl {
        name: String,
        pin: Arg,
    },
    UltrasonicDecl {
        name: String,
        trig: Arg,
        echo: Arg,
        model: String,
    },
    SerialMonitorDecl {
        name: String,
        baud: Arg,
    },

    // -- LED actions --------------------------------------------------------
    LedOn {
        name: String,
    },
    LedOff {
        name: String,
    },
    LedToggle {
        name: String,
    },
    LedSetBrightness {
        name: String,
        value: Arg,
    },
    LedBlink {
        name: String,
        duration_ms: Arg,
        times: Arg,
    },
    LedFadeIn {
        name: String,
        step: Arg,
        delay_ms: Arg,
    },
    LedFadeOut {
        name: String,
        step: Arg,
        delay_ms: Arg,
    },
    LedFlashPattern {
        name: String,
        pattern: Vec<i64>,
        delay_ms: Arg,
    },

    // -- RGB LED actions ----------------------------------------------------
    RgbSetColor {
        name: String,
        red: Arg,
        green: Arg,
        blue: Arg,
    },
    RgbOn {
        name: String,
        red: Arg,
        green: Arg,
        blue: Arg,
    },
    RgbOff {
        name: String,
    },
    RgbFade {
        name: String,
        red: Arg,
        green: Arg,
        blue: Arg,
        duration_ms: Arg,
        steps: Arg,
    },
    RgbBlink {
        name: String,
        red: Arg,
        green: Arg,
        blue: Arg,
        times: Arg,
        delay_ms: Arg,
    },

    // -- buzzer actions -----------------------------------------------------
    BuzzerPlayTone {
        name: String,
        frequency: Arg,
        duration_ms: Option<Arg>,
    },
    BuzzerStop {
        name: String,
    },
    BuzzerBeep {
        name: String,
        frequency: Option<Arg>,
        on_ms: Arg,
        off_ms: Arg,
        times: Arg,
    },
    BuzzerSweep {
        name: String,
        start_hz: Arg,
        end_hz: Arg,
        duration_ms: Arg,
        steps: Arg,
    },
    BuzzerMelody {
        name: String,
        melody: String,
        tempo: Option<Arg>,
    },

    // -- servo actions ------------------------------------------------------
    ServoWrite {
        name: String,
        angle: Arg,
    },
    ServoWriteMicroseconds {
        name: String,
        pulse_us: Arg,
    },

    // -- serial / timing ----------------------------------------------------
    SerialWrite {
        name: String,
        value: String,
        newline: bool,
    },
    Sleep {
        ms: Arg,
    },

    // -- generic statements -------------------------------------------------
    VarDecl {
        name: String,
        c_type: String,
        expr: String,
        global_scope: bool,
    },
    VarAssign {
        name: String,
        expr: String,
    },
    ExprStmt {
        expr: String,
    },
    Return {
        expr: Option<String>,
    },
    Break,

    // -- control flow -------------------------------------------------------
    If {
        branches: Vec<Branch>,
        else_body: Vec<Statement>,
    },
    While {
        condition: String,
        body: Vec<Statement>,
    },
    ForRange {
        var: String,
        count: i64,
        body: Vec<Statement>,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<Handler>,
    },
}

/// The root artifact: startup + repeating statement streams plus everything
/// the emitter and the packaging layer need. Built once by the parser and
/// immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Program {
    pub setup_body: Vec<Statement>,
    pub loop_body: Vec<Statement>,
    pub target_port: Option<String>,
    pub global_decls: Vec<GlobalDecl>,
    pub helpers: HelperFlags,
    pub functions: Vec<FunctionDef>,
    /// Ultrasonic sensors whose distance is read somewhere in the program.
    pub ultrasonic_measurements: BTreeSet<String>,
}

impl Program {
    /// Structural scan: is any servo declared anywhere, including nested
    /// bodies and function bodies?
    pub fn uses_servo(&self) -> bool {
        fn scan(statements: &[Statement]) -> bool {
            statements.iter().any(|stmt| match stmt {
                Statement::ServoDecl { .. } => true,
                Statement::If { branches, else_body } => {
                    branches.iter().any(|b| scan(&b.body)) || scan(else_body)
                }
                Statement::While { body, .. } | Statement::ForRange { body, .. } => scan(body),
                Statement::Try { body, handlers } => {
                    scan(body) || handlers.iter().any(|h| scan(&h.body))
                }
                _ => false,
            })
        }
        scan(&self.setup_body)
            || scan(&self.loop_body)
            || self.functions.iter().any(|f| scan(&f.body))
    }
}

/// External libraries the packaging layer must declare for this program.
pub fn required_libraries(program: &Program) -> Vec<&'static str> {
    let mut libraries = Vec::new();
    if program.uses_servo() {
        libraries.push("Servo");
    }
    libraries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_servo_finds_nested_decl() {
        let program = Program {
            loop_body: vec![Statement::If {
                branches: vec![Branch {
                    condition: "true".to_string(),
                    body: vec![Statement::ServoDecl {
                        name: "s".to_string(),
                        pin: Arg::Int(9),
                        min_angle: Arg::Float(0.0),
                        max_angle: Arg::Float(180.0),
                        min_pulse_us: Arg::Float(544.0),
                        max_pulse_us: Arg::Float(2400.0),
                    }],
                }],
                else_body: vec![],
            }],
            ..Program::default()
        };
        assert!(program.uses_servo());
        assert_eq!(required_libraries(&program), vec!["Servo"]);
    }

    #[test]
    fn test_required_libraries_empty_without_servo() {
        let program = Program::default();
        assert!(!program.uses_servo());
        assert!(required_libraries(&program).is_empty());
    }

    #[test]
    fn test_arg_display() {
        assert_eq!(Arg::Int(13).to_string(), "13");
        assert_eq!(Arg::Float(440.0).to_string(), "440.0");
        assert_eq!(Arg::Float(523.25).to_string(), "523.25");
        assert_eq!(Arg::Expr("(a + b)".to_string()).to_string(), "(a + b)");
    }
}
