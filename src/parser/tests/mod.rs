//! parser module tests

use crate::error::TranspileError;
use crate::parser::ast::{Arg, Statement};
use crate::parser::parse;
use pretty_assertions::assert_eq;

fn assigned_exprs(statements: &[Statement]) -> Vec<String> {
    statements
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::VarAssign { expr, .. } => Some(expr.clone()),
            Statement::VarDecl { expr, .. } => Some(expr.clone()),
            Statement::ExprStmt { expr } => Some(expr.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_collects_setup_statements() {
    let program = parse(
        "from Reduino.Actuators import Led\n\
         \n\
         led = Led(13)\n\
         led.toggle()\n\
         sleep(250)\n",
    )
    .unwrap();
    assert!(matches!(&program.setup_body[0], Statement::LedDecl { name, pin: Arg::Int(13) } if name == "led"));
    assert!(matches!(&program.setup_body[1], Statement::LedToggle { name } if name == "led"));
    assert!(matches!(&program.setup_body[2], Statement::Sleep { ms: Arg::Int(250) }));
    assert!(program.loop_body.is_empty());
}

#[test]
fn test_while_true_body_becomes_loop() {
    let program = parse(
        "led = Led()\n\
         while True:\n\
             led.toggle()\n",
    )
    .unwrap();
    assert!(!program.setup_body.is_empty());
    assert!(program
        .loop_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::LedToggle { .. })));
}

#[test]
fn test_for_range_creates_loop_node() {
    let program = parse(
        "led = Led()\n\
         for i in range(3):\n\
             led.toggle()\n",
    )
    .unwrap();
    let loops: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ForRange { var, count, body } => Some((var, count, body)),
            _ => None,
        })
        .collect();
    assert_eq!(loops.len(), 1);
    let (var, count, body) = &loops[0];
    assert_eq!(var.as_str(), "i");
    assert_eq!(**count, 3);
    assert!(body.iter().any(|stmt| matches!(stmt, Statement::LedToggle { .. })));
}

#[test]
fn test_non_literal_for_bound_is_fatal() {
    let err = parse("n = 4\nfor i in range(n):\n    Sleep(10)\n").unwrap_err();
    assert!(matches!(err, TranspileError::Parse { .. }));
}

#[test]
fn test_break_handling() {
    let program = parse(
        "i = 0\n\
         while i < 5:\n\
             break\n",
    )
    .unwrap();
    let found = program.setup_body.iter().any(|stmt| match stmt {
        Statement::While { body, .. } => body.iter().any(|s| matches!(s, Statement::Break)),
        _ => false,
    });
    assert!(found);

    assert!(parse("break\n").is_err());

    let err = parse(
        "led = Led()\n\
         while True:\n\
             break\n",
    )
    .unwrap_err();
    assert!(format!("{err}").contains("main loop"));
}

#[test]
fn test_target_detection_takes_last_occurrence_and_strips() {
    let program = parse(
        "target(\"COM5\")\n\
         assigned = target(\"COM6\")\n\
         print(target(\"COM7\"))\n",
    )
    .unwrap();
    assert_eq!(program.target_port.as_deref(), Some("COM7"));
    for expr in assigned_exprs(&program.setup_body) {
        assert!(!expr.contains("target"), "target leaked into: {expr}");
    }
    assert!(program.global_decls.iter().all(|g| g.name != "assigned"));
}

#[test]
fn test_tuple_assignment_and_swap() {
    let program = parse(
        "a, b = 1, 2\n\
         b, a = a, b\n\
         Sleep(a + b)\n",
    )
    .unwrap();
    let sleeps: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::Sleep { ms } => Some(ms.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sleeps, vec![Arg::Expr("(a + b)".to_string())]);
    // the swap reads both values through temporaries before writing
    let temp_decls = program
        .setup_body
        .iter()
        .filter(|stmt| {
            matches!(stmt, Statement::VarDecl { name, .. } if name.starts_with("__hb_tmp_"))
        })
        .count();
    assert_eq!(temp_decls, 2);
}

#[test]
fn test_serial_monitor_decl_and_write() {
    let program = parse(
        "monitor = SerialMonitor(115200)\n\
         monitor.write(\"hello\")\n",
    )
    .unwrap();
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::SerialMonitorDecl { baud: Arg::Int(115200), .. })));
    let writes: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::SerialWrite { value, .. } => Some(value.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(writes, vec!["\"hello\"".to_string()]);
}

#[test]
fn test_rgb_led_nodes() {
    let program = parse(
        "led = RGBLed(3, 4, 5)\n\
         led.on(1, 2, 3)\n\
         led.set_color(4, 5, 6)\n\
         led.fade(7, 8, 9, duration_ms=100, steps=5)\n\
         led.blink(0, 0, 0, times=2, delay_ms=10)\n\
         led.off()\n",
    )
    .unwrap();
    let mut kinds: Vec<&'static str> = Vec::new();
    for stmt in &program.setup_body {
        match stmt {
            Statement::RgbLedDecl { .. } => kinds.push("decl"),
            Statement::RgbOn { .. } => kinds.push("on"),
            Statement::RgbSetColor { .. } => kinds.push("set_color"),
            Statement::RgbFade { .. } => kinds.push("fade"),
            Statement::RgbBlink { .. } => kinds.push("blink"),
            Statement::RgbOff { .. } => kinds.push("off"),
            _ => {}
        }
    }
    assert_eq!(kinds, vec!["decl", "on", "set_color", "fade", "blink", "off"]);
}

#[test]
fn test_servo_nodes_and_cached_reads() {
    let program = parse(
        "servo = Servo(9, min_angle=15.0, max_angle=165.0, min_pulse_us=500, max_pulse_us=2400)\n\
         servo.write(90)\n\
         servo.write_us(1500)\n\
         angle = servo.read()\n\
         pulse = servo.read_us()\n",
    )
    .unwrap();
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::ServoDecl { .. })));
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::ServoWrite { .. })));
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::ServoWriteMicroseconds { .. })));

    let exprs = assigned_exprs(&program.setup_body);
    assert!(exprs.iter().any(|e| e == "__hb_servo_angle_servo"));
    assert!(exprs.iter().any(|e| e == "__hb_servo_pulse_servo"));
}

#[test]
fn test_servo_rejects_bad_calibration() {
    let err = parse("servo = Servo(9, min_angle=90.0, max_angle=10.0)\n").unwrap_err();
    assert!(format!("{err}").contains("min_angle"));
}

#[test]
fn test_try_statement() {
    let program = parse(
        "led = Led()\n\
         try:\n\
             led.on()\n\
         except Exception as exc:\n\
             led.off()\n",
    )
    .unwrap();
    let tries: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::Try { body, handlers } => Some((body, handlers)),
            _ => None,
        })
        .collect();
    assert_eq!(tries.len(), 1);
    let (_, handlers) = &tries[0];
    assert_eq!(handlers[0].exception.as_deref(), Some("Exception"));
    assert_eq!(handlers[0].target.as_deref(), Some("exc"));
    assert!(handlers[0]
        .body
        .iter()
        .any(|stmt| matches!(stmt, Statement::LedOff { .. })));
}

#[test]
fn test_function_definition() {
    let program = parse(
        "def blink_twice(pin: int):\n\
             led = Led(pin)\n\
             led.toggle()\n\
             led.toggle()\n\
             return pin\n",
    )
    .unwrap();
    assert_eq!(program.functions.len(), 1);
    let function = &program.functions[0];
    assert_eq!(function.name, "blink_twice");
    assert_eq!(function.return_type, "int");
    assert_eq!(
        function.params,
        vec![("pin".to_string(), "int".to_string())]
    );
    assert!(function
        .body
        .iter()
        .any(|stmt| matches!(stmt, Statement::LedToggle { .. })));
    let returns: Vec<_> = function
        .body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::Return { expr } => Some(expr.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(returns, vec![Some("pin".to_string())]);
}

#[test]
fn test_function_overload_per_call_signature() {
    let program = parse(
        "def add(a, b):\n\
             return a + b\n\
         \n\
         x = add(1, 2)\n\
         y = add(\"a\", \"b\")\n",
    )
    .unwrap();
    let adds: Vec<_> = program.functions.iter().filter(|f| f.name == "add").collect();
    assert_eq!(adds.len(), 2);
    let signatures: Vec<Vec<String>> = adds
        .iter()
        .map(|f| f.params.iter().map(|(_, t)| t.clone()).collect())
        .collect();
    assert!(signatures.contains(&vec!["int".to_string(), "int".to_string()]));
    assert!(signatures.contains(&vec!["String".to_string(), "String".to_string()]));
    let returns: Vec<&str> = adds.iter().map(|f| f.return_type.as_str()).collect();
    assert!(returns.contains(&"int"));
    assert!(returns.contains(&"String"));
}

#[test]
fn test_uncalled_function_keeps_single_definition() {
    let program = parse(
        "def helper(a):\n\
             return a\n",
    )
    .unwrap();
    assert_eq!(program.functions.len(), 1);
    assert_eq!(program.functions[0].params[0].1, "int");
}

#[test]
fn test_recursive_function_does_not_loop_forever() {
    let program = parse(
        "def countdown(n):\n\
             if n > 0:\n\
                 m = countdown(n - 1)\n\
             return n\n\
         \n\
         x = countdown(5)\n",
    )
    .unwrap();
    let defs: Vec<_> = program
        .functions
        .iter()
        .filter(|f| f.name == "countdown")
        .collect();
    assert_eq!(defs.len(), 1);
}

#[test]
fn test_mixed_void_and_value_returns_fail() {
    let err = parse(
        "def bad(a):\n\
             if a > 0:\n\
                 return a\n\
             return\n",
    )
    .unwrap_err();
    assert!(format!("{err}").contains("mix value and bare return"));
}

#[test]
fn test_return_outside_function_fails() {
    let err = parse("return 5\n").unwrap_err();
    assert!(format!("{err}").contains("outside of a function"));
}

#[test]
fn test_variadic_params_rejected() {
    assert!(parse("def f(*args):\n    return 1\n").is_err());
    assert!(parse("def f(a=2):\n    return a\n").is_err());
}

#[test]
fn test_ultrasonic_declaration_and_measurement() {
    let program = parse(
        "sensor = Ultrasonic(7, 8)\n\
         distance = sensor.measure_distance()\n",
    )
    .unwrap();
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::UltrasonicDecl { trig: Arg::Int(7), echo: Arg::Int(8), .. })));
    assert!(program.ultrasonic_measurements.contains("sensor"));
    let exprs = assigned_exprs(&program.setup_body);
    assert!(exprs.iter().any(|e| e.contains("__hb_read_distance_sensor()")));
}

#[test]
fn test_potentiometer_declaration_and_read() {
    let program = parse(
        "pot = Potentiometer(\"A0\")\n\
         value = pot.read()\n",
    )
    .unwrap();
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::PotentiometerDecl { .. })));
    let exprs = assigned_exprs(&program.setup_body);
    assert!(exprs.iter().any(|e| e.contains("analogRead(A0)")));
}

#[test]
fn test_potentiometer_rejects_non_analog_pin() {
    let err = parse("pot = Potentiometer(13)\n").unwrap_err();
    assert!(format!("{err}").contains("analogue pin literal"));
}

#[test]
fn test_button_declaration_and_poll() {
    let program = parse(
        "def on_press():\n\
             pass\n\
         \n\
         button = Button(2, on_click=on_press)\n",
    )
    .unwrap();
    let decls: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ButtonDecl {
                name,
                pin,
                on_click,
                mode,
            } => Some((name.clone(), pin.clone(), on_click.clone(), mode.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(decls.len(), 1);
    assert_eq!(decls[0].0, "button");
    assert_eq!(decls[0].1, Arg::Int(2));
    assert_eq!(decls[0].2.as_deref(), Some("on_press"));
    assert_eq!(decls[0].3, "INPUT_PULLUP");

    let polls: Vec<_> = program
        .loop_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ButtonPoll { name } => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(polls, vec!["button".to_string()]);
}

#[test]
fn test_button_is_pressed_uses_cached_value() {
    let program = parse(
        "btn = Button(3)\n\
         pressed = btn.is_pressed()\n",
    )
    .unwrap();
    let exprs = assigned_exprs(&program.setup_body);
    assert!(exprs.iter().any(|e| e.contains("__hb_button_value_btn")));
}

#[test]
fn test_branch_promotion_declares_once() {
    let program = parse(
        "a = 1\n\
         b = 2\n\
         if a < b:\n\
             c = 3\n\
         else:\n\
             c = 4\n",
    )
    .unwrap();
    let c_globals = program
        .global_decls
        .iter()
        .filter(|g| g.name == "c")
        .count();
    assert_eq!(c_globals, 1);
    assert_eq!(
        program.global_decls.iter().find(|g| g.name == "c").map(|g| g.expr.clone()),
        Some("0".to_string())
    );
    let ifs: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::If { branches, else_body } => Some((branches, else_body)),
            _ => None,
        })
        .collect();
    assert_eq!(ifs.len(), 1);
    let (branches, else_body) = &ifs[0];
    // both branches assign, neither re-declares
    assert!(matches!(
        branches[0].body[0],
        Statement::VarAssign { .. }
    ));
    assert!(matches!(else_body[0], Statement::VarAssign { .. }));
}

#[test]
fn test_promotion_is_idempotent_across_branches() {
    let program = parse(
        "mode = 2\n\
         if mode == 0:\n\
             status = 1\n\
         elif mode == 1:\n\
             status = 2\n\
         elif mode == 2:\n\
             status = 3\n\
         else:\n\
             status = 4\n",
    )
    .unwrap();
    let status_globals = program
        .global_decls
        .iter()
        .filter(|g| g.name == "status")
        .count();
    assert_eq!(status_globals, 1);
}

#[test]
fn test_loop_promotion_searches_nested_constructs() {
    let program = parse(
        "n = 0\n\
         while n < 3:\n\
             if n == 0:\n\
                 total = 10\n\
             n = n + 1\n",
    )
    .unwrap();
    // `total` is first assigned inside a conditional nested in the loop and
    // must still be hoisted to the enclosing (global) scope
    assert!(program.global_decls.iter().any(|g| g.name == "total"));
    let whiles: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::While { body, .. } => Some(body),
            _ => None,
        })
        .collect();
    assert_eq!(whiles.len(), 1);
}

#[test]
fn test_list_reassignment_size_mismatch_fails() {
    let err = parse("values = [1, 2]\nvalues = [3]\n").unwrap_err();
    assert!(format!("{err}").contains("size mismatch"));
}

#[test]
fn test_list_reassignment_element_type_conflict_fails() {
    let err = parse("values = [1, 2]\nvalues = [\"a\", \"b\"]\n").unwrap_err();
    assert!(format!("{err}").contains("element types"));
}

#[test]
fn test_list_append_updates_tracked_length() {
    let err = parse(
        "values = [1, 2]\n\
         values.append(3)\n\
         values = [4, 5]\n",
    )
    .unwrap_err();
    // tracked length is now 3, so a two-element reassignment must fail
    assert!(format!("{err}").contains("size mismatch"));
}

#[test]
fn test_string_promotion_widens_sibling_binding() {
    let program = parse(
        "count = 1\n\
         label = \"v\" + count\n\
         copy = count\n",
    )
    .unwrap();
    // inspecting `"v" + count` retroactively widened `count` to String, so
    // the later declaration of `copy` observes the widened type
    let copy_decl = program
        .global_decls
        .iter()
        .find(|g| g.name == "copy")
        .unwrap();
    assert_eq!(copy_decl.c_type, "String");
}

#[test]
fn test_unrecognized_lines_are_skipped() {
    let program = parse(
        "led = Led(5)\n\
         @decorator\n\
         import os\n\
         led.unknown_method(1)\n\
         led.on()\n",
    )
    .unwrap();
    assert!(program
        .setup_body
        .iter()
        .any(|stmt| matches!(stmt, Statement::LedOn { .. })));
    assert_eq!(program.setup_body.len(), 2);
}

#[test]
fn test_flash_pattern_requires_literal_list() {
    let err = parse(
        "led = Led(5)\n\
         pattern = [1, 0]\n\
         led.flash_pattern(pattern, 100)\n",
    )
    .unwrap_err();
    assert!(format!("{err}").contains("literal pattern list"));

    let program = parse("led = Led(5)\nled.flash_pattern([0, 1, 128], 100)\n").unwrap();
    let patterns: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::LedFlashPattern { pattern, delay_ms, .. } => {
                Some((pattern.clone(), delay_ms.clone()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(patterns, vec![(vec![0, 1, 128], Arg::Int(100))]);
}

#[test]
fn test_buzzer_actions() {
    let program = parse(
        "buzzer = Buzzer(8, default_frequency=392.0)\n\
         buzzer.play_tone(440, 500)\n\
         buzzer.beep(times=3)\n\
         buzzer.sweep(200, 800, duration_ms=1000, steps=20)\n\
         buzzer.melody(\"success\")\n\
         buzzer.stop()\n",
    )
    .unwrap();
    let mut kinds: Vec<&'static str> = Vec::new();
    for stmt in &program.setup_body {
        match stmt {
            Statement::BuzzerDecl { default_frequency, .. } => {
                assert_eq!(*default_frequency, Arg::Float(392.0));
                kinds.push("decl");
            }
            Statement::BuzzerPlayTone { duration_ms, .. } => {
                assert_eq!(*duration_ms, Some(Arg::Int(500)));
                kinds.push("play_tone");
            }
            Statement::BuzzerBeep { times, .. } => {
                assert_eq!(*times, Arg::Int(3));
                kinds.push("beep");
            }
            Statement::BuzzerSweep { steps, .. } => {
                assert_eq!(*steps, Arg::Int(20));
                kinds.push("sweep");
            }
            Statement::BuzzerMelody { melody, .. } => {
                assert_eq!(melody, "success");
                kinds.push("melody");
            }
            Statement::BuzzerStop { .. } => kinds.push("stop"),
            _ => {}
        }
    }
    assert_eq!(
        kinds,
        vec!["decl", "play_tone", "beep", "sweep", "melody", "stop"]
    );
}

#[test]
fn test_device_pin_may_be_runtime_expression() {
    let program = parse(
        "pin = 5\n\
         offset = pin + 1\n\
         led = Led(offset)\n",
    )
    .unwrap();
    // the argument references a name, so the pin stays a runtime expression
    let decls: Vec<_> = program
        .setup_body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::LedDecl { pin, .. } => Some(pin.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(decls, vec![Arg::Expr("offset".to_string())]);
}
