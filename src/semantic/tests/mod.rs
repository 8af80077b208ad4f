//! semantic module tests

use crate::parser::expr::parse_expr;
use crate::semantic::infer::infer_expr_type;
use crate::semantic::scope::{Binding, Ctx};
use crate::semantic::translate::to_cpp_expr;
use crate::semantic::types::TypeLabel;
use pretty_assertions::assert_eq;

fn infer(src: &str, ctx: &mut Ctx) -> TypeLabel {
    let expr = parse_expr(src, 1).unwrap();
    infer_expr_type(&expr, ctx, 1).unwrap()
}

fn translate(src: &str, ctx: &mut Ctx) -> String {
    let expr = parse_expr(src, 1).unwrap();
    to_cpp_expr(&expr, ctx, 1).unwrap()
}

fn translate_err(src: &str, ctx: &mut Ctx) -> String {
    let expr = parse_expr(src, 1).unwrap();
    format!("{}", to_cpp_expr(&expr, ctx, 1).unwrap_err())
}

#[test]
fn test_infer_literals() {
    let mut ctx = Ctx::default();
    assert_eq!(infer("1", &mut ctx), TypeLabel::Int);
    assert_eq!(infer("1.5", &mut ctx), TypeLabel::Float);
    assert_eq!(infer("True", &mut ctx), TypeLabel::Bool);
    assert_eq!(infer("\"x\"", &mut ctx), TypeLabel::Str);
}

#[test]
fn test_infer_unbound_name_defaults_to_int() {
    let mut ctx = Ctx::default();
    assert_eq!(infer("mystery", &mut ctx), TypeLabel::Int);
}

#[test]
fn test_infer_arithmetic_promotion() {
    let mut ctx = Ctx::default();
    assert_eq!(infer("1 + 2", &mut ctx), TypeLabel::Int);
    assert_eq!(infer("1 + 2.5", &mut ctx), TypeLabel::Float);
    assert_eq!(infer("\"a\" + \"b\"", &mut ctx), TypeLabel::Str);
    assert_eq!(infer("1 < 2", &mut ctx), TypeLabel::Bool);
    assert_eq!(infer("not x", &mut ctx), TypeLabel::Bool);
}

#[test]
fn test_infer_list_element_merge() {
    let mut ctx = Ctx::default();
    assert_eq!(
        infer("[1, 2, 3]", &mut ctx),
        TypeLabel::List(Box::new(TypeLabel::Int))
    );
    assert_eq!(
        infer("[1, 2.5]", &mut ctx),
        TypeLabel::List(Box::new(TypeLabel::Float))
    );
    assert_eq!(
        infer("[1, \"a\"]", &mut ctx),
        TypeLabel::List(Box::new(TypeLabel::Str))
    );
}

#[test]
fn test_infer_mixed_nested_list_fails() {
    let mut ctx = Ctx::default();
    let expr = parse_expr("[[1], 2]", 1).unwrap();
    assert!(infer_expr_type(&expr, &mut ctx, 1).is_err());
}

#[test]
fn test_infer_ternary_merges_branch_types() {
    let mut ctx = Ctx::default();
    assert_eq!(infer("1 if c else 2", &mut ctx), TypeLabel::Int);
    assert_eq!(infer("1 if c else 2.5", &mut ctx), TypeLabel::Float);
    assert_eq!(infer("\"a\" if c else 2", &mut ctx), TypeLabel::Str);
}

#[test]
fn test_infer_string_promotion_widens_named_operand() {
    // the documented side effect: inspecting `name + <String>` permanently
    // widens the name's binding for the rest of the scope
    let mut ctx = Ctx::default();
    ctx.scope.types.insert("n".to_string(), TypeLabel::Int);
    assert_eq!(infer("n + \"s\"", &mut ctx), TypeLabel::Str);
    assert_eq!(ctx.scope.types.get("n"), Some(&TypeLabel::Str));
    // a sibling expression inferred afterwards observes the widened type
    assert_eq!(infer("n", &mut ctx), TypeLabel::Str);
}

#[test]
fn test_translate_fully_parenthesizes() {
    let mut ctx = Ctx::default();
    assert_eq!(translate("1 + 2 * 3", &mut ctx), "(1 + (2 * 3))");
    assert_eq!(translate("a and b or c", &mut ctx), "((a && b) || c)");
    assert_eq!(translate("-x", &mut ctx), "(-x)");
    assert_eq!(translate("not x", &mut ctx), "(!x)");
}

#[test]
fn test_translate_chained_comparison_reevaluates_middle() {
    let mut ctx = Ctx::default();
    // the shared middle operand is rendered once per pairwise comparison;
    // this re-evaluation is preserved deliberately
    assert_eq!(
        translate("a < b < c", &mut ctx),
        "(a < b && b < c)"
    );
    assert_eq!(
        translate("a < b + 1 < c", &mut ctx),
        "(a < (b + 1) && (b + 1) < c)"
    );
}

#[test]
fn test_translate_ternary() {
    let mut ctx = Ctx::default();
    assert_eq!(
        translate("1 if a > 2 else 0", &mut ctx),
        "((a > 2) ? 1 : 0)"
    );
}

#[test]
fn test_translate_fstring_concatenation() {
    let mut ctx = Ctx::default();
    assert_eq!(
        translate("f\"v={x} end\"", &mut ctx),
        "((String(\"v=\") + String(x)) + String(\" end\"))"
    );
    assert_eq!(translate("f\"plain\"", &mut ctx), "\"plain\"");
}

#[test]
fn test_translate_casts() {
    let mut ctx = Ctx::default();
    assert_eq!(translate("str(x)", &mut ctx), "String(x)");
    assert_eq!(translate("int(x)", &mut ctx), "static_cast<int>(x)");
    assert_eq!(translate("bool(x)", &mut ctx), "static_cast<bool>(x)");
    // string-typed operands convert instead of reinterpreting
    ctx.scope.types.insert("s".to_string(), TypeLabel::Str);
    assert_eq!(translate("int(s)", &mut ctx), "(s).toInt()");
    assert_eq!(translate("float(s)", &mut ctx), "(s).toFloat()");
    assert_eq!(
        translate("int(\"42\")", &mut ctx),
        "String(\"42\").toInt()"
    );
}

#[test]
fn test_translate_len_folds_literals() {
    let mut ctx = Ctx::default();
    assert_eq!(translate("len(\"hello\")", &mut ctx), "5");
    assert_eq!(translate("len([1, 2, 3])", &mut ctx), "3");
    assert!(!ctx.helpers.len);
    assert_eq!(
        translate("len(x)", &mut ctx),
        "static_cast<int>(__hb_len(x))"
    );
    assert!(ctx.helpers.len);
}

#[test]
fn test_translate_len_folds_known_binding() {
    let mut ctx = Ctx::default();
    ctx.scope.values.insert(
        "word".to_string(),
        Binding::Const(crate::semantic::eval::Value::Str("abc".to_string())),
    );
    assert_eq!(translate("len(word)", &mut ctx), "3");
}

#[test]
fn test_translate_max_min_fold_left() {
    let mut ctx = Ctx::default();
    assert_eq!(translate("max(a, b, c)", &mut ctx), "max(max(a, b), c)");
    assert_eq!(translate("min(a)", &mut ctx), "a");
    assert_eq!(translate("abs(x)", &mut ctx), "abs(x)");
}

#[test]
fn test_translate_list_literal_and_index() {
    let mut ctx = Ctx::default();
    assert_eq!(
        translate("[1, 2, 3]", &mut ctx),
        "__hb_make_list<int>(1, 2, 3)"
    );
    assert!(ctx.helpers.list);

    ctx.scope
        .types
        .insert("xs".to_string(), TypeLabel::List(Box::new(TypeLabel::Int)));
    assert_eq!(translate("xs[0]", &mut ctx), "__hb_list_get(xs, 0)");
    // non-list bases index directly
    assert_eq!(translate("raw[0]", &mut ctx), "raw[0]");
}

#[test]
fn test_translate_comprehension_over_range() {
    let mut ctx = Ctx::default();
    assert_eq!(
        translate("[i * i for i in range(2, 10, 2)]", &mut ctx),
        "__hb_list_from_range<int>(2, 10, 2, [&](int i) { return (i * i); })"
    );
}

#[test]
fn test_translate_rejects_unsupported_constructs() {
    let mut ctx = Ctx::default();
    assert!(translate_err("xs[1:2]", &mut ctx).contains("slices"));
    assert!(translate_err("f(*xs)", &mut ctx).contains("starred"));
    assert!(translate_err("obj.attr", &mut ctx).contains("attribute access"));
    assert!(translate_err("{1: 2}", &mut ctx).contains("dict"));
    assert!(translate_err("f(key=1)", &mut ctx).contains("keyword arguments"));
    assert!(translate_err("obj.method(1)", &mut ctx).contains("attribute call"));
    assert!(translate_err("[i for i in items]", &mut ctx).contains("range()"));
}

#[test]
fn test_translate_device_state_inlining() {
    let mut ctx = Ctx::default();
    ctx.devices.leds.insert("led".to_string());
    ctx.devices.serial_monitors.insert("monitor".to_string());
    ctx.devices.servos.insert("servo".to_string());
    ctx.devices.ultrasonics.insert("sensor".to_string());
    ctx.devices.buttons.push("btn".to_string());

    assert_eq!(translate("led.get_state()", &mut ctx), "__hb_state_led");
    assert_eq!(
        translate("led.get_brightness()", &mut ctx),
        "__hb_brightness_led"
    );
    assert_eq!(
        translate("monitor.read()", &mut ctx),
        "Serial.readStringUntil('\\n')"
    );
    assert_eq!(translate("servo.read()", &mut ctx), "__hb_servo_angle_servo");
    assert_eq!(
        translate("servo.read_us()", &mut ctx),
        "__hb_servo_pulse_servo"
    );
    assert_eq!(
        translate("btn.is_pressed()", &mut ctx),
        "__hb_button_value_btn"
    );
    assert_eq!(
        translate("sensor.measure_distance()", &mut ctx),
        "__hb_read_distance_sensor()"
    );
    assert!(ctx.ultrasonic_reads.contains("sensor"));
}

#[test]
fn test_translate_string_escaping() {
    let mut ctx = Ctx::default();
    assert_eq!(
        translate("\"say \\\"hi\\\"\"", &mut ctx),
        "\"say \\\"hi\\\"\""
    );
    assert_eq!(translate("\"back\\\\slash\"", &mut ctx), "\"back\\\\slash\"");
}

#[test]
fn test_infer_builtin_return_table() {
    let mut ctx = Ctx::default();
    assert_eq!(infer("len(x)", &mut ctx), TypeLabel::Int);
    assert_eq!(infer("str(1)", &mut ctx), TypeLabel::Str);
    assert_eq!(infer("float(x)", &mut ctx), TypeLabel::Float);
    assert_eq!(infer("bool(x)", &mut ctx), TypeLabel::Bool);
}

#[test]
fn test_infer_list_index_element_type() {
    let mut ctx = Ctx::default();
    ctx.scope
        .types
        .insert("xs".to_string(), TypeLabel::List(Box::new(TypeLabel::Str)));
    assert_eq!(infer("xs[0]", &mut ctx), TypeLabel::Str);
    assert_eq!(infer("ys[0]", &mut ctx), TypeLabel::Int);
}
