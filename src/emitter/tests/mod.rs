//! emitter module tests

use crate::emitter::emit;
use crate::parser::parse;

fn compile(source: &str) -> String {
    emit(&parse(source).unwrap())
}

fn setup_section(cpp: &str) -> &str {
    cpp.split("void setup() {").nth(1).unwrap().split("void loop()").next().unwrap()
}

fn loop_section(cpp: &str) -> &str {
    cpp.split("void loop()").nth(1).unwrap()
}

#[test]
fn test_emit_generates_setup_and_loop() {
    let cpp = compile(
        "led = Led(13)\n\
         led.toggle()\n\
         Sleep(250)\n",
    );
    assert!(cpp.contains("void setup() {"));
    assert!(cpp.contains("pinMode(13, OUTPUT);"));
    assert!(cpp.contains("digitalWrite(13, __hb_state_led ? HIGH : LOW);"));
    assert!(cpp.contains("delay(250);"));
    assert!(loop_section(&cpp).contains("// no loop actions"));
}

#[test]
fn test_emit_infinite_loop_moves_body_to_loop() {
    let cpp = compile(
        "led = Led()\n\
         while True:\n\
             led.toggle()\n\
             Sleep(100)\n",
    );
    assert!(cpp.contains("digitalWrite(13, __hb_state_led ? HIGH : LOW);"));
    let loop_part = loop_section(&cpp);
    assert!(loop_part.contains("delay(100);"));
    assert!(!cpp.contains("while (true)"));
}

#[test]
fn test_emit_button_generates_polling_loop() {
    let cpp = compile(
        "def on_press():\n\
             pass\n\
         \n\
         btn = Button(pin=2, on_click=on_press)\n",
    );
    assert!(cpp.contains("bool __hb_button_prev_btn = false;"));
    assert!(cpp.contains("bool __hb_button_value_btn = false;"));
    assert!(cpp.contains("void on_press() {"));

    let setup = setup_section(&cpp);
    assert!(setup.contains("pinMode(2, INPUT_PULLUP);"));
    assert!(setup.contains("__hb_button_prev_btn = (digitalRead(2) == HIGH);"));
    assert!(setup.contains("__hb_button_value_btn = __hb_button_prev_btn;"));

    let loop_part = loop_section(&cpp);
    assert!(loop_part.contains("bool __hb_button_next_btn = (digitalRead(2) == HIGH);"));
    assert!(loop_part.contains("if (__hb_button_next_btn && !__hb_button_prev_btn) {"));
    assert!(loop_part.contains("on_press();"));
    assert!(loop_part.contains("__hb_button_value_btn = __hb_button_next_btn;"));
}

#[test]
fn test_emit_button_with_while_true_polls_once() {
    let cpp = compile(
        "led = Led()\n\
         \n\
         def on_press():\n\
             led.toggle()\n\
         \n\
         btn = Button(pin=2, on_click=on_press)\n\
         \n\
         while True:\n\
             led.off()\n",
    );
    assert!(!cpp.contains("while (true)"));
    let loop_part = loop_section(&cpp);
    assert!(loop_part.contains("digitalWrite(13, LOW);"));
    assert_eq!(loop_part.matches("on_press();").count(), 1);
}

#[test]
fn test_emit_potentiometer_reads_analog_value() {
    let cpp = compile(
        "pot = Potentiometer(0)\n\
         value = pot.read()\n",
    );
    assert!(setup_section(&cpp).contains("pinMode(0, INPUT);"));
    assert!(cpp.contains("value = analogRead(0);"));
}

#[test]
fn test_emit_led_and_rgb_actions() {
    let cpp = compile(
        "led = Led(5)\n\
         led.on()\n\
         led.off()\n\
         led.set_brightness(128)\n\
         \n\
         rgb = RGBLed(3, 4, 6)\n\
         rgb.set_color(10, 20, 30)\n\
         rgb.fade(255, 0, 0, duration_ms=600, steps=3)\n\
         rgb.blink(0, 0, 255, times=2, delay_ms=125)\n",
    );
    assert!(cpp.contains("pinMode(5, OUTPUT);"));
    assert!(cpp.contains("digitalWrite(5, HIGH);"));
    assert!(cpp.contains("digitalWrite(5, LOW);"));
    assert!(cpp.contains("analogWrite(5, __hb_brightness_led);"));
    assert!(cpp.contains("bool __hb_state_led = false;"));

    assert_eq!(cpp.matches("pinMode(3, OUTPUT);").count(), 1);
    assert!(cpp.contains("for (int __hb_i = 1; __hb_i <= __hb_steps; ++__hb_i) {"));
    assert!(cpp.contains("for (int __hb_i = 0; __hb_i < __hb_times; ++__hb_i) {"));
    assert!(cpp.contains("analogWrite(3, __hb_rgb_red_rgb);"));
    assert!(cpp.contains("analogWrite(4, __hb_rgb_green_rgb);"));
    assert!(cpp.contains("analogWrite(6, __hb_rgb_blue_rgb);"));
}

#[test]
fn test_set_brightness_clamps_before_state_update() {
    let cpp = compile(
        "led = Led(5)\n\
         led.set_brightness(500)\n\
         led.set_brightness(-5)\n",
    );
    // the clamp must happen before the shared state/brightness update, so
    // the on/off flag reads the clamped value
    let block = cpp
        .split("int __hb_brightness = 500;")
        .nth(1)
        .expect("set_brightness(500) block present");
    let clamp_pos = block.find("if (__hb_brightness > 255) { __hb_brightness = 255; }").unwrap();
    let update_pos = block.find("__hb_brightness_led = __hb_brightness;").unwrap();
    let state_pos = block.find("__hb_state_led = __hb_brightness_led > 0;").unwrap();
    assert!(clamp_pos < update_pos);
    assert!(update_pos < state_pos);
    assert!(cpp.contains("int __hb_brightness = -5;"));
}

#[test]
fn test_emit_serial_monitor_and_variables() {
    let cpp = compile(
        "monitor = SerialMonitor(115200)\n\
         counter = 0\n\
         counter += 1\n\
         if counter > 10:\n\
             monitor.write(\"hi\")\n\
         else:\n\
             monitor.write(\"lo\")\n",
    );
    assert!(setup_section(&cpp).contains("Serial.begin(115200);"));
    assert!(cpp.contains("Serial.println(\"hi\");"));
    assert!(cpp.contains("Serial.println(\"lo\");"));
    assert!(cpp.contains("int counter = 0;"));
    assert!(cpp.contains("counter = (counter + 1);"));
    assert!(cpp.contains("if ((counter > 10))"));
}

#[test]
fn test_emit_for_range_and_try_except() {
    let cpp = compile(
        "led = Led(9)\n\
         for i in range(3):\n\
             led.toggle()\n\
         try:\n\
             led.on()\n\
         except Exception:\n\
             led.off()\n",
    );
    assert!(cpp.contains("for (int i = 0; i < 3; ++i) {"));
    assert!(cpp.contains("digitalWrite(9, __hb_state_led ? HIGH : LOW);"));
    assert!(cpp.contains("try {"));
    assert!(cpp.contains("catch (Exception &)"));
}

#[test]
fn test_emit_list_helpers_only_when_needed() {
    let without = compile("led = Led(5)\nled.on()\n");
    assert!(!without.contains("__hb_list"));
    assert!(!without.contains("__hb_len"));

    let with_list = compile("values = [1, 2, 3]\nvalues.append(4)\n");
    assert!(with_list.contains("struct __hb_list"));
    assert!(with_list.contains("__hb_list_append(values, 4);"));

    let with_len = compile(
        "monitor = SerialMonitor()\n\
         text = monitor.read()\n\
         n = len(text)\n",
    );
    assert!(with_len.contains("__hb_len"));
    assert!(with_len.contains("n = static_cast<int>(__hb_len(text));"));
}

#[test]
fn test_emit_list_assignment_deep_copies() {
    let cpp = compile(
        "a = [1, 2]\n\
         b = a\n\
         b.append(3)\n",
    );
    assert!(cpp.contains("__hb_list_assign(b, a);"));
    assert!(!cpp.contains("b = a;"));
    assert!(cpp.contains("__hb_list_append(b, 3);"));
}

#[test]
fn test_emit_servo_attach_and_include() {
    let cpp = compile(
        "servo = Servo(9, min_angle=15.0, max_angle=165.0)\n\
         servo.write(90)\n",
    );
    assert!(cpp.contains("#include <Servo.h>"));
    assert!(cpp.contains("Servo __hb_servo_servo;"));
    assert!(cpp.contains("float __hb_servo_min_angle_servo = static_cast<float>(15.0);"));
    assert!(setup_section(&cpp)
        .contains("__hb_servo_servo.attach(9, static_cast<int>(544.0), static_cast<int>(2400.0));"));
    assert!(cpp.contains("__hb_servo_servo.write(static_cast<int>(__hb_angle + 0.5f));"));
    // angle clamps against the calibrated bounds before the state update
    assert!(cpp.contains("if (__hb_angle < __hb_servo_min_angle_servo) { __hb_angle = __hb_servo_min_angle_servo; }"));
}

#[test]
fn test_emit_ultrasonic_measurement_helper_once() {
    let cpp = compile(
        "sensor = Ultrasonic(7, 8)\n\
         d1 = sensor.measure_distance()\n\
         d2 = sensor.measure_distance()\n",
    );
    assert_eq!(cpp.matches("float __hb_read_distance_sensor() {").count(), 1);
    assert!(cpp.contains("pulseIn(8, HIGH, 30000UL);"));
    assert!(setup_section(&cpp).contains("pinMode(7, OUTPUT);"));
    assert!(setup_section(&cpp).contains("pinMode(8, INPUT);"));
    assert!(cpp.contains("d1 = __hb_read_distance_sensor();"));
    assert!(cpp.contains("d2 = __hb_read_distance_sensor();"));
}

#[test]
fn test_emit_unread_ultrasonic_has_no_helper() {
    let cpp = compile("sensor = Ultrasonic(7, 8)\n");
    assert!(!cpp.contains("__hb_read_distance_sensor"));
}

#[test]
fn test_emit_buzzer_melody_table() {
    let cpp = compile(
        "buzzer = Buzzer(8)\n\
         buzzer.melody(\"success\")\n",
    );
    assert!(cpp.contains("const float __hb_freqs[] = {523.25f, 659.25f, 783.99f};"));
    assert!(cpp.contains("const float __hb_beats[] = {0.5f, 0.5f, 1.0f};"));
    assert!(cpp.contains("float __hb_beat_ms = 60000.0f / __hb_tempo;"));
    assert!(cpp.contains("tone(8, __hb_tone);"));
}

#[test]
fn test_emit_unknown_melody_is_dropped() {
    let cpp = compile(
        "buzzer = Buzzer(8)\n\
         buzzer.melody(\"nope\")\n",
    );
    assert!(!cpp.contains("__hb_freqs"));
}

#[test]
fn test_emit_flash_pattern_waits_between_entries() {
    let cpp = compile(
        "led = Led(5)\n\
         led.flash_pattern([0, 1, 128], 40)\n",
    );
    assert!(cpp.contains("const int __hb_pattern[] = {0, 1, 128};"));
    assert!(cpp.contains("if (__hb_i + 1 < __hb_pattern_len) {"));
    assert!(cpp.contains("delay(40);"));
}

#[test]
fn test_emit_spec_dimmer_scenario() {
    // declare on pin 5, on, off, set_brightness(128): pin mode once, full
    // intensity, zero, then a clamped 128 with the flag recomputed
    let cpp = compile(
        "led = Led(5)\n\
         led.on()\n\
         led.off()\n\
         led.set_brightness(128)\n",
    );
    assert_eq!(cpp.matches("pinMode(5, OUTPUT);").count(), 1);
    let on_pos = cpp.find("digitalWrite(5, HIGH);").unwrap();
    let off_pos = cpp.find("digitalWrite(5, LOW);").unwrap();
    let set_pos = cpp.find("int __hb_brightness = 128;").unwrap();
    assert!(on_pos < off_pos && off_pos < set_pos);
    assert!(cpp.contains("__hb_state_led = __hb_brightness_led > 0;"));
}

#[test]
fn test_emit_globals_before_functions_and_phases() {
    let cpp = compile(
        "def describe(n):\n\
             return n + 1\n\
         \n\
         x = 3\n\
         y = describe(x)\n",
    );
    let globals_pos = cpp.find("int x = 3;").unwrap();
    let function_pos = cpp.find("int describe(int n) {").unwrap();
    let setup_pos = cpp.find("void setup() {").unwrap();
    assert!(globals_pos < function_pos);
    assert!(function_pos < setup_pos);
    assert!(cpp.contains("y = describe(x);"));
}

#[test]
fn test_emit_list_comprehension_lowering() {
    let cpp = compile("values = [i * 2 for i in range(5)]\n");
    assert!(cpp.contains(
        "__hb_list_from_range<int>(0, 5, 1, [&](int i) { return (i * 2); })"
    ));
}

#[test]
fn test_emit_promoted_declaration_precedes_branch() {
    let cpp = compile(
        "a = 1\n\
         b = 2\n\
         if a < b:\n\
             c = 3\n\
         else:\n\
             c = 4\n",
    );
    assert!(cpp.contains("int c = 0;"));
    assert!(cpp.contains("c = 3;"));
    assert!(cpp.contains("c = 4;"));
    assert_eq!(cpp.matches("int c").count(), 1);
}
