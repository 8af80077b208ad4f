//! Emitter module - Arduino C++ code generation.
//!
//! Deterministic single pass per phase. Section order is fixed: preamble,
//! conditional helper blocks, global declarations, function definitions,
//! per-sensor measurement helpers, `setup()`, `loop()`. Every feature action
//! updates its synthesized runtime state (on/off flag, brightness, colour
//! components, cached frequencies, servo angle/pulse, debounced button
//! edges) consistently, and clamps values at the point of assignment.

#[cfg(test)]
mod tests;

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

use crate::parser::ast::{Arg, FunctionDef, Program, Statement};
use crate::semantic::translate::{
    button_next_var, button_prev_var, button_value_var, buzzer_current_var, buzzer_last_var,
    buzzer_state_var, led_brightness_var, led_state_var, rgb_color_vars, rgb_state_var,
    servo_object_var, servo_var, ultrasonic_helper_fn,
};

const HEADER: &str = "#include <Arduino.h>\n\n";
const SETUP_START: &str = "void setup() {\n";
const SETUP_END: &str = "}\n\n";
const LOOP_START: &str = "void loop() {\n";
const LOOP_END: &str = "}\n";

const LEN_HELPER_SNIPPET: &str = r#"#include <cstring>

template <typename T, size_t N>
constexpr size_t __hb_len(const T (&value)[N]) {
  return N;
}

inline size_t __hb_len(const char *value) {
  return strlen(value);
}

template <typename T>
auto __hb_len(const T &value) -> decltype(value.length()) {
  return value.length();
}
"#;

const LIST_HELPER_SNIPPET: &str = r#"template <typename T>
struct __hb_list {
  T *data;
  size_t size;
  __hb_list() : data(nullptr), size(0) {}
};

template <typename T>
__hb_list<T> __hb_make_list() {
  return {};
}

template <typename T, typename First, typename... Rest>
__hb_list<T> __hb_make_list(First first, Rest... rest) {
  __hb_list<T> result;
  result.size = sizeof...(Rest) + 1;
  result.data = new T[result.size]{static_cast<T>(first), static_cast<T>(rest)...};
  return result;
}

template <typename T>
T &__hb_list_get(__hb_list<T> &list, int index) {
  if (index < 0) {
    index += static_cast<int>(list.size);
  }
  return list.data[index];
}

template <typename T>
const T &__hb_list_get(const __hb_list<T> &list, int index) {
  if (index < 0) {
    index += static_cast<int>(list.size);
  }
  return list.data[index];
}

template <typename T>
void __hb_list_append(__hb_list<T> &list, const T &value) {
  T *next = new T[list.size + 1];
  for (size_t i = 0; i < list.size; ++i) {
    next[i] = list.data[i];
  }
  next[list.size] = value;
  delete[] list.data;
  list.data = next;
  ++list.size;
}

template <typename T>
void __hb_list_remove(__hb_list<T> &list, const T &value) {
  if (list.size == 0) {
    return;
  }
  size_t remove_index = list.size;
  for (size_t i = 0; i < list.size; ++i) {
    if (list.data[i] == value) {
      remove_index = i;
      break;
    }
  }
  if (remove_index == list.size) {
    return;
  }
  T *next = nullptr;
  if (list.size > 1) {
    next = new T[list.size - 1];
    size_t dest = 0;
    for (size_t i = 0; i < list.size; ++i) {
      if (i == remove_index) {
        continue;
      }
      next[dest++] = list.data[i];
    }
  }
  delete[] list.data;
  list.data = next;
  --list.size;
}

template <typename T>
void __hb_list_assign(__hb_list<T> &dest, const __hb_list<T> &source) {
  if (&dest == &source) {
    return;
  }
  if (dest.data != nullptr) {
    delete[] dest.data;
  }
  dest.size = source.size;
  dest.data = dest.size ? new T[dest.size] : nullptr;
  for (size_t i = 0; i < dest.size; ++i) {
    dest.data[i] = source.data[i];
  }
}

template <typename T, typename Func>
__hb_list<T> __hb_list_from_range(int start, int stop, int step, Func func) {
  __hb_list<T> result;
  if (step == 0) {
    return result;
  }
  int count = 0;
  if (step > 0) {
    for (int value = start; value < stop; value += step) {
      ++count;
    }
  } else {
    for (int value = start; value > stop; value += step) {
      ++count;
    }
  }
  result.data = count > 0 ? new T[count] : nullptr;
  result.size = 0;
  if (step > 0) {
    for (int value = start; value < stop; value += step) {
      result.data[result.size++] = func(value);
    }
  } else {
    for (int value = start; value > stop; value += step) {
      result.data[result.size++] = func(value);
    }
  }
  return result;
}

template <typename T>
size_t __hb_len(const __hb_list<T> &value) {
  return value.size;
}
"#;

/// Format a float literal for C++ emission (`523.25f`).
fn cpp_float(value: f64) -> String {
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if !text.contains('.') && !text.to_lowercase().contains('e') {
        text.push_str(".0");
    }
    format!("{text}f")
}

struct Melody {
    tempo: f64,
    sequence: &'static [(f64, f64)],
}

/// Named buzzer cues: (frequency Hz, beats) pairs at a default tempo.
static MELODIES: Lazy<HashMap<&'static str, Melody>> = Lazy::new(|| {
    HashMap::from([
        (
            "success",
            Melody {
                tempo: 240.0,
                sequence: &[(523.25, 0.5), (659.25, 0.5), (783.99, 1.0)],
            },
        ),
        (
            "error",
            Melody {
                tempo: 200.0,
                sequence: &[(329.63, 0.5), (261.63, 1.5)],
            },
        ),
        (
            "startup",
            Melody {
                tempo: 200.0,
                sequence: &[(261.63, 0.5), (329.63, 0.5), (392.0, 0.5), (523.25, 1.0)],
            },
        ),
        (
            "notify",
            Melody {
                tempo: 240.0,
                sequence: &[(783.99, 0.25), (0.0, 0.25), (783.99, 0.5)],
            },
        ),
        (
            "alarm",
            Melody {
                tempo: 200.0,
                sequence: &[
                    (523.25, 0.5),
                    (392.0, 0.5),
                    (523.25, 0.5),
                    (392.0, 0.5),
                    (523.25, 0.5),
                    (392.0, 0.5),
                    (523.25, 0.5),
                    (392.0, 0.5),
                ],
            },
        ),
        (
            "scale_c",
            Melody {
                tempo: 200.0,
                sequence: &[
                    (261.63, 0.5),
                    (293.66, 0.5),
                    (329.63, 0.5),
                    (349.23, 0.5),
                    (392.0, 0.5),
                    (440.0, 0.5),
                    (493.88, 0.5),
                    (523.25, 1.0),
                ],
            },
        ),
        (
            "siren",
            Melody {
                tempo: 180.0,
                sequence: &[
                    (659.25, 0.75),
                    (523.25, 0.75),
                    (659.25, 0.75),
                    (523.25, 0.75),
                    (659.25, 0.75),
                    (523.25, 0.75),
                ],
            },
        ),
    ])
});

#[derive(Clone)]
struct ServoConfig {
    pin: Arg,
    min_angle: Arg,
    max_angle: Arg,
    min_pulse_us: Arg,
    max_pulse_us: Arg,
}

#[derive(Clone)]
struct ButtonConfig {
    pin: Arg,
    mode: String,
    on_click: Option<String>,
}

/// Serialize a [`Program`] into Arduino C++.
pub fn emit(program: &Program) -> String {
    CodeGen::new(program).render()
}

struct CodeGen<'a> {
    program: &'a Program,
    globals: Vec<String>,
    setup_lines: Vec<String>,
    led_pin: HashMap<String, Arg>,
    rgb_pins: HashMap<String, [Arg; 3]>,
    buzzer_pin: HashMap<String, Arg>,
    servo_attached: HashSet<String>,
    ultrasonic_pins: HashMap<String, (Arg, Arg)>,
    button_configs: HashMap<String, ButtonConfig>,
    button_init_done: HashSet<String>,
    pin_modes: HashSet<(String, String, String)>,
    ultra_pin_modes: HashSet<(String, String, String)>,
}

impl<'a> CodeGen<'a> {
    fn new(program: &'a Program) -> Self {
        CodeGen {
            program,
            globals: Vec::new(),
            setup_lines: Vec::new(),
            led_pin: HashMap::new(),
            rgb_pins: HashMap::new(),
            buzzer_pin: HashMap::new(),
            servo_attached: HashSet::new(),
            ultrasonic_pins: HashMap::new(),
            button_configs: HashMap::new(),
            button_init_done: HashSet::new(),
            pin_modes: HashSet::new(),
            ultra_pin_modes: HashSet::new(),
        }
    }

    fn push_global(&mut self, line: String) {
        if !self.globals.contains(&line) {
            self.globals.push(line);
        }
    }

    fn render(mut self) -> String {
        for decl in &self.program.global_decls {
            let line = format!("{} {} = {};", decl.c_type, decl.name, decl.expr);
            if !self.globals.contains(&line) {
                self.globals.push(line);
            }
        }

        // pass 1: declarations create globals and setup-time initialization
        self.collect_setup_decls();
        self.collect_loop_decls();

        // pass 2: statement emission
        let setup_stmts = self.emit_block(&self.program.setup_body.clone(), "  ", true);
        self.setup_lines.extend(setup_stmts);
        let loop_lines = self.emit_block(&self.program.loop_body.clone(), "  ", false);

        let function_sections = self.emit_functions(&self.program.functions.clone());
        let ultrasonic_sections = self.emit_ultrasonic_helpers();

        let mut parts: Vec<String> = vec![HEADER.to_string()];
        if self.program.uses_servo() {
            parts.push("#include <Servo.h>\n\n".to_string());
        }
        if self.program.helpers.list {
            parts.push(format!("{LIST_HELPER_SNIPPET}\n"));
        }
        if self.program.helpers.len {
            parts.push(format!("{LEN_HELPER_SNIPPET}\n"));
        }
        if !self.globals.is_empty() {
            parts.push(format!("{}\n\n", self.globals.join("\n")));
        }
        if !function_sections.is_empty() {
            parts.push(function_sections);
        }
        if !ultrasonic_sections.is_empty() {
            parts.push(ultrasonic_sections);
        }

        parts.push(SETUP_START.to_string());
        if self.setup_lines.is_empty() {
            parts.push("  // no setup actions".to_string());
        } else {
            parts.push(self.setup_lines.join("\n"));
        }
        parts.push(format!("\n{SETUP_END}"));

        parts.push(LOOP_START.to_string());
        if loop_lines.is_empty() {
            parts.push("  // no loop actions".to_string());
        } else {
            parts.push(loop_lines.join("\n"));
        }
        parts.push(format!("\n{LOOP_END}"));

        parts.concat()
    }

    // -- pass 1 -------------------------------------------------------------

    fn ensure_servo_globals(&mut self, name: &str, config: &ServoConfig) {
        self.push_global(format!("Servo {};", servo_object_var(name)));
        self.push_global(format!(
            "float {} = static_cast<float>({});",
            servo_var(name, "min_angle"),
            config.min_angle
        ));
        self.push_global(format!(
            "float {} = static_cast<float>({});",
            servo_var(name, "max_angle"),
            config.max_angle
        ));
        self.push_global(format!(
            "float {} = static_cast<float>({});",
            servo_var(name, "min_pulse"),
            config.min_pulse_us
        ));
        self.push_global(format!(
            "float {} = static_cast<float>({});",
            servo_var(name, "max_pulse"),
            config.max_pulse_us
        ));
        self.push_global(format!(
            "float {} = {};",
            servo_var(name, "angle"),
            servo_var(name, "min_angle")
        ));
        self.push_global(format!(
            "float {} = {};",
            servo_var(name, "pulse"),
            servo_var(name, "min_pulse")
        ));
    }

    fn attach_servo(&mut self, name: &str, config: &ServoConfig) {
        if self.servo_attached.insert(name.to_string()) {
            self.setup_lines.push(format!(
                "  {}.attach({}, static_cast<int>({}), static_cast<int>({}));",
                servo_object_var(name),
                config.pin,
                config.min_pulse_us,
                config.max_pulse_us
            ));
            self.setup_lines.push(format!(
                "  {}.writeMicroseconds(static_cast<int>({}));",
                servo_object_var(name),
                config.min_pulse_us
            ));
        }
    }

    fn register_button(&mut self, name: &str, pin: &Arg, mode: &str, on_click: &Option<String>) {
        self.button_configs.insert(
            name.to_string(),
            ButtonConfig {
                pin: pin.clone(),
                mode: mode.to_string(),
                on_click: on_click.clone(),
            },
        );
        self.push_global(format!("bool {} = false;", button_prev_var(name)));
        self.push_global(format!("bool {} = false;", button_value_var(name)));
    }

    fn led_globals(&mut self, name: &str) {
        self.push_global(format!("bool {} = false;", led_state_var(name)));
        self.push_global(format!("int {} = 0;", led_brightness_var(name)));
    }

    fn buzzer_globals(&mut self, name: &str, default_frequency: &Arg) {
        self.push_global(format!("bool {} = false;", buzzer_state_var(name)));
        self.push_global(format!("float {} = 0.0f;", buzzer_current_var(name)));
        self.push_global(format!(
            "float {} = static_cast<float>({});",
            buzzer_last_var(name),
            default_frequency
        ));
    }

    fn rgb_globals(&mut self, name: &str) {
        self.push_global(format!("bool {} = false;", rgb_state_var(name)));
        let (red, green, blue) = rgb_color_vars(name);
        for var in [red, green, blue] {
            self.push_global(format!("int {var} = 0;"));
        }
    }

    fn collect_setup_decls(&mut self) {
        for node in &self.program.setup_body.clone() {
            match node {
                Statement::ButtonDecl {
                    name,
                    pin,
                    on_click,
                    mode,
                } => {
                    self.register_button(name, pin, mode, on_click);
                    if self.button_init_done.insert(name.clone()) {
                        let key = (name.clone(), pin.to_string(), mode.clone());
                        if self.pin_modes.insert(key) {
                            self.setup_lines
                                .push(format!("  pinMode({pin}, {mode});"));
                        }
                        self.setup_lines.push(format!(
                            "  {} = (digitalRead({pin}) == HIGH);",
                            button_prev_var(name)
                        ));
                        self.setup_lines.push(format!(
                            "  {} = {};",
                            button_value_var(name),
                            button_prev_var(name)
                        ));
                    }
                }
                Statement::ServoDecl {
                    name,
                    pin,
                    min_angle,
                    max_angle,
                    min_pulse_us,
                    max_pulse_us,
                } => {
                    let config = ServoConfig {
                        pin: pin.clone(),
                        min_angle: min_angle.clone(),
                        max_angle: max_angle.clone(),
                        min_pulse_us: min_pulse_us.clone(),
                        max_pulse_us: max_pulse_us.clone(),
                    };
                    self.ensure_servo_globals(name, &config);
                    self.attach_servo(name, &config);
                }
                Statement::LedDecl { name, pin } => {
                    self.led_globals(name);
                    self.led_pin.insert(name.clone(), pin.clone());
                }
                Statement::BuzzerDecl {
                    name,
                    pin,
                    default_frequency,
                } => {
                    self.buzzer_globals(name, default_frequency);
                    self.buzzer_pin.insert(name.clone(), pin.clone());
                    let key = (name.clone(), pin.to_string(), "OUTPUT".to_string());
                    if self.pin_modes.insert(key) {
                        self.setup_lines.push(format!("  pinMode({pin}, OUTPUT);"));
                    }
                }
                Statement::RgbLedDecl {
                    name,
                    red_pin,
                    green_pin,
                    blue_pin,
                } => {
                    self.rgb_globals(name);
                    self.rgb_pins.insert(
                        name.clone(),
                        [red_pin.clone(), green_pin.clone(), blue_pin.clone()],
                    );
                }
                Statement::UltrasonicDecl {
                    name, trig, echo, ..
                } => {
                    self.ultrasonic_pins
                        .insert(name.clone(), (trig.clone(), echo.clone()));
                }
                Statement::PotentiometerDecl { name, pin } => {
                    let key = (name.clone(), pin.to_string(), "INPUT".to_string());
                    if self.pin_modes.insert(key) {
                        self.setup_lines.push(format!("  pinMode({pin}, INPUT);"));
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_loop_decls(&mut self) {
        let mut loop_ultra_modes: HashSet<(String, String, String)> = HashSet::new();
        for node in &self.program.loop_body.clone() {
            match node {
                Statement::ButtonDecl {
                    name,
                    pin,
                    on_click,
                    mode,
                } => {
                    self.register_button(name, pin, mode, on_click);
                    let key = (name.clone(), pin.to_string(), mode.clone());
                    if self.pin_modes.insert(key) {
                        self.setup_lines
                            .push(format!("  pinMode({pin}, {mode});"));
                    }
                }
                Statement::ServoDecl {
                    name,
                    pin,
                    min_angle,
                    max_angle,
                    min_pulse_us,
                    max_pulse_us,
                } => {
                    let config = ServoConfig {
                        pin: pin.clone(),
                        min_angle: min_angle.clone(),
                        max_angle: max_angle.clone(),
                        min_pulse_us: min_pulse_us.clone(),
                        max_pulse_us: max_pulse_us.clone(),
                    };
                    self.ensure_servo_globals(name, &config);
                    self.attach_servo(name, &config);
                }
                Statement::LedDecl { name, pin } => {
                    self.led_globals(name);
                    self.led_pin.entry(name.clone()).or_insert_with(|| pin.clone());
                    // pins declared in the loop still need setup-time modes
                    self.setup_lines.push(format!("  pinMode({pin}, OUTPUT);"));
                }
                Statement::BuzzerDecl {
                    name,
                    pin,
                    default_frequency,
                } => {
                    self.buzzer_globals(name, default_frequency);
                    self.buzzer_pin
                        .entry(name.clone())
                        .or_insert_with(|| pin.clone());
                    let key = (name.clone(), pin.to_string(), "OUTPUT".to_string());
                    if self.pin_modes.insert(key) {
                        self.setup_lines.push(format!("  pinMode({pin}, OUTPUT);"));
                    }
                }
                Statement::RgbLedDecl {
                    name,
                    red_pin,
                    green_pin,
                    blue_pin,
                } => {
                    self.rgb_globals(name);
                    self.rgb_pins.entry(name.clone()).or_insert_with(|| {
                        [red_pin.clone(), green_pin.clone(), blue_pin.clone()]
                    });
                    for (idx, pin) in [red_pin, green_pin, blue_pin].into_iter().enumerate() {
                        let key = (name.clone(), pin.to_string(), idx.to_string());
                        if self.pin_modes.insert(key) {
                            self.setup_lines.push(format!("  pinMode({pin}, OUTPUT);"));
                        }
                    }
                }
                Statement::UltrasonicDecl {
                    name, trig, echo, ..
                } => {
                    self.ultrasonic_pins
                        .entry(name.clone())
                        .or_insert_with(|| (trig.clone(), echo.clone()));
                    let trig_key = (name.clone(), trig.to_string(), "OUTPUT".to_string());
                    if loop_ultra_modes.insert(trig_key) {
                        self.setup_lines.push(format!("  pinMode({trig}, OUTPUT);"));
                    }
                    let echo_key = (name.clone(), echo.to_string(), "INPUT".to_string());
                    if loop_ultra_modes.insert(echo_key) {
                        self.setup_lines.push(format!("  pinMode({echo}, INPUT);"));
                    }
                }
                Statement::PotentiometerDecl { name, pin } => {
                    let key = (name.clone(), pin.to_string(), "INPUT".to_string());
                    if self.pin_modes.insert(key) {
                        self.setup_lines.push(format!("  pinMode({pin}, INPUT);"));
                    }
                }
                _ => {}
            }
        }
    }

    // -- functions and sensor helpers ---------------------------------------

    fn emit_functions(&mut self, functions: &[FunctionDef]) -> String {
        let mut sections = String::new();
        for function in functions {
            let params = function
                .params
                .iter()
                .map(|(name, c_type)| format!("{c_type} {name}"))
                .collect::<Vec<_>>()
                .join(", ");
            sections.push_str(&format!(
                "{} {}({}) {{\n",
                function.return_type, function.name, params
            ));

            // device registrations inside a function body stay local to it
            let saved_led = self.led_pin.clone();
            let saved_rgb = self.rgb_pins.clone();
            let saved_buzzer = self.buzzer_pin.clone();
            let saved_pin_modes = std::mem::take(&mut self.pin_modes);
            let saved_ultra_modes = std::mem::take(&mut self.ultra_pin_modes);

            let body = self.emit_block(&function.body, "  ", false);

            self.led_pin = saved_led;
            self.rgb_pins = saved_rgb;
            self.buzzer_pin = saved_buzzer;
            self.pin_modes = saved_pin_modes;
            self.ultra_pin_modes = saved_ultra_modes;

            if !body.is_empty() {
                sections.push_str(&body.join("\n"));
                sections.push('\n');
            }
            sections.push_str("}\n\n");
        }
        sections
    }

    /// One rate-limited, retry-bounded measurement routine per sensor that
    /// the program actually reads, with a cached last-good-reading fallback.
    fn emit_ultrasonic_helpers(&self) -> String {
        let mut sections = String::new();
        for name in &self.program.ultrasonic_measurements {
            let (trig, echo) = match self.ultrasonic_pins.get(name) {
                Some(pins) => pins.clone(),
                None => continue,
            };
            let lines = [
                format!("float {}() {{", ultrasonic_helper_fn(name)),
                format!("  static unsigned long __hb_last_trigger_ms_{name} = 0UL;"),
                format!("  static float __hb_last_distance_{name} = 400.0f;"),
                format!("  static bool __hb_has_distance_{name} = false;"),
                format!("  const unsigned long __hb_min_interval_ms_{name} = 60UL;"),
                format!("  const unsigned int __hb_max_attempts_{name} = 3U;"),
                format!("  for (unsigned int __hb_attempt_{name} = 0U; __hb_attempt_{name} < __hb_max_attempts_{name}; ++__hb_attempt_{name}) {{"),
                format!("    unsigned long __hb_now_ms_{name} = millis();"),
                format!("    if (__hb_last_trigger_ms_{name} != 0UL) {{"),
                format!("      unsigned long __hb_elapsed_ms_{name} = __hb_now_ms_{name} - __hb_last_trigger_ms_{name};"),
                format!("      if (__hb_elapsed_ms_{name} < __hb_min_interval_ms_{name}) {{"),
                format!("        delay(__hb_min_interval_ms_{name} - __hb_elapsed_ms_{name});"),
                format!("        __hb_now_ms_{name} = millis();"),
                "      }".to_string(),
                "    }".to_string(),
                format!("    digitalWrite({trig}, LOW);"),
                "    delayMicroseconds(2);".to_string(),
                format!("    digitalWrite({trig}, HIGH);"),
                "    delayMicroseconds(10);".to_string(),
                format!("    digitalWrite({trig}, LOW);"),
                format!("    unsigned long __hb_duration_{name} = pulseIn({echo}, HIGH, 30000UL);"),
                format!("    __hb_last_trigger_ms_{name} = millis();"),
                format!("    if (__hb_duration_{name} > 0UL) {{"),
                format!("      float __hb_distance_{name} = (static_cast<float>(__hb_duration_{name}) * 0.0343f) / 2.0f;"),
                format!("      __hb_last_distance_{name} = __hb_distance_{name};"),
                format!("      __hb_has_distance_{name} = true;"),
                format!("      return __hb_distance_{name};"),
                "    }".to_string(),
                "  }".to_string(),
                format!("  if (__hb_has_distance_{name}) {{"),
                format!("    return __hb_last_distance_{name};"),
                "  }".to_string(),
                "  return 400.0f;".to_string(),
                "}\n".to_string(),
            ];
            sections.push_str(&lines.join("\n"));
        }
        sections
    }

    // -- pass 2: statement emission -----------------------------------------

    fn emit_block(&mut self, nodes: &[Statement], indent: &str, in_setup: bool) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for node in nodes {
            match node {
                Statement::ButtonDecl { .. } => {}

                Statement::ButtonPoll { name } => {
                    let config = match self.button_configs.get(name) {
                        Some(config) => config.clone(),
                        None => continue,
                    };
                    let next = button_next_var(name);
                    let prev = button_prev_var(name);
                    let value = button_value_var(name);
                    lines.push(format!(
                        "{indent}bool {next} = (digitalRead({}) == HIGH);",
                        config.pin
                    ));
                    if let Some(callback) = &config.on_click {
                        lines.push(format!("{indent}if ({next} && !{prev}) {{"));
                        lines.push(format!("{indent}  {callback}();"));
                        lines.push(format!("{indent}}}"));
                    }
                    lines.push(format!("{indent}{prev} = {next};"));
                    lines.push(format!("{indent}{value} = {next};"));
                }

                // attach and calibration globals come from the declaration
                // passes; nothing to emit in place
                Statement::ServoDecl { .. } => {}

                Statement::PotentiometerDecl { .. } => {}

                Statement::If {
                    branches,
                    else_body,
                } => {
                    for (idx, branch) in branches.iter().enumerate() {
                        let keyword = if idx == 0 { "if" } else { "else if" };
                        lines.push(format!("{indent}{keyword} ({}) {{", branch.condition));
                        lines.extend(self.emit_block(
                            &branch.body,
                            &format!("{indent}  "),
                            in_setup,
                        ));
                        lines.push(format!("{indent}}}"));
                    }
                    if !else_body.is_empty() {
                        lines.push(format!("{indent}else {{"));
                        lines.extend(self.emit_block(else_body, &format!("{indent}  "), in_setup));
                        lines.push(format!("{indent}}}"));
                    }
                }

                Statement::While { condition, body } => {
                    lines.push(format!("{indent}while ({condition}) {{"));
                    lines.extend(self.emit_block(body, &format!("{indent}  "), in_setup));
                    lines.push(format!("{indent}}}"));
                }

                Statement::ForRange { var, count, body } => {
                    lines.push(format!(
                        "{indent}for (int {var} = 0; {var} < {count}; ++{var}) {{"
                    ));
                    lines.extend(self.emit_block(body, &format!("{indent}  "), in_setup));
                    lines.push(format!("{indent}}}"));
                }

                Statement::Try { body, handlers } => {
                    lines.push(format!("{indent}try {{"));
                    lines.extend(self.emit_block(body, &format!("{indent}  "), in_setup));
                    lines.push(format!("{indent}}}"));
                    for handler in handlers {
                        let header = match (&handler.exception, &handler.target) {
                            (Some(exception), Some(target)) => {
                                format!("catch ({} &{target})", exception.replace('.', "::"))
                            }
                            (Some(exception), None) => {
                                format!("catch ({} &)", exception.replace('.', "::"))
                            }
                            (None, _) => "catch (...)".to_string(),
                        };
                        lines.push(format!("{indent}{header} {{"));
                        lines.extend(self.emit_block(
                            &handler.body,
                            &format!("{indent}  "),
                            in_setup,
                        ));
                        lines.push(format!("{indent}}}"));
                    }
                }

                Statement::SerialMonitorDecl { baud, .. } => {
                    lines.push(format!("{indent}Serial.begin({baud});"));
                }

                Statement::SerialWrite { value, newline, .. } => {
                    let method = if *newline { "println" } else { "print" };
                    lines.push(format!("{indent}Serial.{method}({value});"));
                }

                Statement::VarDecl {
                    name,
                    c_type,
                    expr,
                    global_scope,
                } => {
                    if !global_scope {
                        lines.push(format!("{indent}{c_type} {name} = {expr};"));
                    }
                }

                Statement::VarAssign { name, expr } => {
                    lines.push(format!("{indent}{name} = {expr};"));
                }

                Statement::ExprStmt { expr } => {
                    lines.push(format!("{indent}{expr};"));
                }

                Statement::Return { expr } => match expr {
                    Some(expr) => lines.push(format!("{indent}return {expr};")),
                    None => lines.push(format!("{indent}return;")),
                },

                Statement::Break => {
                    lines.push(format!("{indent}break;"));
                }

                Statement::LedDecl { name, pin } => {
                    self.led_pin.insert(name.clone(), pin.clone());
                    if in_setup {
                        let key = (name.clone(), pin.to_string(), String::new());
                        if self.pin_modes.insert(key) {
                            lines.push(format!("{indent}pinMode({pin}, OUTPUT);"));
                        }
                    }
                }

                Statement::BuzzerDecl { name, pin, .. } => {
                    self.buzzer_pin.insert(name.clone(), pin.clone());
                    if in_setup {
                        let key = (name.clone(), pin.to_string(), "OUTPUT".to_string());
                        if self.pin_modes.insert(key) {
                            lines.push(format!("{indent}pinMode({pin}, OUTPUT);"));
                        }
                    }
                }

                Statement::RgbLedDecl {
                    name,
                    red_pin,
                    green_pin,
                    blue_pin,
                } => {
                    self.rgb_pins.insert(
                        name.clone(),
                        [red_pin.clone(), green_pin.clone(), blue_pin.clone()],
                    );
                    if in_setup {
                        for (idx, pin) in [red_pin, green_pin, blue_pin].into_iter().enumerate() {
                            let key = (name.clone(), pin.to_string(), idx.to_string());
                            if self.pin_modes.insert(key) {
                                lines.push(format!("{indent}pinMode({pin}, OUTPUT);"));
                            }
                        }
                    }
                }

                Statement::UltrasonicDecl {
                    name, trig, echo, ..
                } => {
                    self.ultrasonic_pins
                        .entry(name.clone())
                        .or_insert_with(|| (trig.clone(), echo.clone()));
                    if in_setup {
                        let trig_key = (name.clone(), trig.to_string(), "OUTPUT".to_string());
                        if self.ultra_pin_modes.insert(trig_key) {
                            lines.push(format!("{indent}pinMode({trig}, OUTPUT);"));
                        }
                        let echo_key = (name.clone(), echo.to_string(), "INPUT".to_string());
                        if self.ultra_pin_modes.insert(echo_key) {
                            lines.push(format!("{indent}pinMode({echo}, INPUT);"));
                        }
                    }
                }

                Statement::LedOn { name } => {
                    let (pin, state, brightness) = self.led_vars(name);
                    lines.push(format!("{indent}{state} = true;"));
                    lines.push(format!("{indent}{brightness} = 255;"));
                    lines.push(format!("{indent}digitalWrite({pin}, HIGH);"));
                }

                Statement::LedOff { name } => {
                    let (pin, state, brightness) = self.led_vars(name);
                    lines.push(format!("{indent}{state} = false;"));
                    lines.push(format!("{indent}{brightness} = 0;"));
                    lines.push(format!("{indent}digitalWrite({pin}, LOW);"));
                }

                Statement::LedToggle { name } => {
                    let (pin, state, brightness) = self.led_vars(name);
                    lines.push(format!("{indent}{state} = !{state};"));
                    lines.push(format!("{indent}{brightness} = {state} ? 255 : 0;"));
                    lines.push(format!(
                        "{indent}digitalWrite({pin}, {state} ? HIGH : LOW);"
                    ));
                }

                Statement::LedSetBrightness { name, value } => {
                    let (pin, state, brightness) = self.led_vars(name);
                    lines.push(format!("{indent}{{"));
                    lines.push(format!("{indent}  int __hb_brightness = {value};"));
                    lines.push(format!(
                        "{indent}  if (__hb_brightness < 0) {{ __hb_brightness = 0; }}"
                    ));
                    lines.push(format!(
                        "{indent}  if (__hb_brightness > 255) {{ __hb_brightness = 255; }}"
                    ));
                    lines.push(format!("{indent}  {brightness} = __hb_brightness;"));
                    lines.push(format!("{indent}  {state} = {brightness} > 0;"));
                    lines.push(format!("{indent}  analogWrite({pin}, {brightness});"));
                    lines.push(format!("{indent}}}"));
                }

                Statement::LedBlink {
                    name,
                    duration_ms,
                    times,
                } => {
                    let (pin, state, brightness) = self.led_vars(name);
                    lines.push(format!("{indent}{{"));
                    lines.push(format!("{indent}  int __hb_times = {times};"));
                    lines.push(format!(
                        "{indent}  if (__hb_times < 0) {{ __hb_times = 0; }}"
                    ));
                    lines.push(format!(
                        "{indent}  for (int __hb_i = 0; __hb_i < __hb_times; ++__hb_i) {{"
                    ));
                    lines.push(format!("{indent}    {state} = true;"));
                    lines.push(format!("{indent}    {brightness} = 255;"));
                    lines.push(format!("{indent}    digitalWrite({pin}, HIGH);"));
                    lines.push(format!("{indent}    delay({duration_ms});"));
                    lines.push(format!("{indent}    {state} = false;"));
                    lines.push(format!("{indent}    {brightness} = 0;"));
                    lines.push(format!("{indent}    digitalWrite({pin}, LOW);"));
                    lines.push(format!("{indent}    delay({duration_ms});"));
                    lines.push(format!("{indent}  }}"));
                    lines.push(format!("{indent}  {state} = false;"));
                    lines.push(format!("{indent}  {brightness} = 0;"));
                    lines.push(format!("{indent}  digitalWrite({pin}, LOW);"));
                    lines.push(format!("{indent}}}"));
                }

                Statement::LedFadeIn {
                    name,
                    step,
                    delay_ms,
                } => {
                    lines.extend(self.led_fade(name, step, delay_ms, indent, true));
                }

                Statement::LedFadeOut {
                    name,
                    step,
                    delay_ms,
                } => {
                    lines.extend(self.led_fade(name, step, delay_ms, indent, false));
                }

                Statement::LedFlashPattern {
                    name,
                    pattern,
                    delay_ms,
                } => {
                    if pattern.is_empty() {
                        continue;
                    }
                    let (pin, state, brightness) = self.led_vars(name);
                    let values = pattern
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    lines.push(format!("{indent}{{"));
                    lines.push(format!(
                        "{indent}  const int __hb_pattern[] = {{{values}}};"
                    ));
                    lines.push(format!(
                        "{indent}  const size_t __hb_pattern_len = sizeof(__hb_pattern) / sizeof(__hb_pattern[0]);"
                    ));
                    lines.push(format!(
                        "{indent}  for (size_t __hb_i = 0; __hb_i < __hb_pattern_len; ++__hb_i) {{"
                    ));
                    lines.push(format!(
                        "{indent}    int __hb_value = __hb_pattern[__hb_i];"
                    ));
                    lines.push(format!("{indent}    if (__hb_value <= 0) {{"));
                    lines.push(format!("{indent}      {brightness} = 0;"));
                    lines.push(format!("{indent}      {state} = false;"));
                    lines.push(format!("{indent}      digitalWrite({pin}, LOW);"));
                    lines.push(format!("{indent}    }} else if (__hb_value == 1) {{"));
                    lines.push(format!("{indent}      {brightness} = 255;"));
                    lines.push(format!("{indent}      {state} = true;"));
                    lines.push(format!("{indent}      digitalWrite({pin}, HIGH);"));
                    lines.push(format!("{indent}    }} else {{"));
                    lines.push(format!(
                        "{indent}      if (__hb_value > 255) {{ __hb_value = 255; }}"
                    ));
                    lines.push(format!("{indent}      {brightness} = __hb_value;"));
                    lines.push(format!("{indent}      {state} = {brightness} > 0;"));
                    lines.push(format!("{indent}      analogWrite({pin}, {brightness});"));
                    lines.push(format!("{indent}    }}"));
                    // waits go between entries, never after the last one
                    lines.push(format!(
                        "{indent}    if (__hb_i + 1 < __hb_pattern_len) {{"
                    ));
                    lines.push(format!("{indent}      delay({delay_ms});"));
                    lines.push(format!("{indent}    }}"));
                    lines.push(format!("{indent}  }}"));
                    lines.push(format!("{indent}}}"));
                }

                Statement::RgbSetColor {
                    name,
                    red,
                    green,
                    blue,
                }
                | Statement::RgbOn {
                    name,
                    red,
                    green,
                    blue,
                } => {
                    lines.extend(self.rgb_update(
                        name,
                        &red.to_string(),
                        &green.to_string(),
                        &blue.to_string(),
                        indent,
                    ));
                }

                Statement::RgbOff { name } => {
                    lines.extend(self.rgb_update(name, "0", "0", "0", indent));
                }

                Statement::RgbFade {
                    name,
                    red,
                    green,
                    blue,
                    duration_ms,
                    steps,
                } => {
                    lines.extend(self.rgb_fade(name, red, green, blue, duration_ms, steps, indent));
                }

                Statement::RgbBlink {
                    name,
                    red,
                    green,
                    blue,
                    times,
                    delay_ms,
                } => {
                    lines.extend(self.rgb_blink(name, red, green, blue, times, delay_ms, indent));
                }

                Statement::BuzzerPlayTone {
                    name,
                    frequency,
                    duration_ms,
                } => {
                    lines.extend(self.buzzer_play_tone(name, frequency, duration_ms, indent));
                }

                Statement::BuzzerStop { name } => {
                    let (pin, state, current, _last) = self.buzzer_vars(name);
                    lines.push(format!("{indent}{state} = false;"));
                    lines.push(format!("{indent}{current} = 0.0f;"));
                    lines.push(format!("{indent}noTone({pin});"));
                }

                Statement::BuzzerBeep {
                    name,
                    frequency,
                    on_ms,
                    off_ms,
                    times,
                } => {
                    lines.extend(self.buzzer_beep(name, frequency, on_ms, off_ms, times, indent));
                }

                Statement::BuzzerSweep {
                    name,
                    start_hz,
                    end_hz,
                    duration_ms,
                    steps,
                } => {
                    lines.extend(
                        self.buzzer_sweep(name, start_hz, end_hz, duration_ms, steps, indent),
                    );
                }

                Statement::BuzzerMelody { name, melody, tempo } => {
                    lines.extend(self.buzzer_melody(name, melody, tempo, indent));
                }

                Statement::ServoWrite { name, angle } => {
                    lines.extend(self.servo_write(name, angle, indent));
                }

                Statement::ServoWriteMicroseconds { name, pulse_us } => {
                    lines.extend(self.servo_write_us(name, pulse_us, indent));
                }

                Statement::Sleep { ms } => {
                    lines.push(format!("{indent}delay({ms});"));
                }
            }
        }
        lines
    }

    // -- per-feature expansion helpers --------------------------------------

    fn led_vars(&self, name: &str) -> (String, String, String) {
        let pin = self
            .led_pin
            .get(name)
            .cloned()
            .unwrap_or(Arg::Int(13))
            .to_string();
        (pin, led_state_var(name), led_brightness_var(name))
    }

    fn buzzer_vars(&self, name: &str) -> (String, String, String, String) {
        let pin = self
            .buzzer_pin
            .get(name)
            .cloned()
            .unwrap_or(Arg::Int(8))
            .to_string();
        (
            pin,
            buzzer_state_var(name),
            buzzer_current_var(name),
            buzzer_last_var(name),
        )
    }

    fn rgb_vars(&self, name: &str) -> ([String; 3], (String, String, String), String) {
        let pins = self
            .rgb_pins
            .get(name)
            .cloned()
            .unwrap_or([Arg::Int(0), Arg::Int(0), Arg::Int(0)]);
        (
            [pins[0].to_string(), pins[1].to_string(), pins[2].to_string()],
            rgb_color_vars(name),
            rgb_state_var(name),
        )
    }

    fn led_fade(
        &self,
        name: &str,
        step: &Arg,
        delay_ms: &Arg,
        indent: &str,
        fade_in: bool,
    ) -> Vec<String> {
        let (pin, state, brightness) = self.led_vars(name);
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!("{indent}  int __hb_step = {step};"));
        lines.push(format!("{indent}  if (__hb_step <= 0) {{ __hb_step = 1; }}"));
        lines.push(format!("{indent}  int __hb_value = {brightness};"));
        lines.push(format!("{indent}  if (__hb_value < 0) {{ __hb_value = 0; }}"));
        lines.push(format!(
            "{indent}  if (__hb_value > 255) {{ __hb_value = 255; }}"
        ));
        if fade_in {
            lines.push(format!("{indent}  while (__hb_value < 255) {{"));
        } else {
            lines.push(format!("{indent}  while (__hb_value > 0) {{"));
        }
        lines.push(format!("{indent}    {brightness} = __hb_value;"));
        lines.push(format!("{indent}    {state} = {brightness} > 0;"));
        lines.push(format!("{indent}    analogWrite({pin}, {brightness});"));
        lines.push(format!("{indent}    delay({delay_ms});"));
        if fade_in {
            lines.push(format!("{indent}    __hb_value += __hb_step;"));
            lines.push(format!(
                "{indent}    if (__hb_value > 255) {{ __hb_value = 255; }}"
            ));
        } else {
            lines.push(format!("{indent}    __hb_value -= __hb_step;"));
            lines.push(format!(
                "{indent}    if (__hb_value < 0) {{ __hb_value = 0; }}"
            ));
        }
        lines.push(format!("{indent}  }}"));
        if fade_in {
            lines.push(format!("{indent}  {brightness} = 255;"));
            lines.push(format!("{indent}  {state} = true;"));
            lines.push(format!("{indent}  analogWrite({pin}, 255);"));
        } else {
            lines.push(format!("{indent}  {brightness} = 0;"));
            lines.push(format!("{indent}  {state} = false;"));
            lines.push(format!("{indent}  analogWrite({pin}, 0);"));
        }
        lines.push(format!("{indent}}}"));
        lines
    }

    fn rgb_update(
        &self,
        name: &str,
        red_expr: &str,
        green_expr: &str,
        blue_expr: &str,
        indent: &str,
    ) -> Vec<String> {
        let (pins, (red, green, blue), state) = self.rgb_vars(name);
        let [red_pin, green_pin, blue_pin] = pins;
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!("{indent}  int __hb_red = {red_expr};"));
        lines.push(format!("{indent}  if (__hb_red < 0) {{ __hb_red = 0; }}"));
        lines.push(format!("{indent}  if (__hb_red > 255) {{ __hb_red = 255; }}"));
        lines.push(format!("{indent}  int __hb_green = {green_expr};"));
        lines.push(format!("{indent}  if (__hb_green < 0) {{ __hb_green = 0; }}"));
        lines.push(format!(
            "{indent}  if (__hb_green > 255) {{ __hb_green = 255; }}"
        ));
        lines.push(format!("{indent}  int __hb_blue = {blue_expr};"));
        lines.push(format!("{indent}  if (__hb_blue < 0) {{ __hb_blue = 0; }}"));
        lines.push(format!(
            "{indent}  if (__hb_blue > 255) {{ __hb_blue = 255; }}"
        ));
        lines.push(format!("{indent}  {red} = __hb_red;"));
        lines.push(format!("{indent}  {green} = __hb_green;"));
        lines.push(format!("{indent}  {blue} = __hb_blue;"));
        lines.push(format!(
            "{indent}  {state} = (({red} > 0) || ({green} > 0) || ({blue} > 0));"
        ));
        lines.push(format!("{indent}  analogWrite({red_pin}, {red});"));
        lines.push(format!("{indent}  analogWrite({green_pin}, {green});"));
        lines.push(format!("{indent}  analogWrite({blue_pin}, {blue});"));
        lines.push(format!("{indent}}}"));
        lines
    }

    #[allow(clippy::too_many_arguments)]
    fn rgb_fade(
        &self,
        name: &str,
        red_arg: &Arg,
        green_arg: &Arg,
        blue_arg: &Arg,
        duration_ms: &Arg,
        steps: &Arg,
        indent: &str,
    ) -> Vec<String> {
        let (pins, (red, green, blue), state) = self.rgb_vars(name);
        let [red_pin, green_pin, blue_pin] = pins;
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!("{indent}  long __hb_duration = {duration_ms};"));
        lines.push(format!(
            "{indent}  if (__hb_duration < 0L) {{ __hb_duration = 0L; }}"
        ));
        lines.push(format!("{indent}  int __hb_steps = {steps};"));
        lines.push(format!("{indent}  if (__hb_steps <= 0) {{ __hb_steps = 1; }}"));
        lines.push(format!("{indent}  int __hb_start_red = {red};"));
        lines.push(format!("{indent}  int __hb_start_green = {green};"));
        lines.push(format!("{indent}  int __hb_start_blue = {blue};"));
        for (var, arg) in [
            ("__hb_target_red", red_arg),
            ("__hb_target_green", green_arg),
            ("__hb_target_blue", blue_arg),
        ] {
            lines.push(format!("{indent}  int {var} = {arg};"));
            lines.push(format!("{indent}  if ({var} < 0) {{ {var} = 0; }}"));
            lines.push(format!("{indent}  if ({var} > 255) {{ {var} = 255; }}"));
        }
        lines.push(format!(
            "{indent}  bool __hb_same = (({red} == __hb_target_red) && ({green} == __hb_target_green) && ({blue} == __hb_target_blue));"
        ));
        lines.push(format!(
            "{indent}  if ((__hb_duration == 0L) || __hb_same) {{"
        ));
        lines.push(format!("{indent}    {red} = __hb_target_red;"));
        lines.push(format!("{indent}    {green} = __hb_target_green;"));
        lines.push(format!("{indent}    {blue} = __hb_target_blue;"));
        lines.push(format!(
            "{indent}    {state} = (({red} > 0) || ({green} > 0) || ({blue} > 0));"
        ));
        lines.push(format!("{indent}    analogWrite({red_pin}, {red});"));
        lines.push(format!("{indent}    analogWrite({green_pin}, {green});"));
        lines.push(format!("{indent}    analogWrite({blue_pin}, {blue});"));
        lines.push(format!("{indent}  }} else {{"));
        lines.push(format!(
            "{indent}    float __hb_step_delay = static_cast<float>(__hb_duration) / static_cast<float>(__hb_steps);"
        ));
        lines.push(format!(
            "{indent}    unsigned long __hb_delay_ms = (__hb_step_delay <= 0.0f) ? 0UL : static_cast<unsigned long>(__hb_step_delay + 0.5f);"
        ));
        lines.push(format!(
            "{indent}    for (int __hb_i = 1; __hb_i <= __hb_steps; ++__hb_i) {{"
        ));
        for (channel, target, start, var) in [
            ("red", "__hb_target_red", "__hb_start_red", "__hb_red"),
            (
                "green",
                "__hb_target_green",
                "__hb_start_green",
                "__hb_green",
            ),
            ("blue", "__hb_target_blue", "__hb_start_blue", "__hb_blue"),
        ] {
            lines.push(format!(
                "{indent}      long __hb_num_{channel} = static_cast<long>({target} - {start}) * __hb_i;"
            ));
            lines.push(format!(
                "{indent}      if (__hb_num_{channel} >= 0L) {{ __hb_num_{channel} += __hb_steps / 2; }}"
            ));
            lines.push(format!(
                "{indent}      else {{ __hb_num_{channel} -= __hb_steps / 2; }}"
            ));
            lines.push(format!(
                "{indent}      int {var} = {start} + static_cast<int>(__hb_num_{channel} / __hb_steps);"
            ));
        }
        lines.push(format!("{indent}      {red} = __hb_red;"));
        lines.push(format!("{indent}      {green} = __hb_green;"));
        lines.push(format!("{indent}      {blue} = __hb_blue;"));
        lines.push(format!(
            "{indent}      {state} = (({red} > 0) || ({green} > 0) || ({blue} > 0));"
        ));
        lines.push(format!("{indent}      analogWrite({red_pin}, {red});"));
        lines.push(format!("{indent}      analogWrite({green_pin}, {green});"));
        lines.push(format!("{indent}      analogWrite({blue_pin}, {blue});"));
        lines.push(format!(
            "{indent}      if ((__hb_i != __hb_steps) && (__hb_delay_ms > 0UL)) {{"
        ));
        lines.push(format!("{indent}        delay(__hb_delay_ms);"));
        lines.push(format!("{indent}      }}"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}}}"));
        lines
    }

    #[allow(clippy::too_many_arguments)]
    fn rgb_blink(
        &self,
        name: &str,
        red_arg: &Arg,
        green_arg: &Arg,
        blue_arg: &Arg,
        times: &Arg,
        delay_ms: &Arg,
        indent: &str,
    ) -> Vec<String> {
        let (pins, (red, green, blue), state) = self.rgb_vars(name);
        let [red_pin, green_pin, blue_pin] = pins;
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!("{indent}  int __hb_times = {times};"));
        lines.push(format!("{indent}  if (__hb_times < 0) {{ __hb_times = 0; }}"));
        lines.push(format!("{indent}  long __hb_delay = {delay_ms};"));
        lines.push(format!(
            "{indent}  if (__hb_delay < 0L) {{ __hb_delay = 0L; }}"
        ));
        lines.push(format!("{indent}  unsigned long __hb_delay_ms = 0UL;"));
        lines.push(format!("{indent}  if (__hb_delay > 0L) {{"));
        lines.push(format!(
            "{indent}    __hb_delay_ms = static_cast<unsigned long>(__hb_delay);"
        ));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}  int __hb_original_red = {red};"));
        lines.push(format!("{indent}  int __hb_original_green = {green};"));
        lines.push(format!("{indent}  int __hb_original_blue = {blue};"));
        lines.push(format!("{indent}  bool __hb_original_state = {state};"));
        for (var, arg) in [
            ("__hb_target_red", red_arg),
            ("__hb_target_green", green_arg),
            ("__hb_target_blue", blue_arg),
        ] {
            lines.push(format!("{indent}  int {var} = {arg};"));
            lines.push(format!("{indent}  if ({var} < 0) {{ {var} = 0; }}"));
            lines.push(format!("{indent}  if ({var} > 255) {{ {var} = 255; }}"));
        }
        lines.push(format!(
            "{indent}  for (int __hb_i = 0; __hb_i < __hb_times; ++__hb_i) {{"
        ));
        lines.push(format!("{indent}    {red} = __hb_target_red;"));
        lines.push(format!("{indent}    {green} = __hb_target_green;"));
        lines.push(format!("{indent}    {blue} = __hb_target_blue;"));
        lines.push(format!(
            "{indent}    {state} = (({red} > 0) || ({green} > 0) || ({blue} > 0));"
        ));
        lines.push(format!("{indent}    analogWrite({red_pin}, {red});"));
        lines.push(format!("{indent}    analogWrite({green_pin}, {green});"));
        lines.push(format!("{indent}    analogWrite({blue_pin}, {blue});"));
        lines.push(format!("{indent}    if (__hb_delay_ms > 0UL) {{"));
        lines.push(format!("{indent}      delay(__hb_delay_ms);"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}    {red} = 0;"));
        lines.push(format!("{indent}    {green} = 0;"));
        lines.push(format!("{indent}    {blue} = 0;"));
        lines.push(format!("{indent}    {state} = false;"));
        lines.push(format!("{indent}    analogWrite({red_pin}, 0);"));
        lines.push(format!("{indent}    analogWrite({green_pin}, 0);"));
        lines.push(format!("{indent}    analogWrite({blue_pin}, 0);"));
        lines.push(format!("{indent}    if (__hb_delay_ms > 0UL) {{"));
        lines.push(format!("{indent}      delay(__hb_delay_ms);"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}  {red} = __hb_original_red;"));
        lines.push(format!("{indent}  {green} = __hb_original_green;"));
        lines.push(format!("{indent}  {blue} = __hb_original_blue;"));
        lines.push(format!("{indent}  {state} = __hb_original_state;"));
        lines.push(format!("{indent}  analogWrite({red_pin}, {red});"));
        lines.push(format!("{indent}  analogWrite({green_pin}, {green});"));
        lines.push(format!("{indent}  analogWrite({blue_pin}, {blue});"));
        lines.push(format!("{indent}}}"));
        lines
    }

    fn buzzer_play_tone(
        &self,
        name: &str,
        frequency: &Arg,
        duration_ms: &Option<Arg>,
        indent: &str,
    ) -> Vec<String> {
        let (pin, state, current, last) = self.buzzer_vars(name);
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!(
            "{indent}  float __hb_freq = static_cast<float>({frequency});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_freq < 0.0f) {{ __hb_freq = 0.0f; }}"
        ));
        lines.push(format!("{indent}  if (__hb_freq <= 0.0f) {{"));
        lines.push(format!("{indent}    {state} = false;"));
        lines.push(format!("{indent}    {current} = 0.0f;"));
        lines.push(format!("{indent}    noTone({pin});"));
        lines.push(format!("{indent}  }} else {{"));
        lines.push(format!(
            "{indent}    unsigned int __hb_tone = static_cast<unsigned int>(__hb_freq + 0.5f);"
        ));
        lines.push(format!("{indent}    tone({pin}, __hb_tone);"));
        lines.push(format!("{indent}    {state} = true;"));
        lines.push(format!("{indent}    {current} = __hb_freq;"));
        lines.push(format!("{indent}    {last} = __hb_freq;"));
        lines.push(format!("{indent}  }}"));
        if let Some(duration) = duration_ms {
            lines.push(format!(
                "{indent}  unsigned long __hb_duration = static_cast<unsigned long>({duration});"
            ));
            lines.push(format!("{indent}  if (__hb_duration > 0UL) {{"));
            lines.push(format!("{indent}    delay(__hb_duration);"));
            lines.push(format!("{indent}  }}"));
            lines.push(format!("{indent}  if (__hb_freq > 0.0f) {{"));
            lines.push(format!("{indent}    noTone({pin});"));
            lines.push(format!("{indent}  }}"));
            lines.push(format!("{indent}  {state} = false;"));
            lines.push(format!("{indent}  {current} = 0.0f;"));
        }
        lines.push(format!("{indent}}}"));
        lines
    }

    fn buzzer_beep(
        &self,
        name: &str,
        frequency: &Option<Arg>,
        on_ms: &Arg,
        off_ms: &Arg,
        times: &Arg,
        indent: &str,
    ) -> Vec<String> {
        let (pin, state, current, last) = self.buzzer_vars(name);
        let mut lines = vec![format!("{indent}{{")];
        match frequency {
            Some(frequency) => lines.push(format!(
                "{indent}  float __hb_freq_target = static_cast<float>({frequency});"
            )),
            None => lines.push(format!("{indent}  float __hb_freq_target = {last};")),
        }
        lines.push(format!(
            "{indent}  if (__hb_freq_target < 0.0f) {{ __hb_freq_target = 0.0f; }}"
        ));
        lines.push(format!(
            "{indent}  unsigned long __hb_on_ms = static_cast<unsigned long>({on_ms});"
        ));
        lines.push(format!(
            "{indent}  unsigned long __hb_off_ms = static_cast<unsigned long>({off_ms});"
        ));
        lines.push(format!(
            "{indent}  int __hb_times = static_cast<int>({times});"
        ));
        lines.push(format!("{indent}  if (__hb_times < 0) {{ __hb_times = 0; }}"));
        lines.push(format!(
            "{indent}  for (int __hb_i = 0; __hb_i < __hb_times; ++__hb_i) {{"
        ));
        lines.push(format!("{indent}    if (__hb_freq_target > 0.0f) {{"));
        lines.push(format!(
            "{indent}      unsigned int __hb_tone = static_cast<unsigned int>(__hb_freq_target + 0.5f);"
        ));
        lines.push(format!("{indent}      tone({pin}, __hb_tone);"));
        lines.push(format!("{indent}      {state} = true;"));
        lines.push(format!("{indent}      {current} = __hb_freq_target;"));
        lines.push(format!("{indent}      {last} = __hb_freq_target;"));
        lines.push(format!("{indent}    }} else {{"));
        lines.push(format!("{indent}      noTone({pin});"));
        lines.push(format!("{indent}      {state} = false;"));
        lines.push(format!("{indent}      {current} = 0.0f;"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!(
            "{indent}    if (__hb_on_ms > 0UL) {{ delay(__hb_on_ms); }}"
        ));
        lines.push(format!("{indent}    noTone({pin});"));
        lines.push(format!("{indent}    {state} = false;"));
        lines.push(format!("{indent}    {current} = 0.0f;"));
        lines.push(format!(
            "{indent}    if ((__hb_i + 1) < __hb_times && __hb_off_ms > 0UL) {{"
        ));
        lines.push(format!("{indent}      delay(__hb_off_ms);"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}}}"));
        lines
    }

    fn buzzer_sweep(
        &self,
        name: &str,
        start_hz: &Arg,
        end_hz: &Arg,
        duration_ms: &Arg,
        steps: &Arg,
        indent: &str,
    ) -> Vec<String> {
        let (pin, state, current, last) = self.buzzer_vars(name);
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!(
            "{indent}  float __hb_start = static_cast<float>({start_hz});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_start < 0.0f) {{ __hb_start = 0.0f; }}"
        ));
        lines.push(format!(
            "{indent}  float __hb_end = static_cast<float>({end_hz});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_end < 0.0f) {{ __hb_end = 0.0f; }}"
        ));
        lines.push(format!(
            "{indent}  unsigned long __hb_total = static_cast<unsigned long>({duration_ms});"
        ));
        lines.push(format!(
            "{indent}  int __hb_steps = static_cast<int>({steps});"
        ));
        lines.push(format!("{indent}  if (__hb_steps < 1) {{ __hb_steps = 1; }}"));
        lines.push(format!(
            "{indent}  float __hb_step_delay = (__hb_steps > 0) ? (static_cast<float>(__hb_total) / static_cast<float>(__hb_steps)) : 0.0f;"
        ));
        lines.push(format!(
            "{indent}  for (int __hb_i = 0; __hb_i < __hb_steps; ++__hb_i) {{"
        ));
        lines.push(format!(
            "{indent}    float __hb_progress = (__hb_steps == 1) ? 1.0f : (static_cast<float>(__hb_i) / (static_cast<float>(__hb_steps) - 1.0f));"
        ));
        lines.push(format!(
            "{indent}    float __hb_freq = __hb_start + (__hb_end - __hb_start) * __hb_progress;"
        ));
        lines.push(format!(
            "{indent}    if (__hb_freq < 0.0f) {{ __hb_freq = 0.0f; }}"
        ));
        lines.push(format!("{indent}    if (__hb_freq > 0.0f) {{"));
        lines.push(format!(
            "{indent}      unsigned int __hb_tone = static_cast<unsigned int>(__hb_freq + 0.5f);"
        ));
        lines.push(format!("{indent}      tone({pin}, __hb_tone);"));
        lines.push(format!("{indent}      {state} = true;"));
        lines.push(format!("{indent}      {current} = __hb_freq;"));
        lines.push(format!("{indent}      {last} = __hb_freq;"));
        lines.push(format!("{indent}    }} else {{"));
        lines.push(format!("{indent}      noTone({pin});"));
        lines.push(format!("{indent}      {state} = false;"));
        lines.push(format!("{indent}      {current} = 0.0f;"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}    if (__hb_step_delay > 0.0f) {{"));
        lines.push(format!(
            "{indent}      delay(static_cast<unsigned long>(__hb_step_delay));"
        ));
        lines.push(format!("{indent}    }}"));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}  noTone({pin});"));
        lines.push(format!("{indent}  {state} = false;"));
        lines.push(format!("{indent}  {current} = 0.0f;"));
        lines.push(format!("{indent}}}"));
        lines
    }

    fn buzzer_melody(
        &self,
        name: &str,
        melody: &str,
        tempo: &Option<Arg>,
        indent: &str,
    ) -> Vec<String> {
        let (pin, state, current, last) = self.buzzer_vars(name);
        let cue = match MELODIES.get(melody) {
            Some(cue) => cue,
            None => return Vec::new(),
        };
        let tempo_expr = match tempo {
            Some(tempo) => format!("static_cast<float>({tempo})"),
            None => cpp_float(cue.tempo),
        };
        let guard_expr = cpp_float(cue.tempo);
        let freqs = cue
            .sequence
            .iter()
            .map(|(freq, _)| if *freq > 0.0 { cpp_float(*freq) } else { "0.0f".to_string() })
            .collect::<Vec<_>>()
            .join(", ");
        let beats = cue
            .sequence
            .iter()
            .map(|(_, beat)| cpp_float(*beat))
            .collect::<Vec<_>>()
            .join(", ");
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!("{indent}  float __hb_tempo = {tempo_expr};"));
        lines.push(format!(
            "{indent}  if (__hb_tempo <= 0.0f) {{ __hb_tempo = {guard_expr}; }}"
        ));
        lines.push(format!(
            "{indent}  float __hb_beat_ms = 60000.0f / __hb_tempo;"
        ));
        lines.push(format!("{indent}  const float __hb_freqs[] = {{{freqs}}};"));
        lines.push(format!("{indent}  const float __hb_beats[] = {{{beats}}};"));
        lines.push(format!(
            "{indent}  const size_t __hb_melody_len = sizeof(__hb_freqs) / sizeof(__hb_freqs[0]);"
        ));
        lines.push(format!(
            "{indent}  for (size_t __hb_i = 0; __hb_i < __hb_melody_len; ++__hb_i) {{"
        ));
        lines.push(format!("{indent}    float __hb_freq = __hb_freqs[__hb_i];"));
        lines.push(format!(
            "{indent}    float __hb_duration = __hb_beats[__hb_i] * __hb_beat_ms;"
        ));
        lines.push(format!("{indent}    if (__hb_freq <= 0.0f) {{"));
        lines.push(format!("{indent}      noTone({pin});"));
        lines.push(format!("{indent}      {state} = false;"));
        lines.push(format!("{indent}      {current} = 0.0f;"));
        lines.push(format!(
            "{indent}      if (__hb_duration > 0.0f) {{ delay(static_cast<unsigned long>(__hb_duration)); }}"
        ));
        lines.push(format!("{indent}      continue;"));
        lines.push(format!("{indent}    }}"));
        lines.push(format!(
            "{indent}    unsigned int __hb_tone = static_cast<unsigned int>(__hb_freq + 0.5f);"
        ));
        lines.push(format!("{indent}    tone({pin}, __hb_tone);"));
        lines.push(format!("{indent}    {state} = true;"));
        lines.push(format!("{indent}    {current} = __hb_freq;"));
        lines.push(format!("{indent}    {last} = __hb_freq;"));
        lines.push(format!(
            "{indent}    if (__hb_duration > 0.0f) {{ delay(static_cast<unsigned long>(__hb_duration)); }}"
        ));
        lines.push(format!("{indent}    noTone({pin});"));
        lines.push(format!("{indent}    {state} = false;"));
        lines.push(format!("{indent}    {current} = 0.0f;"));
        lines.push(format!("{indent}  }}"));
        lines.push(format!("{indent}}}"));
        lines
    }

    fn servo_write(&self, name: &str, angle: &Arg, indent: &str) -> Vec<String> {
        let object = servo_object_var(name);
        let min_angle = servo_var(name, "min_angle");
        let max_angle = servo_var(name, "max_angle");
        let min_pulse = servo_var(name, "min_pulse");
        let max_pulse = servo_var(name, "max_pulse");
        let angle_var = servo_var(name, "angle");
        let pulse_var = servo_var(name, "pulse");
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!(
            "{indent}  float __hb_angle = static_cast<float>({angle});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_angle < {min_angle}) {{ __hb_angle = {min_angle}; }}"
        ));
        lines.push(format!(
            "{indent}  if (__hb_angle > {max_angle}) {{ __hb_angle = {max_angle}; }}"
        ));
        lines.push(format!("{indent}  {angle_var} = __hb_angle;"));
        lines.push(format!(
            "{indent}  float __hb_span = {max_angle} - {min_angle};"
        ));
        lines.push(format!(
            "{indent}  if (__hb_span == 0.0f) {{ __hb_span = 1.0f; }}"
        ));
        lines.push(format!(
            "{indent}  float __hb_pulse = {min_pulse} + ((__hb_angle - {min_angle}) / __hb_span) * ({max_pulse} - {min_pulse});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_pulse < {min_pulse}) {{ __hb_pulse = {min_pulse}; }}"
        ));
        lines.push(format!(
            "{indent}  if (__hb_pulse > {max_pulse}) {{ __hb_pulse = {max_pulse}; }}"
        ));
        lines.push(format!("{indent}  {pulse_var} = __hb_pulse;"));
        lines.push(format!(
            "{indent}  {object}.write(static_cast<int>(__hb_angle + 0.5f));"
        ));
        lines.push(format!("{indent}}}"));
        lines
    }

    fn servo_write_us(&self, name: &str, pulse_us: &Arg, indent: &str) -> Vec<String> {
        let object = servo_object_var(name);
        let min_angle = servo_var(name, "min_angle");
        let max_angle = servo_var(name, "max_angle");
        let min_pulse = servo_var(name, "min_pulse");
        let max_pulse = servo_var(name, "max_pulse");
        let angle_var = servo_var(name, "angle");
        let pulse_var = servo_var(name, "pulse");
        let mut lines = vec![format!("{indent}{{")];
        lines.push(format!(
            "{indent}  float __hb_pulse = static_cast<float>({pulse_us});"
        ));
        lines.push(format!(
            "{indent}  if (__hb_pulse < {min_pulse}) {{ __hb_pulse = {min_pulse}; }}"
        ));
        lines.push(format!(
            "{indent}  if (__hb_pulse > {max_pulse}) {{ __hb_pulse = {max_pulse}; }}"
        ));
        lines.push(format!("{indent}  {pulse_var} = __hb_pulse;"));
        lines.push(format!(
            "{indent}  float __hb_span = {max_pulse} - {min_pulse};"
        ));
        lines.push(format!(
            "{indent}  if (__hb_span == 0.0f) {{ __hb_span = 1.0f; }}"
        ));
        lines.push(format!(
            "{indent}  float __hb_angle = {min_angle} + ((__hb_pulse - {min_pulse}) / __hb_span) * ({max_angle} - {min_angle});"
        ));
        lines.push(format!("{indent}  {angle_var} = __hb_angle;"));
        lines.push(format!(
            "{indent}  {object}.writeMicroseconds(static_cast<int>({pulse_var} + 0.5f));"
        ));
        lines.push(format!("{indent}}}"));
        lines
    }
}
