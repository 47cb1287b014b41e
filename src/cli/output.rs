//! Global output flags, exported as environment variables by `main` so every
//! module can check them without threading a config handle around.

use serde_json::Value;

fn flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

pub fn is_json() -> bool {
    flag("HARVEST_JSON")
}

pub fn is_quiet() -> bool {
    flag("HARVEST_QUIET")
}

pub fn is_verbose() -> bool {
    flag("HARVEST_VERBOSE")
}

pub fn is_no_color() -> bool {
    flag("HARVEST_NO_COLOR")
}

/// Print a machine-readable JSON value to stdout.
pub fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
