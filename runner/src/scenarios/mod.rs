//! Built-in scenarios.
//!
//! Each one is plain [`Scenario`] data; nothing here is special-cased by the
//! runner. Labels that differ between app versions are scenario variables and
//! can be overridden from the command line (`--var open_menu_label=...`).

mod menu;
mod zoom;

pub use menu::menu_a11y;
pub use zoom::zoom_controls;

use crate::protocol::Scenario;

pub const BUILTIN_NAMES: &[&str] = &["menu_a11y", "zoom_controls"];

pub fn builtin(name: &str) -> Option<Scenario> {
    match name {
        "menu_a11y" => Some(menu_a11y()),
        "zoom_controls" => Some(zoom_controls()),
        _ => None,
    }
}

pub fn all() -> Vec<Scenario> {
    BUILTIN_NAMES.iter().filter_map(|name| builtin(name)).collect()
}
