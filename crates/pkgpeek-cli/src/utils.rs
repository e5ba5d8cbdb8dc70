use std::{
    fmt::Display,
    sync::{LazyLock, PoisonError, RwLock},
};

use nu_ansi_term::Color;
use pkgpeek_config::{config::get_config, display::DisplaySettings};
use pkgpeek_package::ReadOptions;
use serde::Serialize;

use crate::error::CliResult;

pub struct Icons;

impl Icons {
    pub const ARROW: &str = "→";
    pub const DESCRIPTION: &str = "📝";
    pub const FILE: &str = "📄";
    pub const FOLDER: &str = "📁";
    pub const MAINTAINER: &str = "👤";
    pub const PACKAGE: &str = "📦";
    pub const SIZE: &str = "💾";
    pub const TYPE: &str = "🏷";
    pub const VERSION: &str = "🏁";
}

pub fn icon_or<'a>(icon: &'a str, fallback: &'a str) -> &'a str {
    if display_settings().icons() {
        icon
    } else {
        fallback
    }
}

pub fn display_settings() -> DisplaySettings {
    get_config().display()
}

pub fn term_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(80)
}

pub static COLOR: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(true));
pub static JSON: LazyLock<RwLock<bool>> = LazyLock::new(|| RwLock::new(false));

pub fn json_output() -> bool {
    *JSON.read().unwrap_or_else(PoisonError::into_inner)
}

pub struct Colored<T: Display>(pub Color, pub T);

impl<T: Display> Display for Colored<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let color = COLOR.read().unwrap_or_else(PoisonError::into_inner);
        if *color {
            write!(f, "{}", self.0.prefix())?;
            self.1.fmt(f)?;
            write!(f, "{}", self.0.suffix())
        } else {
            self.1.fmt(f)
        }
    }
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Reader options from the loaded configuration.
pub fn read_options() -> CliResult<ReadOptions> {
    let config = get_config();
    let mut options = ReadOptions::default()
        .with_max_entry_size(config.max_entry_size()?)
        .with_append_extension(config.append_extension());
    if let Some(arch) = config.architecture()? {
        options = options.with_architecture(arch);
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use nu_ansi_term::Color::Red;

    use super::*;

    #[test]
    fn test_colored_respects_switch() {
        *COLOR.write().unwrap() = false;
        assert_eq!(Colored(Red, "plain").to_string(), "plain");
        *COLOR.write().unwrap() = true;
        assert!(Colored(Red, "red").to_string().contains("red"));
    }
}
