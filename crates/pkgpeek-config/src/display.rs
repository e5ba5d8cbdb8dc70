use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

/// Display settings for CLI output formatting
#[derive(Clone, Debug, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct DisplaySettings {
    /// Show unicode icons/symbols in output
    /// Default: true
    pub icons: Option<bool>,

    /// Colorize field labels and log levels
    /// Default: true
    pub colors: Option<bool>,
}

impl DisplaySettings {
    pub fn icons(&self) -> bool {
        self.icons.unwrap_or(true)
    }

    pub fn colors(&self) -> bool {
        self.colors.unwrap_or(true)
    }
}
