//! Knobs shared by every reader.

use pkgpeek_utils::system::host_architecture;

/// Default cap for a single in-memory read: 256 MiB.
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

/// Options accepted by the `*_with_options` constructors of the readers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Largest member, resource or file the readers will buffer in memory.
    pub max_entry_size: u64,

    /// Architecture used to choose a sub-package out of an app bundle. `None` means the
    /// architecture of the running process.
    pub architecture: Option<String>,

    /// Whether in-memory pak extraction appends a sniffed file extension to resource names.
    pub append_extension: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            architecture: None,
            append_extension: true,
        }
    }
}

impl ReadOptions {
    pub fn with_max_entry_size(mut self, max_entry_size: u64) -> Self {
        self.max_entry_size = max_entry_size;
        self
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    pub fn with_append_extension(mut self, append_extension: bool) -> Self {
        self.append_extension = append_extension;
        self
    }

    /// The architecture bundle selection matches against.
    pub fn target_architecture(&self) -> &str {
        self.architecture.as_deref().unwrap_or(host_architecture())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReadOptions::default();
        assert_eq!(options.max_entry_size, 256 * 1024 * 1024);
        assert!(options.append_extension);
        assert_eq!(options.target_architecture(), host_architecture());
    }

    #[test]
    fn test_architecture_override() {
        let options = ReadOptions::default().with_architecture("arm64");
        assert_eq!(options.target_architecture(), "arm64");
    }
}
