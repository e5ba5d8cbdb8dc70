/// Maps an architecture name to the spelling used by Windows app packages.
///
/// Accepts both package-manifest names (`x64`, `arm64`) and toolchain names (`x86_64`,
/// `aarch64`, `i686`). Returns `None` for anything else.
pub fn normalize_architecture(name: &str) -> Option<&'static str> {
    match name.trim().to_ascii_lowercase().as_str() {
        "x64" | "x86_64" | "amd64" => Some("x64"),
        "x86" | "i386" | "i586" | "i686" => Some("x86"),
        "arm64" | "aarch64" => Some("arm64"),
        "arm" | "armv7" => Some("arm"),
        _ => None,
    }
}

/// Returns the architecture of the running process in app package spelling.
pub fn host_architecture() -> &'static str {
    normalize_architecture(std::env::consts::ARCH).unwrap_or("x64")
}
