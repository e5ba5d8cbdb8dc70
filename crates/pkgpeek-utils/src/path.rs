use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Expands `~`, `$VAR` and `${VAR}` in a path and makes it absolute against the current
/// working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is blank
/// * [`PathError::MissingEnvVar`] if a referenced variable is not set
/// * [`PathError::UnclosedVariable`] for a `${` without a matching `}`
/// * [`PathError::CurrentDir`] if a relative path cannot be anchored
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let expanded = PathBuf::from(expand_variables(path)?);
    if expanded.is_absolute() {
        return Ok(expanded);
    }

    env::current_dir()
        .map(|cwd| cwd.join(expanded))
        .map_err(|err| PathError::CurrentDir { source: err })
}

/// Returns `$HOME`, falling back to the current directory when it is unset.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::current_dir().ok())
        .unwrap_or_default()
}

/// Returns `$XDG_CONFIG_HOME`, or `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;

    if let Some(stripped) = rest.strip_prefix('~') {
        if stripped.is_empty() || stripped.starts_with('/') {
            result.push_str(&home_dir().to_string_lossy());
            rest = stripped;
        }
    }

    while let Some(idx) = rest.find('$') {
        result.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];

        let (name, remainder) = if let Some(braced) = after.strip_prefix('{') {
            let end = braced.find('}').ok_or_else(|| {
                PathError::UnclosedVariable {
                    input: rest[idx..].to_string(),
                }
            })?;
            (&braced[..end], &braced[end + 1..])
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if name.is_empty() {
            result.push('$');
        } else {
            let value = env::var(name).map_err(|_| {
                PathError::MissingEnvVar {
                    var: name.to_string(),
                    input: path.to_string(),
                }
            })?;
            result.push_str(&value);
        }
        rest = remainder;
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_resolve_path_expands_variables() {
        env::set_var("PKGPEEK_TEST_DIR", "/opt/peek");
        assert_eq!(
            resolve_path("$PKGPEEK_TEST_DIR/config.toml").unwrap(),
            PathBuf::from("/opt/peek/config.toml")
        );
        assert_eq!(
            resolve_path("${PKGPEEK_TEST_DIR}/x").unwrap(),
            PathBuf::from("/opt/peek/x")
        );
        env::remove_var("PKGPEEK_TEST_DIR");
    }

    #[test]
    #[serial]
    fn test_resolve_path_tilde() {
        env::set_var("HOME", "/home/peek");
        assert_eq!(
            resolve_path("~/cfg").unwrap(),
            PathBuf::from("/home/peek/cfg")
        );
    }

    #[test]
    #[serial]
    fn test_resolve_path_errors() {
        assert!(matches!(resolve_path("   "), Err(PathError::Empty)));
        assert!(matches!(
            resolve_path("${UNCLOSED"),
            Err(PathError::UnclosedVariable { .. })
        ));
        env::remove_var("PKGPEEK_SURELY_MISSING");
        assert!(matches!(
            resolve_path("$PKGPEEK_SURELY_MISSING/x"),
            Err(PathError::MissingEnvVar { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_relative_path_is_absolute() {
        let resolved = resolve_path("some/file").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("some/file"));
    }

    #[test]
    #[serial]
    fn test_xdg_config_home() {
        env::set_var("XDG_CONFIG_HOME", "/xdg/config");
        assert_eq!(xdg_config_home(), PathBuf::from("/xdg/config"));
        env::remove_var("XDG_CONFIG_HOME");
        env::set_var("HOME", "/home/peek");
        assert_eq!(xdg_config_home(), PathBuf::from("/home/peek/.config"));
    }
}
