//! Picks the best scaled variant of a declared logo.

use regex::Regex;
use tracing::trace;

/// Splits `Assets/Logo.png` into `("Assets/Logo", ".png")`.
fn split_extension(path: &str) -> (&str, &str) {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => path.split_at(file_start + dot),
        _ => (path, ""),
    }
}

/// Finds the member that best represents `logo_path`.
///
/// `names` pairs each stored member name with its percent-decoded form; matching runs on
/// the decoded form and the stored name is returned. Candidates are `{base}{ext}` and
/// `{base}.scale-{N}{ext}`. The unscaled file counts as scale 0, and a later candidate only
/// replaces the current pick when its scale is strictly greater.
pub fn select_logo_entry<'a, I>(logo_path: &str, names: I) -> Option<(&'a str, u32)>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let (base, ext) = split_extension(logo_path);
    let pattern = format!(
        r"(?i)^{}(\.scale-(\d+))?{}$",
        regex::escape(base),
        regex::escape(ext)
    );
    let re = Regex::new(&pattern).ok()?;

    let mut best: Option<(&'a str, u32)> = None;
    for (stored, decoded) in names {
        let Some(caps) = re.captures(decoded) else {
            continue;
        };
        let scale = caps
            .get(2)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);

        match best {
            Some((_, current)) if scale <= current => {}
            _ => {
                trace!(entry = stored, scale, "logo candidate");
                best = Some((stored, scale));
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select<'a>(logo: &str, names: &'a [(&'a str, &'a str)]) -> Option<(&'a str, u32)> {
        select_logo_entry(logo, names.iter().copied())
    }

    #[test]
    fn test_highest_scale_wins() {
        let names = [
            ("logo.png", "logo.png"),
            ("logo.scale-100.png", "logo.scale-100.png"),
            ("logo.scale-200.png", "logo.scale-200.png"),
        ];
        assert_eq!(select("logo.png", &names), Some(("logo.scale-200.png", 200)));
    }

    #[test]
    fn test_order_does_not_matter_for_distinct_scales() {
        let names = [
            ("Assets/Logo.scale-400.png", "Assets/Logo.scale-400.png"),
            ("Assets/Logo.scale-100.png", "Assets/Logo.scale-100.png"),
        ];
        assert_eq!(
            select("Assets/Logo.png", &names),
            Some(("Assets/Logo.scale-400.png", 400))
        );
    }

    #[test]
    fn test_unscaled_is_fallback() {
        let names = [("Assets/Logo.png", "Assets/Logo.png"), ("Other.png", "Other.png")];
        assert_eq!(select("Assets/Logo.png", &names), Some(("Assets/Logo.png", 0)));
    }

    #[test]
    fn test_equal_scale_keeps_first() {
        let names = [
            ("A/logo.scale-100.png", "A/logo.scale-100.png"),
            ("a/LOGO.scale-100.png", "a/LOGO.scale-100.png"),
        ];
        assert_eq!(
            select("A/logo.png", &names),
            Some(("A/logo.scale-100.png", 100))
        );
    }

    #[test]
    fn test_matches_decoded_names_and_escapes_base() {
        let names = [
            ("Assets/Store%20Logo.scale-150.png", "Assets/Store Logo.scale-150.png"),
            ("Assets/StoreXLogo.png", "Assets/StoreXLogo.png"),
        ];
        assert_eq!(
            select("Assets/Store Logo.png", &names),
            Some(("Assets/Store%20Logo.scale-150.png", 150))
        );

        let dotted = [("Assets/aXb.png", "Assets/aXb.png")];
        assert_eq!(select("Assets/a.b.png", &dotted), None);
    }

    #[test]
    fn test_other_qualifiers_do_not_match() {
        let names = [(
            "Assets/Logo.targetsize-48.png",
            "Assets/Logo.targetsize-48.png",
        )];
        assert_eq!(select("Assets/Logo.png", &names), None);
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("Assets/Logo.png"), ("Assets/Logo", ".png"));
        assert_eq!(split_extension("dir.v2/Logo"), ("dir.v2/Logo", ""));
    }
}
