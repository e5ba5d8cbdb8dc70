//! Pieces shared by the Apple formats: property lists, icon families and `Info.plist` keys.

pub mod icns;
pub mod plist;

use serde::Serialize;

pub use icns::decode_icns;
pub use plist::{PlistDictionary, PlistValue};

/// The identity keys every application bundle's `Info.plist` carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleIdentity {
    pub display_name: Option<String>,
    /// `CFBundleName`. Using it as the name when `CFBundleDisplayName` is absent is an
    /// extension; without it such bundles have no name.
    pub bundle_name: Option<String>,
    pub short_version: Option<String>,
    pub version: Option<String>,
    pub identifier: Option<String>,
}

impl BundleIdentity {
    pub fn from_info_plist(info: &PlistValue) -> Self {
        let string = |key: &str| info.get_str(key).map(str::to_string);
        Self {
            display_name: string("CFBundleDisplayName"),
            bundle_name: string("CFBundleName"),
            short_version: string("CFBundleShortVersionString"),
            version: string("CFBundleVersion"),
            identifier: string("CFBundleIdentifier"),
        }
    }

    /// `CFBundleDisplayName`, or, as an extension, `CFBundleName` when the bundle has no
    /// display name.
    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.bundle_name.as_deref())
    }
}

/// Prefixes a version key with the platform name, e.g. `macOS 11.0`.
pub(crate) fn platform_version(info: &PlistValue, key: &str, platform: &str) -> Option<String> {
    info.get_str(key).map(|v| format!("{platform} {v}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_bundle_identity() {
        let mut dict = BTreeMap::new();
        dict.insert("CFBundleName".to_string(), PlistValue::String("Short".into()));
        dict.insert("CFBundleVersion".to_string(), PlistValue::Integer(7));
        dict.insert(
            "LSMinimumSystemVersion".to_string(),
            PlistValue::String("11.0".into()),
        );
        let info = PlistValue::Dictionary(dict);

        let identity = BundleIdentity::from_info_plist(&info);
        assert_eq!(identity.name(), Some("Short"));
        assert!(identity.version.is_none());
        assert_eq!(
            platform_version(&info, "LSMinimumSystemVersion", "macOS").as_deref(),
            Some("macOS 11.0")
        );
    }

    #[test]
    fn test_display_name_wins_over_bundle_name() {
        let mut dict = BTreeMap::new();
        dict.insert("CFBundleName".to_string(), PlistValue::String("Short".into()));
        dict.insert(
            "CFBundleDisplayName".to_string(),
            PlistValue::String("Shown Name".into()),
        );

        let identity = BundleIdentity::from_info_plist(&PlistValue::Dictionary(dict));
        assert_eq!(identity.name(), Some("Shown Name"));
        assert_eq!(identity.bundle_name.as_deref(), Some("Short"));
        assert_eq!(BundleIdentity::default().name(), None);
    }
}
