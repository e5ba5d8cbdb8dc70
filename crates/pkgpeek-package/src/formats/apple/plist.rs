//! Property lists as a tagged value.
//!
//! Accessors return `Option`, so a key holding the wrong type reads the same as a missing
//! key.

use std::{collections::BTreeMap, io::Cursor, time::SystemTime};

use crate::error::Result;

pub type PlistDictionary = BTreeMap<String, PlistValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    String(String),
    Integer(i128),
    Real(f64),
    Boolean(bool),
    Data(Vec<u8>),
    Date(SystemTime),
    Array(Vec<PlistValue>),
    Dictionary(PlistDictionary),
}

impl PlistValue {
    /// Parses an XML or binary property list.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let value = plist::Value::from_reader(Cursor::new(data))?;
        Ok(Self::from_plist(value).unwrap_or(PlistValue::Dictionary(BTreeMap::new())))
    }

    /// Converts a `plist` value, dropping kinds without a counterpart here.
    fn from_plist(value: plist::Value) -> Option<Self> {
        Some(match value {
            plist::Value::String(s) => Self::String(s),
            plist::Value::Integer(i) => {
                Self::Integer(
                    i.as_signed()
                        .map(i128::from)
                        .or_else(|| i.as_unsigned().map(i128::from))?,
                )
            }
            plist::Value::Real(r) => Self::Real(r),
            plist::Value::Boolean(b) => Self::Boolean(b),
            plist::Value::Data(d) => Self::Data(d),
            plist::Value::Date(d) => Self::Date(d.into()),
            plist::Value::Uid(uid) => Self::Integer(uid.get().into()),
            plist::Value::Array(items) => {
                Self::Array(items.into_iter().filter_map(Self::from_plist).collect())
            }
            plist::Value::Dictionary(dict) => {
                Self::Dictionary(
                    dict.into_iter()
                        .filter_map(|(k, v)| Self::from_plist(v).map(|v| (k, v)))
                        .collect(),
                )
            }
            _ => return None,
        })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PlistValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&PlistDictionary> {
        match self {
            Self::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Looks `key` up when this is a dictionary.
    pub fn get(&self, key: &str) -> Option<&PlistValue> {
        self.as_dictionary()?.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    /// Renders scalars as text; containers and data have no text form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(r) => Some(r.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Joins the scalar items of an array with `separator`.
    pub fn join(&self, separator: &str) -> Option<String> {
        let items: Vec<String> = self.as_array()?.iter().filter_map(Self::to_text).collect();
        Some(items.join(separator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>CFBundleName</key><string>Demo</string>
  <key>CFBundleVersion</key><integer>42</integer>
  <key>CFBundleSupportedPlatforms</key><array><string>MacOSX</string><string>iPhoneOS</string></array>
  <key>Nested</key><dict><key>Flag</key><true/></dict>
</dict>
</plist>"#;

    #[test]
    fn test_parse_xml() {
        let value = PlistValue::from_bytes(XML.as_bytes()).unwrap();

        assert_eq!(value.get_str("CFBundleName"), Some("Demo"));
        assert_eq!(value.get("CFBundleVersion").and_then(PlistValue::as_integer), Some(42));
        assert_eq!(
            value.get("Nested").and_then(|n| n.get("Flag")),
            Some(&PlistValue::Boolean(true))
        );
    }

    #[test]
    fn test_wrong_type_reads_as_missing() {
        let value = PlistValue::from_bytes(XML.as_bytes()).unwrap();

        assert_eq!(value.get_str("CFBundleVersion"), None);
        assert_eq!(value.get_str("Missing"), None);
        assert!(value.get("CFBundleName").unwrap().as_array().is_none());
    }

    #[test]
    fn test_join() {
        let value = PlistValue::from_bytes(XML.as_bytes()).unwrap();
        assert_eq!(
            value.get("CFBundleSupportedPlatforms").and_then(|v| v.join(", ")),
            Some("MacOSX, iPhoneOS".to_string())
        );
        assert_eq!(value.get("CFBundleName").and_then(|v| v.join(", ")), None);
    }

    #[test]
    fn test_parse_binary() {
        let mut dict = plist::Dictionary::new();
        dict.insert("CFBundleIdentifier".into(), plist::Value::String("com.example".into()));
        let mut bytes = Vec::new();
        plist::Value::Dictionary(dict)
            .to_writer_binary(&mut bytes)
            .unwrap();

        let value = PlistValue::from_bytes(&bytes).unwrap();
        assert_eq!(value.get_str("CFBundleIdentifier"), Some("com.example"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(PlistValue::from_bytes(b"\x00\x01 not a plist").is_err());
    }
}
