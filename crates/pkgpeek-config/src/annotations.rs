use std::any::type_name;

use documented::{Documented, DocumentedFields};
use toml_edit::{Decor, Item, RawString, Table};
use tracing::warn;

use crate::error::{ConfigError, Result};

/// Turns every line of `docs` into a `#` comment placed in front of the decorated item.
///
/// Existing comments in the prefix are kept; a bare `#` line separates them from the new block.
pub fn append_docs_as_toml_comments(decor: &mut Decor, docs: &str) {
    let comments: String = docs
        .lines()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect();

    let existing = decor
        .prefix()
        .and_then(RawString::as_str)
        .unwrap_or_default();

    let prefix = if existing.is_empty() || existing.ends_with("\n\n") || existing == "\n" {
        format!("{existing}{comments}")
    } else if existing.ends_with('\n') {
        format!("{existing}#\n{comments}")
    } else {
        format!("{existing}\n{comments}")
    };

    decor.set_prefix(prefix);
}

/// Adds field documentation of `T` as comments above each key of `table`.
///
/// When `with_container_docs` is set the struct-level docs of `T` are written above the table
/// header as well.
pub fn annotate_toml_table<T>(table: &mut Table, with_container_docs: bool) -> Result<()>
where
    T: Documented + DocumentedFields,
{
    if with_container_docs {
        append_docs_as_toml_comments(table.decor_mut(), T::DOCS);
    }

    for (mut key, item) in table.iter_mut() {
        let name = key.get().to_string();
        let Ok(docs) = T::get_field_docs(&name) else {
            warn!(
                field = %name,
                container = type_name::<T>(),
                "no documentation found for configuration field"
            );
            continue;
        };

        match item {
            Item::None => return Err(ConfigError::UnexpectedTomlItem(name)),
            Item::Value(_) => append_docs_as_toml_comments(key.leaf_decor_mut(), docs),
            Item::Table(sub_table) => append_docs_as_toml_comments(sub_table.decor_mut(), docs),
            Item::ArrayOfTables(array) => {
                if let Some(first) = array.iter_mut().next() {
                    append_docs_as_toml_comments(first.decor_mut(), docs);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use toml_edit::Decor;

    use super::*;
    use crate::config::Config;

    #[test]
    fn test_append_docs_as_toml_comments() {
        let mut decor = Decor::new("", "");
        append_docs_as_toml_comments(&mut decor, "Line 1\n\nLine 2");

        let prefix = decor.prefix().and_then(|p| p.as_str()).unwrap();
        assert_eq!(prefix, "# Line 1\n#\n# Line 2\n");
    }

    #[test]
    fn test_append_docs_keeps_existing_prefix() {
        let mut decor = Decor::new("# existing\n", "");
        append_docs_as_toml_comments(&mut decor, "Added");

        let prefix = decor.prefix().and_then(|p| p.as_str()).unwrap();
        assert_eq!(prefix, "# existing\n#\n# Added\n");
    }

    #[test]
    fn test_annotated_default_config() {
        let doc = Config::default_config().to_annotated_document().unwrap();
        let rendered = doc.to_string();

        assert!(rendered.contains("[pak]"));
        assert!(rendered.contains("# Suffix a sniffed file extension"));
        assert!(rendered.contains("max_entry_size"));
    }
}
