//! Traits for package metadata.

/// A metadata record that can be rendered without knowing its format.
///
/// Every accessor returns `None` when the package did not declare the value; a record with
/// nothing set is still a valid result.
pub trait PackageInfo {
    /// Short format label, e.g. `"deb"`.
    fn kind(&self) -> &'static str;

    /// Human readable product name.
    fn name(&self) -> Option<&str>;

    /// Version string as declared by the package.
    fn version(&self) -> Option<&str>;

    /// Publisher or maintainer.
    fn publisher(&self) -> Option<&str>;

    /// Raw icon bytes, in whatever format the package ships them.
    fn icon(&self) -> Option<&[u8]> {
        None
    }
}
