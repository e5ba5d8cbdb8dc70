//! Metadata readers for application packages.
//!
//! Each reader turns a package file into a record of name, version, publisher and icon,
//! plus whatever the format carries beyond that.
//!
//! # Supported Formats
//!
//! - **deb**: `ar` archive with a compressed `control.tar*` member
//! - **appx / msix**: ZIP with `AppxManifest.xml`, and bundles of those
//! - **dmg**: UDIF or raw disk images holding an HFS+ volume with an `.app` bundle
//! - **ipa**: ZIP with `Payload/*.app/Info.plist`
//! - **pak**: Chromium resource packs
//!
//! # Example
//!
//! ```no_run
//! use pkgpeek_package::{read_package, PackageError, PackageFormat, ReadOptions};
//!
//! fn package_name(path: &str) -> Result<Option<String>, PackageError> {
//!     let format = PackageFormat::detect(path)?;
//!     let record = read_package(path, format, &ReadOptions::default())?;
//!     Ok(record.info().name().map(str::to_string))
//! }
//! ```

pub mod error;
pub mod formats;
pub mod options;
pub mod traits;

pub use error::{ErrorContext, PackageError, Result};
pub use formats::{
    appx::{AppxBundleReader, AppxInfo, AppxReader},
    ar::{ArEntry, ArReader},
    deb::{DebInfo, DebReader},
    dmg::{DmgInfo, DmgReader},
    get_file_type,
    ipa::{IpaInfo, IpaReader},
    pak::PakExtractor,
    read_package,
    sniff::guess_file_extension,
    PackageFormat, PackageRecord, ZIP_MAGIC_BYTES,
};
pub use options::ReadOptions;
pub use traits::PackageInfo;
