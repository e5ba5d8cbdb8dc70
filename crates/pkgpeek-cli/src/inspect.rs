use std::path::Path;

use image::ImageFormat;
use nu_ansi_term::Color::{Blue, Cyan, Green, Yellow};
use pkgpeek_package::{read_package, PackageFormat, PackageRecord};
use pkgpeek_utils::{bytes::format_bytes, fs::write_file};
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::{debug, info, warn};

use crate::{
    error::{CliError, CliResult},
    utils::{icon_or, json_output, print_json, read_options, term_width, Colored, Icons},
};

/// Label/value rows shown for a record, after the common ones.
fn detail_rows(record: &PackageRecord) -> Vec<(&'static str, Option<String>)> {
    match record {
        PackageRecord::Appx(info) => {
            vec![
                ("Identity", info.name.clone()),
                ("Publisher Name", info.publisher_display_name.clone()),
                ("Description", info.description.clone()),
                ("Logo", info.logo_path.clone()),
                (
                    "Capabilities",
                    (!info.capabilities.is_empty()).then(|| info.capabilities.join(", ")),
                ),
            ]
        }
        PackageRecord::Deb(info) => {
            vec![
                ("Architecture", info.architecture.clone()),
                ("Uploaders", info.uploaders.clone()),
                ("Description", info.description.clone()),
            ]
        }
        PackageRecord::Dmg(info) => {
            vec![
                ("Identifier", info.identifier.clone()),
                ("Build", info.version.clone()),
                ("Minimum OS", info.minimum_os_version.clone()),
                ("Platform", info.platform_version.clone()),
                ("Supported", info.supported_platforms.clone()),
                ("Volume", info.volume_label.clone()),
                ("Contents", info.contents_entry.clone()),
                ("Icon", info.icon_entry.clone()),
            ]
        }
        PackageRecord::Ipa(info) => {
            vec![
                ("Identifier", info.identifier.clone()),
                ("Build", info.version.clone()),
                ("Minimum OS", info.minimum_os_version.clone()),
                ("Platform", info.platform_version.clone()),
                (
                    "Devices",
                    (!info.device_family.is_empty()).then(|| info.device_family.join(", ")),
                ),
                ("Icon", info.icon_entry.clone()),
            ]
        }
    }
}

fn display_record(path: &Path, record: &PackageRecord) {
    let info = record.info();
    let mut builder = Builder::new();

    let mut push = |icon: &str, label: &str, value: String| {
        builder.push_record([format!("{} {label}", icon_or(icon, "-")), value]);
    };

    push(
        Icons::PACKAGE,
        "Name",
        Colored(Blue, info.name().unwrap_or("-")).to_string(),
    );
    push(
        Icons::VERSION,
        "Version",
        Colored(Green, info.version().unwrap_or("-")).to_string(),
    );
    if let Some(publisher) = info.publisher() {
        push(Icons::MAINTAINER, "Publisher", Colored(Cyan, publisher).to_string());
    }
    push(Icons::TYPE, "Format", info.kind().to_string());
    if let Some(icon) = info.icon() {
        push(Icons::SIZE, "Icon Size", format_bytes(icon.len() as u64, 2));
    }
    for (label, value) in detail_rows(record) {
        if let Some(value) = value {
            push(Icons::DESCRIPTION, label, value);
        }
    }

    let table = builder
        .build()
        .with(Panel::header(path.display().to_string()))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string();

    info!("\n{table}");
}

fn write_icon(record: &PackageRecord, out: &Path) -> CliResult<()> {
    if let PackageRecord::Dmg(info) = record {
        if let Some(logo) = info.logo() {
            logo.save_with_format(out, ImageFormat::Png)?;
            info!("Wrote decoded icon to {}", Colored(Yellow, out.display()));
            return Ok(());
        }
    }

    match record.info().icon() {
        Some(icon) => {
            write_file(out, icon)?;
            info!("Wrote icon to {}", Colored(Yellow, out.display()));
        }
        None => warn!("{} has no icon", record.info().kind()),
    }
    Ok(())
}

pub fn inspect_package(
    path: &str,
    format: Option<PackageFormat>,
    icon: Option<&str>,
) -> CliResult<()> {
    let path = Path::new(path);
    let format = match format {
        Some(format) => format,
        None => PackageFormat::detect(path)?,
    };
    debug!(path = %path.display(), %format, "inspecting package");

    if format == PackageFormat::Unknown {
        return Err(CliError::Custom(format!(
            "Could not detect the package format of {}; pass --format",
            path.display()
        )));
    }
    if format == PackageFormat::Pak {
        return Err(CliError::Custom(format!(
            "{} is a resource pack; use `pkgpeek pak list` instead",
            path.display()
        )));
    }

    let record = read_package(path, format, &read_options()?)?;

    if json_output() {
        print_json(&record)?;
    } else {
        display_record(path, &record);
    }

    if let Some(out) = icon {
        write_icon(&record, Path::new(out))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use pkgpeek_package::{AppxInfo, DebInfo};

    use super::*;

    #[test]
    fn test_detail_rows_skip_empty_lists() {
        let record = PackageRecord::Appx(AppxInfo::default());
        let rows = detail_rows(&record);
        assert!(rows.iter().all(|(_, value)| value.is_none()));

        let record = PackageRecord::Deb(DebInfo {
            architecture: Some("amd64".into()),
            ..Default::default()
        });
        let rows = detail_rows(&record);
        assert_eq!(rows[0], ("Architecture", Some("amd64".to_string())));
    }

    #[test]
    fn test_write_icon_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("icon.png");
        let record = PackageRecord::Appx(AppxInfo {
            logo: Some(b"png bytes".to_vec()),
            ..Default::default()
        });

        write_icon(&record, &out).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"png bytes");
    }
}
