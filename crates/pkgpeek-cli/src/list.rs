use std::path::Path;

use nu_ansi_term::Color::{Blue, Cyan, Green, Yellow};
use pkgpeek_package::{
    formats::pak::resource_name, guess_file_extension, ArReader, DmgReader, PakExtractor,
};
use pkgpeek_utils::bytes::format_bytes;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{peaker::PriorityMax, themes::BorderCorrection, Panel, Style, Width},
};
use tracing::info;

use crate::{
    error::CliResult,
    utils::{icon_or, json_output, print_json, read_options, term_width, Colored, Icons},
};

#[derive(Debug, Serialize)]
struct MemberRow {
    name: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct ResourceRow {
    id: u16,
    file_name: String,
    size: u64,
    extension: &'static str,
}

#[derive(Debug, Serialize)]
struct FileRow {
    path: String,
    is_dir: bool,
    size: u64,
}

fn print_table(builder: Builder, title: &str) {
    let table = builder
        .build()
        .with(Panel::header(title))
        .with(Style::rounded())
        .with(BorderCorrection {})
        .with(Width::wrap(term_width()).priority(PriorityMax::default()))
        .to_string();
    info!("\n{table}");
}

pub fn list_ar_members(path: &str) -> CliResult<()> {
    let entries = ArReader::read_with_options(path, &read_options()?)?;
    let rows: Vec<MemberRow> = entries
        .iter()
        .map(|entry| {
            MemberRow {
                name: entry.name.clone(),
                size: entry.size,
            }
        })
        .collect();

    if json_output() {
        return print_json(&rows);
    }

    let mut builder = Builder::new();
    builder.push_record(["Member".to_string(), "Size".to_string()]);
    for row in &rows {
        builder.push_record([
            Colored(Blue, &row.name).to_string(),
            format_bytes(row.size, 2),
        ]);
    }
    print_table(builder, path);
    info!("{} members", Colored(Cyan, rows.len()));
    Ok(())
}

pub fn list_pak_resources(path: &str) -> CliResult<()> {
    let mut pak = PakExtractor::open_with_options(path, &read_options()?)?;
    let header = *pak.header();

    let mut rows = Vec::with_capacity(pak.len());
    let mut buf = Vec::new();
    for index in 0..pak.len() {
        pak.read_resource_into(index, &mut buf)?;
        let id = pak.entries()[index].id;
        rows.push(ResourceRow {
            id,
            file_name: resource_name(id),
            size: buf.len() as u64,
            extension: guess_file_extension(&buf),
        });
    }

    if json_output() {
        return print_json(&rows);
    }

    let mut builder = Builder::new();
    builder.push_record(["Id", "File", "Size", "Type"].map(String::from));
    for row in &rows {
        builder.push_record([
            row.id.to_string(),
            Colored(Blue, &row.file_name).to_string(),
            format_bytes(row.size, 2),
            Colored(Green, row.extension.trim_start_matches('.')).to_string(),
        ]);
    }
    print_table(builder, path);
    info!(
        "pak v{} ({:?}): {} resources, {} aliases",
        header.version,
        header.encoding,
        Colored(Cyan, rows.len()),
        Colored(Cyan, pak.aliases().len())
    );
    Ok(())
}

pub fn extract_pak(path: &str, dir: &str) -> CliResult<()> {
    let mut pak = PakExtractor::open_with_options(path, &read_options()?)?;
    let written = pak.extract_to_directory(dir)?;
    info!(
        "Extracted {} resources to {}",
        Colored(Cyan, written.len()),
        Colored(Yellow, Path::new(dir).display())
    );
    Ok(())
}

pub fn list_dmg_files(path: &str) -> CliResult<()> {
    let reader = DmgReader::open_with_options(path, &read_options()?)?;
    let rows: Vec<FileRow> = reader
        .entries()
        .iter()
        .map(|(path, entry)| {
            FileRow {
                path: path.clone(),
                is_dir: entry.is_dir,
                size: entry.size(),
            }
        })
        .collect();

    if json_output() {
        return print_json(&rows);
    }

    for row in &rows {
        if row.is_dir {
            info!(
                "{} {}/",
                icon_or(Icons::FOLDER, "d"),
                Colored(Blue, &row.path)
            );
        } else {
            info!(
                "{} {} {}",
                icon_or(Icons::FILE, "-"),
                row.path,
                Colored(Yellow, format_bytes(row.size, 2))
            );
        }
    }

    let label = reader.info().volume_label.as_deref().unwrap_or("untitled");
    info!(
        "{} {}: {} entries",
        icon_or(Icons::ARROW, "->"),
        Colored(Cyan, label),
        rows.len()
    );
    Ok(())
}
