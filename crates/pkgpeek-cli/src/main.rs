use std::{fs, io::ErrorKind, sync::PoisonError};

use clap::Parser;
use cli::{Args, Commands, DmgAction, PakAction};
use error::{CliError, CliResult};
use inspect::inspect_package;
use list::{extract_pak, list_ar_members, list_dmg_files, list_pak_resources};
use logging::setup_logging;
use pkgpeek_config::config::{
    self, config_path, generate_default_config, set_config_path, Config,
};
use tracing::{info, warn};
use utils::{COLOR, JSON};

mod cli;
mod error;
mod inspect;
mod list;
mod logging;
mod utils;

fn print_config() -> CliResult<()> {
    let path = config_path();
    let content = match fs::read_to_string(&path) {
        Ok(v) => v,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("Config file {} not found", path.display());
            toml::to_string_pretty(&Config::default_config())?
        }
        Err(err) => {
            return Err(CliError::IoError {
                action: "reading config".to_string(),
                source: err,
            });
        }
    };
    info!("{}", content);
    Ok(())
}

fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        *COLOR.write().unwrap_or_else(PoisonError::into_inner) = false;
    }
    if args.json {
        *JSON.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    if let Some(ref c) = args.config {
        set_config_path(c)?;
    }

    match args.command {
        Commands::DefConfig => {
            generate_default_config()?;
        }
        command => {
            config::init()?;

            if !config::get_config().display().colors() {
                *COLOR.write().unwrap_or_else(PoisonError::into_inner) = false;
            }

            match command {
                Commands::Inspect {
                    path,
                    format,
                    icon,
                } => inspect_package(&path, format, icon.as_deref())?,
                Commands::Ar {
                    path,
                } => list_ar_members(&path)?,
                Commands::Pak {
                    action,
                } => {
                    match action {
                        PakAction::List {
                            path,
                        } => list_pak_resources(&path)?,
                        PakAction::Extract {
                            path,
                            dir,
                        } => extract_pak(&path, &dir)?,
                    }
                }
                Commands::Dmg {
                    action: DmgAction::Ls {
                        path,
                    },
                } => list_dmg_files(&path)?,
                Commands::Config => print_config()?,
                Commands::DefConfig => unreachable!(),
            }
        }
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
