use clap::{ArgAction, Parser, Subcommand, ValueHint};
use pkgpeek_package::PackageFormat;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the metadata of a package
    #[command(arg_required_else_help = true)]
    #[clap(name = "inspect", visible_alias = "i")]
    Inspect {
        /// Package file
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        path: String,

        /// Read the file as this format instead of detecting it
        #[arg(required = false, long, short)]
        format: Option<PackageFormat>,

        /// Write the package icon to this file
        #[arg(required = false, long, value_hint = ValueHint::FilePath)]
        icon: Option<String>,
    },

    /// List the members of an ar archive
    #[command(arg_required_else_help = true)]
    Ar {
        /// Archive file
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        path: String,
    },

    /// Work with Chromium resource packs
    #[command(arg_required_else_help = true)]
    Pak {
        #[clap(subcommand)]
        action: PakAction,
    },

    /// Work with Apple disk images
    #[command(arg_required_else_help = true)]
    Dmg {
        #[clap(subcommand)]
        action: DmgAction,
    },

    /// Print the configuration file to stdout
    Config,

    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,
}

#[derive(Subcommand)]
pub enum PakAction {
    /// List resources with their sizes and content types
    #[command(arg_required_else_help = true)]
    #[clap(name = "list", visible_alias = "ls")]
    List {
        /// Pak file
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        path: String,
    },

    /// Write every resource into a directory
    #[command(arg_required_else_help = true)]
    Extract {
        /// Pak file
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        path: String,

        /// Output directory
        #[arg(required = true, value_hint = ValueHint::DirPath)]
        dir: String,
    },
}

#[derive(Subcommand)]
pub enum DmgAction {
    /// List the files on the first HFS+ volume
    #[command(arg_required_else_help = true)]
    #[clap(name = "ls")]
    Ls {
        /// Disk image
        #[arg(required = true, value_hint = ValueHint::FilePath)]
        path: String,
    },
}
