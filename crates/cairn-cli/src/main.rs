//! Cairn CLI - machine configuration templates with live node lookups

use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod error;
mod exit_codes;

use commands::template::TemplateArgs;

#[derive(Parser)]
#[command(name = "cairn")]
#[command(version)]
#[command(about = "Render machine configurations from Jinja2 templates and live node facts", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Target nodes
    #[arg(short = 'n', long, global = true, value_delimiter = ',')]
    nodes: Vec<String>,

    /// Endpoints to connect through
    #[arg(short = 'e', long, global = true, value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Node connection config (default: ~/.cairn/config)
    #[arg(long, global = true, env = "CAIRN_NODE_CONFIG")]
    node_config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render templates locally and print the result
    Template(TemplateArgs),

    /// Scaffold a new project from a preset
    Init {
        /// Preset to start from (generic, cozystack)
        preset: Option<String>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

/// Connection settings shared by every command
pub struct GlobalArgs {
    pub root: PathBuf,
    pub nodes: Vec<String>,
    pub endpoints: Vec<String>,
    pub node_config: Option<PathBuf>,
}

fn init_tracing(debug: bool) {
    let filter = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    init_tracing(cli.debug);

    let globals = GlobalArgs {
        root: cli.root,
        nodes: cli.nodes,
        endpoints: cli.endpoints,
        node_config: cli.node_config,
    };

    let result = match cli.command {
        Commands::Template(args) => {
            let sub = matches.subcommand_matches("template");
            commands::template::run(&globals, &args, sub)
        }
        Commands::Init { preset, force } => commands::init::run(&globals.root, preset.as_deref(), force),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
