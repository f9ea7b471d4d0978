use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{
    self, key::KeyCommand, layout::LayoutArgs, schema::SchemaArgs, submit::SubmitArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "submission-tool",
    about = "Inspect form layouts, submission keys and in-memory submissions",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Log at debug level on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a form definition and print its physical tables
    Layout(LayoutArgs),
    /// Submission key utilities
    #[command(subcommand)]
    Key(KeyCommand),
    /// Print the JSON Schema of form definitions or store limits
    Schema(SchemaArgs),
    /// Build one submission against an in-memory store and report its rows
    Submit(SubmitArgs),
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Layout(args) => cmd::layout::run(&args),
        Commands::Key(command) => cmd::key::run(command),
        Commands::Schema(args) => cmd::schema::run(&args),
        Commands::Submit(args) => cmd::submit::run(&args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // A subscriber may already be installed when driven from tests.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
