//! Rewind command-line tool
//!
//! Instruments class files offline, prints the suspension-point analysis of
//! an entry method, disassembles class files and runs continuables from a
//! class directory.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(about = "Continuations for stack-machine classes", long_about = None)]
#[command(version)]
struct Cli {
    /// Instrumentation naming config (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `.rwc` class files, used to resolve super types
    #[arg(long, global = true, default_value = ".")]
    classpath: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a continuable class file
    Instrument {
        /// Input class file
        input: PathBuf,
        /// Output file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the suspension points of a class's entry method as JSON
    Analyze {
        /// Input class file
        input: PathBuf,
        /// Include the flow graph and every frame
        #[arg(long)]
        full: bool,
    },

    /// Print the contents of a class file
    Disasm {
        /// Input class file
        input: PathBuf,
    },

    /// Start a continuable and resume it until it finishes
    Run {
        /// Internal class name, e.g. `app/Countdown`
        class: String,
        /// Runtime settings (TOML)
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Stop after this many resumes
        #[arg(long)]
        steps: Option<usize>,
        /// Resume in place instead of cloning
        #[arg(long)]
        no_clone: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let instrument = commands::instrument_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Instrument { input, output } => {
            commands::instrument::execute(instrument, &cli.classpath, &input, output.as_deref())
        }
        Commands::Analyze { input, full } => commands::analyze::execute(instrument.as_ref(), &input, full),
        Commands::Disasm { input } => commands::disasm::execute(&input),
        Commands::Run {
            class,
            settings,
            steps,
            no_clone,
        } => commands::run::execute(
            instrument,
            &cli.classpath,
            &class,
            commands::run::RunOptions {
                settings,
                steps,
                clone: !no_clone,
            },
        ),
    }
}
