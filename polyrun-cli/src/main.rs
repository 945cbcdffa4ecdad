mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "polyrun")]
#[command(about = "Run code snippets in many languages with local toolchains or a remote fallback")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ~/.config/polyrun/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a program and print the result as JSON
    Run {
        /// Language id or alias (python, js, rust, ...)
        #[arg(short, long)]
        language: String,

        /// Source file ("-" reads standard input)
        #[arg(conflicts_with = "code", required_unless_present = "code")]
        file: Option<PathBuf>,

        /// Inline source code
        #[arg(short = 'e', long)]
        code: Option<String>,

        /// File fed to the program's standard input
        #[arg(long, conflicts_with = "stdin")]
        stdin_file: Option<PathBuf>,

        /// Literal text fed to the program's standard input
        #[arg(long)]
        stdin: Option<String>,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,
    },
    /// List supported languages
    Languages {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Screen source with the security prefilter without running it
    Check {
        /// Language id or alias
        #[arg(short, long)]
        language: String,

        /// Source file ("-" reads standard input)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = commands::init_logging(cli.verbose, cli.log_dir.as_deref())?;
    let config = commands::load_config(cli.config.as_deref())?;

    let success = match cli.command {
        Commands::Run {
            language,
            file,
            code,
            stdin_file,
            stdin,
            pretty,
        } => {
            let source = commands::SourceInput::from_args(file, code);
            let input = commands::StdinInput::from_args(stdin_file, stdin);
            commands::execute_run(config, &language, source, input, pretty).await?
        }
        Commands::Languages { json } => commands::execute_languages(config, json)?,
        Commands::Check { language, file } => commands::execute_check(config, &language, &file)?,
    };

    // Returning (not `process::exit`) drops the guard, flushing the log file
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
