//! Command-line surface of the `archivist` binary.

use std::error::Error as _;
use std::io::{self, Write};
use std::path::PathBuf;

use archivist_ledger::IndexLedger;
use clap::{Args, Parser, Subcommand};

use crate::bootstrap::{BootstrapDependencies, run_app};
use crate::error::{AppError, AppResult};

#[derive(Debug, Parser)]
#[command(
    name = "archivist",
    version,
    about = "Moves datastore files into the archive store and indexes them"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Consume job payloads (one `<sequence>:<path>` per line) from stdin.
    Run,
    /// Find the archived file recorded for a sequence token.
    Lookup(LookupArgs),
    /// Print the job subject this host consumes.
    Subject,
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(Debug, Args)]
struct LookupArgs {
    /// Archive directory holding the `archive.index` ledger.
    directory: PathBuf,
    /// Sequence token to look up.
    sequence: String,
}

/// Parses CLI arguments and executes the requested command. Returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let result = dispatch(cli.command.unwrap_or(Command::Run)).await;
    match result {
        Ok(code) => code,
        Err(err) => {
            let mut message = err.to_string();
            let mut source = err.source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            eprintln!("error: {message}");
            err.exit_code()
        }
    }
}

async fn dispatch(command: Command) -> AppResult<i32> {
    match command {
        Command::Run => run_app().await.map(|_| 0),
        Command::Lookup(args) => lookup(&args),
        Command::Subject => {
            let deps = BootstrapDependencies::from_env()?;
            print_line(&deps.subject())?;
            Ok(0)
        }
        Command::Config => {
            let config = archivist_config::load_from_env()
                .map_err(|err| AppError::config("config.load_from_env", err))?;
            let rendered = serde_json::to_string_pretty(&config)
                .map_err(|source| AppError::Serialize { source })?;
            print_line(&rendered)?;
            Ok(0)
        }
    }
}

fn lookup(args: &LookupArgs) -> AppResult<i32> {
    let found = IndexLedger::new()
        .lookup(&args.directory, &args.sequence)
        .map_err(|err| AppError::ledger("ledger.lookup", err))?;
    match found {
        Some(entry) => {
            print_line(&entry.archive_name.display().to_string())?;
            Ok(0)
        }
        None => {
            eprintln!(
                "sequence {} not found in {}",
                args.sequence,
                args.directory.display()
            );
            Ok(1)
        }
    }
}

fn print_line(text: &str) -> AppResult<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}").map_err(|source| AppError::Io {
        operation: "stdout.write",
        path: None,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default_command() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["archivist"])?;
        assert!(cli.command.is_none());
        let cli = Cli::try_parse_from(["archivist", "lookup", "/archivestore/a", "42"])?;
        assert!(matches!(
            cli.command,
            Some(Command::Lookup(LookupArgs { ref sequence, .. })) if sequence == "42"
        ));
        Ok(())
    }

    #[test]
    fn lookup_reports_missing_sequence_with_exit_code() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let ledger = IndexLedger::new();
        ledger.record(&temp.path().join("a.dat"), "1")?;

        let hit = lookup(&LookupArgs {
            directory: temp.path().to_path_buf(),
            sequence: "1".into(),
        })?;
        let miss = lookup(&LookupArgs {
            directory: temp.path().to_path_buf(),
            sequence: "2".into(),
        })?;
        assert_eq!((hit, miss), (0, 1));
        Ok(())
    }
}
