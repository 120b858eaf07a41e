mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "taskseal", version, about = "Seal task and result CSVs for exchange")]
struct Cli {
    /// JSON codec configuration; TASKSEAL_* variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Row worker threads (0 = one per core).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Leave failing rows out and report them instead of aborting.
    #[arg(long, global = true)]
    skip_failed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct KeysArg {
    /// Keys file (defaults to the configured keys file).
    #[arg(long)]
    keys_file: Option<PathBuf>,
}

#[derive(Args)]
struct Transfer {
    input: PathBuf,
    output: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a fresh key set and write it to the keys file.
    GenerateKeys {
        #[command(flatten)]
        keys: KeysArg,
    },
    /// Fold extra task columns into `content`.
    Merge {
        #[command(flatten)]
        files: Transfer,
    },
    /// Seal a task CSV with the Input keys.
    EncryptTasks {
        #[command(flatten)]
        files: Transfer,
        #[command(flatten)]
        keys: KeysArg,
    },
    /// Open a sealed task CSV with the Input keys.
    DecryptTasks {
        #[command(flatten)]
        files: Transfer,
        #[command(flatten)]
        keys: KeysArg,
    },
    /// Seal a `name,result` CSV with the Output keys.
    EncryptResults {
        #[command(flatten)]
        files: Transfer,
        #[command(flatten)]
        keys: KeysArg,
    },
    /// Open a sealed result CSV with the Output keys.
    DecryptResults {
        #[command(flatten)]
        files: Transfer,
        #[command(flatten)]
        keys: KeysArg,
    },
    /// Spread decrypted result objects into one column per key.
    FlattenResults {
        #[command(flatten)]
        files: Transfer,
    },
    /// Print the rows of any CSV file.
    Show { input: PathBuf },
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.workers, cli.skip_failed)?;

    match cli.command {
        Command::GenerateKeys { keys } => commands::generate_keys(&config, keys.keys_file),
        Command::Merge { files } => commands::merge(&files.input, &files.output),
        Command::EncryptTasks { files, keys } => {
            commands::encrypt_tasks(&config, keys.keys_file, &files.input, &files.output)
        }
        Command::DecryptTasks { files, keys } => {
            commands::decrypt_tasks(&config, keys.keys_file, &files.input, &files.output)
        }
        Command::EncryptResults { files, keys } => {
            commands::encrypt_results(&config, keys.keys_file, &files.input, &files.output)
        }
        Command::DecryptResults { files, keys } => {
            commands::decrypt_results(&config, keys.keys_file, &files.input, &files.output)
        }
        Command::FlattenResults { files } => {
            commands::flatten_results(&files.input, &files.output)
        }
        Command::Show { input } => commands::show(&input),
    }
}
