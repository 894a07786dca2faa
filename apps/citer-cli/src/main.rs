//! citer - pick citation keys from the terminal
//!
//! ## Usage
//!
//! ```bash
//! citer search --document paper.md          # insert at the end of paper.md
//! citer search --keys-only --no-remote      # print the picked key
//! citer complete @smi
//! citer combine --document paper.md
//! ```

mod terminal;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use citer_core::{
    BibCodec, CiterConfig, CiterError, CiterSession, Host, Providers, SearchMode, Settings,
};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use terminal::{LinePicker, StderrStatus, Target};

#[derive(Parser)]
#[command(name = "citer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: $CITER_CONFIG or <config dir>/citer/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document to insert into; its front matter may name a bibliography
    #[arg(long, global = true)]
    document: Option<PathBuf>,

    /// Byte offset of the insertion point (default: end of document)
    #[arg(long, global = true, requires = "document")]
    at: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a local entry or search a remote provider
    Search {
        /// Insert the bare key instead of the citation format
        #[arg(long)]
        keys_only: bool,

        /// Only offer local entries
        #[arg(long)]
        no_remote: bool,
    },
    /// Pick from the sorted key menu
    Keys,
    /// Pick an entry and insert its title
    Title,
    /// List keys containing PREFIX
    Complete {
        prefix: String,

        /// Text before the cursor; may open a key-only search instead
        #[arg(long)]
        line: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge adjacent citations `[@a][@b]` into `[@a; @b]`
    Combine,
    /// Print the effective configuration
    Config,
    /// Print one entry as BibTeX
    Show { key: String },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Citer(#[from] CiterError),

    #[error("{path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize configuration: {0}")]
    ConfigOutput(String),

    #[error("`{0}` needs --document")]
    NeedsDocument(&'static str),

    #[error("No entry with key {0}")]
    UnknownKey(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("citer: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config.clone().or_else(CiterConfig::default_path)
}

fn load_settings(cli: &Cli) -> Result<Settings, CliError> {
    match config_path(cli) {
        Some(path) if cli.config.is_some() || path.exists() => {
            debug!(path = %path.display(), "loading config");
            Ok(CiterConfig::load(&path).map_err(CiterError::from)?)
        }
        _ => {
            warn!("no config file found, using defaults");
            Ok(Settings::default())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Config = cli.command {
        return print_config(&cli);
    }

    let settings = load_settings(&cli)?;
    let providers = match &cli.command {
        Commands::Search { no_remote: false, .. } => {
            Providers::from_settings(&settings).map_err(CiterError::from)?
        }
        _ => Providers::none(),
    };
    let mut session = CiterSession::new(settings, providers);

    let mut target = match &cli.document {
        Some(path) => {
            let target = Target::open(path, cli.at).map_err(|source| CliError::Document {
                path: path.clone(),
                source,
            })?;
            session.use_document(path, target.text());
            target
        }
        None => Target::stdout(),
    };

    let mut picker = LinePicker::stdio();
    let mut status = StderrStatus;

    match &cli.command {
        Commands::Search { keys_only, .. } => {
            let mode = if *keys_only {
                SearchMode::KeyOnly
            } else {
                SearchMode::Citation
            };
            let mut host = Host {
                picker: &mut picker,
                edit: &mut target,
                status: &mut status,
            };
            session.search(mode, &mut host)?;
        }
        Commands::Keys => {
            let mut host = Host {
                picker: &mut picker,
                edit: &mut target,
                status: &mut status,
            };
            session.show_keys(&mut host)?;
        }
        Commands::Title => {
            let mut host = Host {
                picker: &mut picker,
                edit: &mut target,
                status: &mut status,
            };
            session.insert_title(&mut host)?;
        }
        Commands::Complete { prefix, line, json } => {
            if let Some(line) = line {
                if session.should_search_on_completion(line) {
                    let mut host = Host {
                        picker: &mut picker,
                        edit: &mut target,
                        status: &mut status,
                    };
                    session.search(SearchMode::KeyOnly, &mut host)?;
                    return finish(target, &cli);
                }
            }
            let completions = session.completions(prefix)?;
            if *json {
                println!(
                    "{}",
                    serde_json::json!({
                        "keys": completions.keys,
                        "hide_others": completions.hide_others,
                    })
                );
            } else {
                for key in &completions.keys {
                    println!("{}", key);
                }
            }
            return Ok(());
        }
        Commands::Combine => {
            if cli.document.is_none() {
                return Err(CliError::NeedsDocument("combine"));
            }
            let merged = session.combine_citations(&mut target);
            eprintln!("merged {} adjacent citation(s)", merged);
        }
        Commands::Show { key } => {
            let store = session.store();
            let record = store
                .find(key)
                .map_err(CiterError::from)?
                .cloned()
                .ok_or_else(|| CliError::UnknownKey(key.clone()))?;
            for notice in store.take_notices() {
                eprintln!("{}", notice);
            }
            print!("{}", store.codec().serialize(&record));
            return Ok(());
        }
        Commands::Config => unreachable!("handled above"),
    }

    finish(target, &cli)
}

fn finish(target: Target, cli: &Cli) -> Result<(), CliError> {
    let path = cli.document.clone().unwrap_or_default();
    target
        .finish()
        .map_err(|source| CliError::Document { path, source })
}

fn print_config(cli: &Cli) -> Result<(), CliError> {
    let path = config_path(cli);
    let config = match &path {
        Some(path) if path.exists() => {
            let text = fs::read_to_string(path).map_err(|source| CliError::Document {
                path: path.clone(),
                source,
            })?;
            CiterConfig::from_toml(&text).map_err(CiterError::from)?
        }
        _ => CiterConfig::default(),
    };

    match &path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory; defaults"),
    }
    let rendered = config
        .to_toml()
        .map_err(|e| CliError::ConfigOutput(e.to_string()))?;
    print!("{}", rendered);

    let base = path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let settings = config.resolve(base).map_err(CiterError::from)?;
    println!();
    for input in &settings.bibliography_paths {
        let marker = if Some(input) == settings.output_path.as_ref() {
            " (output)"
        } else {
            ""
        };
        println!("# bibliography: {}{}", input.display(), marker);
    }
    Ok(())
}
