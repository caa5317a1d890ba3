//! CLI entry point for the citadel code intelligence engine.
//!
//! Thin wrapper for exercising the library from a shell: scan files, ask
//! for completions, calltips and definitions at a byte offset, and inspect
//! configuration. Editors embed the library directly instead.

use anyhow::{Context, Result, bail};
use citadel::{Buffer, Engine, Settings, TrgForm, Trigger};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "citadel", version, about = "Editor-embedded code intelligence engine")]
struct Cli {
    /// Path to a custom citadel.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default citadel.toml in the current directory
    Init,
    /// Display active settings
    Config,
    /// List registered languages
    ListLanguages,
    /// Scan a file and print its scope tree as JSON
    Scan {
        file: PathBuf,
    },
    /// Completions at a byte offset (a trailing trigger char or mid-word)
    Complete {
        file: PathBuf,
        /// Byte offset; defaults to end of file
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Calltip at a byte offset
    Calltip {
        file: PathBuf,
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Definition of the symbol at a byte offset
    Defn {
        file: PathBuf,
        #[arg(long)]
        offset: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Init => {
            let path = Path::new("citadel.toml");
            if Settings::init_config_file(path)? {
                println!("Created {}", path.display());
            } else {
                println!("{} already exists", path.display());
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::ListLanguages => {
            let engine = Engine::new(settings);
            for id in engine.registry().iter_ids() {
                let enabled = engine.settings().is_language_enabled(id.as_str());
                println!("{id}{}", if enabled { "" } else { " (disabled)" });
            }
            Ok(())
        }
        Commands::Scan { file } => {
            let engine = Engine::new(settings);
            let buffer = load_buffer(&engine, &file)?;
            engine.start();
            let handle = engine.request_scan(
                buffer.clone(),
                citadel::Priority::Immediate,
                true,
                None,
            )?;
            handle
                .wait(std::time::Duration::from_secs(30))
                .context("scan did not finish in time")?;
            if let (_, Some(error)) = engine.scan_status(&buffer.id) {
                bail!("scan failed: {error}");
            }
            let blob = engine
                .citadel()
                .cached_blob(&buffer.id, &buffer.language)
                .context("no scan data produced")?;
            println!("{}", serde_json::to_string_pretty(&*blob)?);
            engine.shutdown();
            Ok(())
        }
        Commands::Complete { file, offset } => {
            run_eval(settings, &file, offset, TrgForm::Completion)
        }
        Commands::Calltip { file, offset } => run_eval(settings, &file, offset, TrgForm::Calltip),
        Commands::Defn { file, offset } => run_eval(settings, &file, offset, TrgForm::Definition),
    }
}

fn load_buffer(engine: &Engine, file: &Path) -> Result<Buffer> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read '{}'", file.display()))?;
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .with_context(|| format!("'{}' has no file extension", file.display()))?;
    let language = engine
        .registry()
        .language_for_extension(extension)
        .with_context(|| format!("no language registered for '.{extension}' files"))?;
    Ok(Buffer::new(language.as_str(), file, &text))
}

fn run_eval(settings: Settings, file: &Path, offset: Option<usize>, form: TrgForm) -> Result<()> {
    let engine = Engine::new(settings);
    let buffer = load_buffer(&engine, file)?;
    let offset = offset.unwrap_or(buffer.text().len());
    engine.start();

    let trg = match form {
        TrgForm::Definition => Trigger::new(
            &buffer.language,
            TrgForm::Definition,
            "defn",
            buffer.pos_at(offset),
            false,
            0,
        ),
        _ => {
            let found = engine
                .trg_from_pos(&buffer, offset, false)?
                .or(engine.preceding_trg_from_pos(&buffer, offset, offset)?)
                .context("no trigger point at or before the given offset")?;
            if found.form != form {
                bail!(
                    "nearest trigger is {}, not a {} trigger",
                    found.name(),
                    form.as_str()
                );
            }
            found
        }
    };

    match form {
        TrgForm::Completion => {
            let cplns = engine.completions_for(&buffer, &trg)?;
            println!("{}", serde_json::to_string_pretty(&cplns)?);
        }
        TrgForm::Calltip => {
            let tips = engine.calltips_for(&buffer, &trg)?;
            println!("{}", serde_json::to_string_pretty(&tips)?);
        }
        TrgForm::Definition => {
            let defns = engine.defns_for(&buffer, &trg)?;
            println!("{}", serde_json::to_string_pretty(&defns)?);
        }
    }
    engine.shutdown();
    Ok(())
}
