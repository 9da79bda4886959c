mod demo;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stowage_persist::store::{open_reader, open_writer};
use stowage_persist::{FormatReader, PersistConfig, Token, load_global, save, transcode};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stowage-cli", about = "CLI tool for stowage graph files")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML file with adapter settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the registered storable types
    Info,
    /// Summarise a graph file: roots, objects per type, references
    Inspect {
        file: PathBuf,
        /// Dump the raw token stream instead of loading the graph
        #[arg(long)]
        tokens: bool,
    },
    /// Copy a graph file into another format, chosen by extension
    Convert { input: PathBuf, output: PathBuf },
    /// Write a demo team graph, then load it back
    Demo {
        output: PathBuf,
        /// Members per team
        #[arg(short, long, default_value = "3")]
        members: usize,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PersistConfig> {
    let Some(path) = path else {
        debug!("no config file, using defaults");
        return Ok(PersistConfig::default());
    };
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening config {}", path.display()))?;
    let config: PersistConfig = serde_yaml::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

fn dump_tokens(path: &Path) -> anyhow::Result<()> {
    let mut reader = open_reader(path)?;
    reader.open()?;
    let mut depth = 0usize;
    let result = (|| -> anyhow::Result<()> {
        while let Some(token) = reader.next_token()? {
            if matches!(
                token,
                Token::EndObject | Token::EndSequence | Token::EndMapping | Token::Footer { .. }
            ) {
                depth = depth.saturating_sub(1);
            }
            println!("{:indent$}{token}", "", indent = depth * 2);
            if matches!(
                token,
                Token::Header { .. }
                    | Token::BeginObject { .. }
                    | Token::BeginSequence { .. }
                    | Token::BeginMapping { .. }
            ) {
                depth += 1;
            }
        }
        Ok(())
    })();
    reader.close()?;
    result
}

/// Token-level summary; needs no registered types.
fn inspect(path: &Path) -> anyhow::Result<()> {
    let mut reader = open_reader(path)?;
    reader.open()?;
    let mut roots = Vec::new();
    let mut per_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut references = 0usize;
    let result = (|| -> anyhow::Result<()> {
        while let Some(token) = reader.next_token()? {
            match token {
                Token::Header { roots: ids } => roots = ids,
                Token::BeginObject { type_name, .. } => {
                    *per_type.entry(type_name).or_default() += 1;
                }
                Token::Reference { .. } => references += 1,
                _ => {}
            }
        }
        Ok(())
    })();
    reader.close()?;
    result.with_context(|| format!("reading {}", path.display()))?;

    let objects: usize = per_type.values().sum();
    println!("{}: {objects} objects, {references} references", path.display());
    for root in &roots {
        println!("root #{root}");
    }
    for (type_name, count) in &per_type {
        println!("  {type_name}: {count}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;
    demo::register()?;

    match cli.command {
        Commands::Info => {
            println!("stowage-cli v{}", env!("CARGO_PKG_VERSION"));
            let registry = stowage_kernel::global();
            println!("registered types: {}", registry.len());
            for name in registry.type_names() {
                println!("  {name}");
            }
        }
        Commands::Inspect { file, tokens } => {
            if tokens {
                dump_tokens(&file)?;
            } else {
                inspect(&file)?;
            }
        }
        Commands::Convert { input, output } => {
            let mut reader = open_reader(&input)?;
            let mut writer = open_writer(&output, &config)?;
            let copied = transcode(reader.as_mut(), writer.as_mut())
                .with_context(|| format!("converting {} to {}", input.display(), output.display()))?;
            info!(
                input = %input.display(),
                output = %output.display(),
                tokens = copied,
                "converted graph file"
            );
        }
        Commands::Demo { output, members } => {
            let roots = demo::build(members);
            let summary = save(&output, &roots, &config)?;
            info!(
                path = %output.display(),
                objects = summary.objects,
                references = summary.references,
                "wrote demo graph"
            );

            let graph = load_global(&output)?;
            if graph.len() as u64 == summary.objects {
                info!(objects = graph.len(), "loaded demo graph back");
            } else {
                warn!(
                    written = summary.objects,
                    loaded = graph.len(),
                    "demo graph reloaded with a different object count"
                );
            }
        }
    }

    Ok(())
}
