//! ddmap CLI - inspect DDNet map files.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ddmap::{ItemKind, LayerSummary, Limits, Map, MapInfo};
use ddmap_datafile::Datafile;

/// ddmap - DDNet map inspection tool
#[derive(Parser)]
#[command(name = "ddmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Largest uncompressed data block accepted, in bytes
    #[arg(long, global = true, env = "DDMAP_MAX_BLOCK_SIZE")]
    max_block_size: Option<usize>,

    /// Largest total of uncompressed data per map, in bytes
    #[arg(long, global = true, env = "DDMAP_MAX_TOTAL_SIZE")]
    max_total_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn limits(&self) -> Limits {
        let mut limits = Limits::default();
        if let Some(size) = self.max_block_size {
            limits = limits.with_max_block_size(size);
        }
        if let Some(size) = self.max_total_size {
            limits = limits.with_max_total_size(size);
        }
        limits
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show dimensions, gameplay layers and metadata of maps
    Info {
        /// Map files
        #[arg(required = true)]
        maps: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the server settings stored in a map
    Settings {
        /// Map file
        map: PathBuf,
    },

    /// List the tile layers of a map
    Layers {
        /// Map file
        map: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the raw datafile items of a map
    Items {
        /// Map file
        map: PathBuf,

        /// Also list data blocks
        #[arg(short, long)]
        data: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let limits = cli.limits();

    match &cli.command {
        Commands::Info { maps, json } => cmd_info(maps, *json, limits)?,
        Commands::Settings { map } => cmd_settings(map, limits)?,
        Commands::Layers { map, json } => cmd_layers(map, *json, limits)?,
        Commands::Items { map, data } => cmd_items(map, *data, limits)?,
    }

    Ok(())
}

#[derive(Serialize)]
struct MapReport {
    path: PathBuf,
    width: usize,
    height: usize,
    layers: Vec<&'static str>,
    settings: usize,
    info: MapInfo,
}

impl MapReport {
    fn new(path: &Path, map: &Map) -> Self {
        let present = [
            ("game", true),
            ("front", map.front_layer().is_some()),
            ("tele", map.tele_layer().is_some()),
            ("speedup", map.speedup_layer().is_some()),
            ("switch", map.switch_layer().is_some()),
            ("door", map.door_layer().is_some()),
            ("tune", map.tune_layer().is_some()),
        ];

        Self {
            path: path.to_path_buf(),
            width: map.width(),
            height: map.height(),
            layers: present
                .into_iter()
                .filter(|(_, present)| *present)
                .map(|(name, _)| name)
                .collect(),
            settings: map.settings().len(),
            info: map.info().clone(),
        }
    }

    fn print(&self) {
        println!("{}", self.path.display());
        println!("  size:     {}x{}", self.width, self.height);
        println!("  layers:   {}", self.layers.join(", "));
        println!("  settings: {}", self.settings);
        let fields = [
            ("author", &self.info.author),
            ("version", &self.info.version),
            ("credits", &self.info.credits),
            ("license", &self.info.license),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                println!("  {name:<9} {value}");
            }
        }
    }
}

fn load(path: &Path, limits: Limits) -> Result<Map> {
    Map::load_with(path, limits).with_context(|| format!("Failed to load map {}", path.display()))
}

fn cmd_info(paths: &[PathBuf], json: bool, limits: Limits) -> Result<()> {
    let start = Instant::now();
    let results: Vec<Result<MapReport>> = paths
        .par_iter()
        .map(|path| load(path, limits).map(|map| MapReport::new(path, &map)))
        .collect();
    debug!(maps = paths.len(), elapsed = ?start.elapsed(), "parsed maps");

    let mut reports = Vec::with_capacity(results.len());
    let mut failed = 0;
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("Error: {e:#}");
                failed += 1;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            report.print();
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} maps failed to load", paths.len());
    }
    Ok(())
}

fn cmd_settings(path: &Path, limits: Limits) -> Result<()> {
    let map = load(path, limits)?;
    for setting in map.settings() {
        println!("{setting}");
    }
    Ok(())
}

fn cmd_layers(path: &Path, json: bool, limits: Limits) -> Result<()> {
    let map = load(path, limits)?;
    let layers: &[LayerSummary] = map.layers();

    if json {
        println!("{}", serde_json::to_string_pretty(layers)?);
        return Ok(());
    }

    for layer in layers {
        let group = layer
            .group
            .map_or_else(|| "-".to_string(), |group| group.to_string());
        println!(
            "{:>4} {:>5} {:<8} {:>5}x{:<5} {} {}",
            layer.index,
            group,
            layer.kind,
            layer.width,
            layer.height,
            if layer.selected { "*" } else { " " },
            layer.name.as_deref().unwrap_or("")
        );
    }
    println!("\nTotal: {} tile layers", layers.len());

    Ok(())
}

fn cmd_items(path: &Path, data: bool, limits: Limits) -> Result<()> {
    let bytes = fs::read(path).context("Failed to read map file")?;
    let file = Datafile::parse_with(&bytes, limits).context("Failed to parse datafile")?;

    println!("Datafile version {:?}", file.version());
    for item in file.items() {
        let kind = match ItemKind::from_type_id(item.type_id()) {
            ItemKind::Other(type_id) => format!("type {type_id:#06x}"),
            known => format!("{known:?}"),
        };
        println!("{:<14} {:>5} {:>6} words", kind, item.id(), item.len_words());
    }
    println!("\nTotal: {} items", file.items().len());

    if data {
        for index in 0..file.num_data() {
            let size = i32::try_from(index)
                .ok()
                .and_then(|index| file.data_size(index))
                .unwrap_or_default();
            println!("data {index:>5} {size:>10} bytes");
        }
        println!("\nTotal: {} data blocks", file.num_data());
    }

    Ok(())
}
