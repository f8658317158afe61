//! # Vitrine CLI
//!
//! Headless driver for the composite scene loader. Loads a catalog
//! manifest, initializes the composite against a directory or URL, applies
//! any requested switches and prints the resulting state.
//!
//! ## Usage
//!
//! ```bash
//! # Initialize with catalog defaults from ./public
//! vitrine --catalog catalog.toml --assets ./public
//!
//! # Start with roof2 and humans visible, then switch pods
//! vitrine --catalog catalog.toml --select roof=roof2 --show humans --switch pods=triangle
//!
//! # Fetch parts over HTTP and print JSON
//! vitrine --catalog catalog.toml --base-url https://cdn.example.com/viewer --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vitrine_composite::prelude::*;
use vitrine_composite::CompositeSnapshot;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vitrine")]
#[command(about = "Vitrine composite scene loader")]
#[command(version)]
struct Args {
    /// Catalog manifest (TOML)
    #[arg(short, long, env = "VITRINE_CATALOG")]
    catalog: PathBuf,

    /// Directory that part locators are relative to
    #[arg(short, long, default_value = ".")]
    assets: PathBuf,

    /// Fetch parts from this base URL instead of --assets
    #[arg(long)]
    base_url: Option<String>,

    /// Loader configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial group member, GROUP=PART (overrides the catalog default)
    #[arg(long, value_parser = parse_pair)]
    select: Vec<(String, String)>,

    /// Independent part to show initially
    #[arg(long)]
    show: Vec<String>,

    /// Independent part to hide initially
    #[arg(long)]
    hide: Vec<String>,

    /// Switch a group after initialization, GROUP=PART (applied in order)
    #[arg(long, value_parser = parse_pair)]
    switch: Vec<(String, String)>,

    /// Toggle an independent part after initialization, PART=on|off
    #[arg(long, value_parser = parse_toggle)]
    toggle: Vec<(String, bool)>,

    /// Print the final state as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, part)) if !key.is_empty() && !part.is_empty() => {
            Ok((key.to_string(), part.to_string()))
        }
        _ => Err(format!("expected KEY=PART, got `{}`", value)),
    }
}

fn parse_toggle(value: &str) -> Result<(String, bool), String> {
    let (part, state) = parse_pair(value)?;
    let visible = match state.to_ascii_lowercase().as_str() {
        "on" | "show" | "true" | "1" => true,
        "off" | "hide" | "false" | "0" => false,
        other => return Err(format!("expected on|off, got `{}`", other)),
    };
    Ok((part, visible))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let catalog = PartCatalog::from_file(&args.catalog)
        .with_context(|| format!("loading catalog {}", args.catalog.display()))?;

    let config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LoaderConfig::default(),
    }
    .with_env_overrides()?;

    let outcome = match &args.base_url {
        Some(base_url) => {
            info!("Fetching parts from {}", base_url);
            run(&args, catalog, config, Arc::new(HttpAssetSource::new(base_url.as_str()))).await?
        }
        None => {
            info!("Reading parts from {}", args.assets.display());
            run(&args, catalog, config, Arc::new(DirectoryAssetSource::new(&args.assets))).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.snapshot)?);
    } else {
        print_snapshot(&outcome.snapshot);
    }

    if outcome.failures > 0 {
        warn!("{} request(s) failed", outcome.failures);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

struct RunOutcome {
    snapshot: CompositeSnapshot,
    failures: usize,
}

async fn run<S: AssetSource>(
    args: &Args,
    catalog: PartCatalog,
    config: LoaderConfig,
    source: Arc<S>,
) -> Result<RunOutcome> {
    let scene = Arc::new(MemorySceneGraph::new());
    let loader = CompositeLoader::builder(catalog, source, scene)
        .config(config)
        .build()?;

    let mut initial = InitialSelection::new();
    for (group, part) in &args.select {
        initial = initial.select(group, part);
    }
    for part in &args.show {
        initial = initial.show(part);
    }
    for part in &args.hide {
        initial = initial.hide(part);
    }

    let report = loader.initialize_composite(initial).await?;
    let mut failures = report.failed.len();
    for error in &report.failed {
        warn!("{}", error);
    }

    for (group, part) in &args.switch {
        match loader.select_exclusive(group, part).await {
            Ok(outcome) => info!("{} -> {}: {:?}", group, part, outcome),
            Err(e) => {
                warn!("Switching {} to {} failed: {}", group, part, e);
                failures += 1;
            }
        }
    }

    for (part, visible) in &args.toggle {
        match loader.set_independent_visibility(part, *visible).await {
            Ok(outcome) => info!("{} visible={}: {:?}", part, visible, outcome),
            Err(e) => {
                warn!("Toggling {} failed: {}", part, e);
                failures += 1;
            }
        }
    }

    Ok(RunOutcome {
        snapshot: loader.snapshot(),
        failures,
    })
}

fn print_snapshot(snapshot: &CompositeSnapshot) {
    for (group, member) in &snapshot.groups {
        println!("{:<12} {}", group, member.as_deref().unwrap_or("-"));
    }
    for (part, visible) in &snapshot.independent {
        println!("{:<12} {}", part, if *visible { "shown" } else { "hidden" });
    }
    println!("loaded       {}", snapshot.loaded.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        [[parts]]
        id = "floor"
        locator = "models/floor.glb"
        visible = true

        [[parts]]
        id = "humans"
        locator = "models/humans.glb"

        [[parts]]
        id = "roof1"
        locator = "models/roof1.glb"
        group = "roof"
        default = true

        [[parts]]
        id = "roof2"
        locator = "models/roof2.glb"
        group = "roof"
    "#;

    fn write_assets(dir: &std::path::Path, names: &[&str]) {
        std::fs::create_dir_all(dir.join("models")).unwrap();
        for name in names {
            std::fs::write(dir.join("models").join(name), name.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("roof=roof2").unwrap(), ("roof".into(), "roof2".into()));
        assert!(parse_pair("roof").is_err());
        assert!(parse_pair("=roof2").is_err());
        assert!(parse_pair("roof=").is_err());
    }

    #[test]
    fn test_parse_toggle() {
        assert_eq!(parse_toggle("humans=on").unwrap(), ("humans".into(), true));
        assert_eq!(parse_toggle("humans=OFF").unwrap(), ("humans".into(), false));
        assert!(parse_toggle("humans=maybe").is_err());
    }

    #[tokio::test]
    async fn test_run_against_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_assets(dir.path(), &["floor.glb", "humans.glb", "roof1.glb", "roof2.glb"]);
        let catalog = PartCatalog::from_toml_str(CATALOG).unwrap();

        let args = Args::parse_from([
            "vitrine",
            "--catalog",
            "catalog.toml",
            "--switch",
            "roof=roof2",
            "--toggle",
            "humans=on",
        ]);
        let source = Arc::new(DirectoryAssetSource::new(dir.path()));
        let outcome = run(&args, catalog, LoaderConfig::default(), source).await.unwrap();

        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.snapshot.groups["roof"].as_deref(), Some("roof2"));
        assert!(outcome.snapshot.independent["humans"]);
        assert_eq!(outcome.snapshot.loaded, vec!["floor", "humans", "roof1", "roof2"]);
    }

    #[tokio::test]
    async fn test_run_counts_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        write_assets(dir.path(), &["floor.glb", "roof1.glb"]);
        let catalog = PartCatalog::from_toml_str(CATALOG).unwrap();

        let args = Args::parse_from([
            "vitrine",
            "--catalog",
            "catalog.toml",
            "--switch",
            "roof=roof2",
        ]);
        let source = Arc::new(DirectoryAssetSource::new(dir.path()));
        let outcome = run(&args, catalog, LoaderConfig::default(), source).await.unwrap();

        assert_eq!(outcome.failures, 1);
        // The failed switch left the default roof in place
        assert_eq!(outcome.snapshot.groups["roof"].as_deref(), Some("roof1"));
    }

    fn memory_source() -> Arc<MemoryAssetSource> {
        let source = MemoryAssetSource::new();
        for name in ["floor", "humans", "roof1", "roof2"] {
            source.insert(format!("models/{}.glb", name), name.as_bytes().to_vec());
        }
        Arc::new(source)
    }

    #[tokio::test]
    async fn test_run_applies_initial_overrides() {
        let catalog = PartCatalog::from_toml_str(CATALOG).unwrap();
        let source = memory_source();

        let args = Args::parse_from([
            "vitrine",
            "--catalog",
            "catalog.toml",
            "--select",
            "roof=roof2",
            "--hide",
            "floor",
            "--show",
            "humans",
        ]);
        let outcome = run(&args, catalog, LoaderConfig::default(), source.clone()).await.unwrap();

        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.snapshot.groups["roof"].as_deref(), Some("roof2"));
        assert!(outcome.snapshot.independent["humans"]);
        assert!(!outcome.snapshot.independent["floor"]);
        assert_eq!(outcome.snapshot.loaded, vec!["humans", "roof2"]);
        assert_eq!(source.fetch_count("models/roof1.glb"), 0);
        assert_eq!(source.fetch_count("models/floor.glb"), 0);
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_override_before_fetching() {
        let catalog = PartCatalog::from_toml_str(CATALOG).unwrap();
        let source = memory_source();

        let args = Args::parse_from(["vitrine", "--catalog", "catalog.toml", "--select", "roof=humans"]);
        let result = run(&args, catalog, LoaderConfig::default(), source.clone()).await;

        assert!(result.is_err());
        assert_eq!(source.total_fetches(), 0);
    }
}
