#![forbid(unsafe_code)]

mod config;
mod host;
mod watch;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use craft_bridge::{BlockPos, RegionCoord};
use craft_compat::Providers;
use craft_content::FieldValues;
use craft_mapping::HostVersion;
use craft_region::{ObjectId, PoolConfig, RegionCommand, RegionPool, Reply};
use craft_registry::Registry;

use crate::config::CoreConfig;
use crate::host::MemoryHost;
use crate::watch::LiveReload;

/// Simulated objects stand on this layer; the host's terrain is stone below.
const GROUND: i32 = 64;

#[derive(Parser, Debug)]
#[command(name = "craft", about = "Virtual content registry and engine bridge", version)]
struct Cli {
    /// Operator configuration file
    #[arg(long, env = "CRAFT_CONFIG", default_value = "craft.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `craft_registry=trace`; overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load content and report what maps onto each host version
    Check,
    /// Write the surrogate manifest for one host version
    Manifest {
        #[arg(long = "host", value_name = "VERSION")]
        host: HostVersion,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Reload content whenever a content file changes
    Watch,
    /// Drive the region workers against an in-memory host
    Simulate {
        #[arg(long, default_value_t = 64)]
        objects: usize,
    },
}

fn init_logging(filter: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(f) = filter {
        builder.parse_filters(f);
    }
    builder.format_timestamp_millis().init();
}

fn load_registry(config: &CoreConfig) -> Result<Registry, Box<dyn Error>> {
    let catalogues = config.catalogues()?;
    let registry = Registry::new(catalogues, config.capability_table(), config.versions.clone())?;
    let report = registry.reload(&config.sources()?)?;
    for ex in &report.excluded {
        log::warn!("{} excluded: {}", ex.key, ex.reason);
    }
    Ok(registry)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let config = CoreConfig::from_path(&cli.config)?;
    log::debug!("config: {:?}", config);

    match cli.command {
        Command::Check => check(&config),
        Command::Manifest { host, out } => manifest(&config, host, out),
        Command::Watch => run_watch(&config),
        Command::Simulate { objects } => simulate(&config, objects),
    }
}

fn check(config: &CoreConfig) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(config)?;
    let snap = registry.snapshot();
    println!("generation {}: {} definitions", snap.generation, snap.definitions.len());
    for (version, table) in &snap.tables {
        println!("  {:<8} {} mapped, fallback {}", version, table.len(), table.fallback());
    }
    for ex in &snap.excluded {
        println!("  excluded {}: {}", ex.key, ex.reason);
    }
    Ok(())
}

fn manifest(config: &CoreConfig, host: HostVersion, out: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(config)?;
    let snap = registry.snapshot();
    let table = snap
        .table(host)
        .ok_or_else(|| format!("host version {} is not active in {:?}", host, config.versions))?;
    let text = table.manifest()?;
    match out {
        Some(path) => {
            fs::write(&path, text)?;
            log::info!("wrote {} entries to {}", table.len(), path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn run_watch(config: &CoreConfig) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(config)?;
    let (tx, rx) = crossbeam_channel::unbounded();
    let _watcher = watch::watch_content(config, tx)?;
    watch::run(&registry, config, &rx);
    Ok(())
}

/// Where the `n`th simulated object goes: rows across the region, then
/// layers upward once a layer is full.
fn spawn_position(n: usize, size: i32) -> Result<BlockPos, Box<dyn Error>> {
    let layer = size
        .checked_mul(size)
        .ok_or_else(|| format!("region_size {size} is too large to simulate"))?;
    let n = i32::try_from(n).map_err(|_| format!("object {n} is out of range"))?;
    let y = GROUND
        .checked_add(n / layer)
        .ok_or_else(|| format!("object {n} is above the world"))?;
    Ok(BlockPos::new(n % size, y, (n / size) % size))
}

/// Exercises the whole pipeline: spawn, interact, trigger, move across a
/// worker boundary, save, load back and transmit.
fn simulate(config: &CoreConfig, objects: usize) -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(load_registry(config)?);
    let live = LiveReload::start(registry.clone(), config)?;
    let version = config.versions.first().copied().unwrap_or(HostVersion::V1_21_4);
    let host = Arc::new(MemoryHost::new(version, GROUND));
    let providers = Arc::new(Providers::new(registry.capabilities().clone()));
    let pool = RegionPool::start(
        registry.clone(),
        host.clone(),
        providers,
        PoolConfig {
            workers: config.workers,
            region_size: config.region_size,
        },
    )?;

    let snap = registry.snapshot();
    let keys: Vec<_> = snap.definitions.iter().map(|d| d.key.clone()).collect();
    if keys.is_empty() {
        return Err("no content definitions to simulate with".into());
    }
    let size = config.region_size;
    let west = RegionCoord::new(0, 0);
    let east = RegionCoord::new(1, 0);
    for region in [west, east] {
        pool.call(RegionCommand::Load { region })?;
    }

    let mut spawned: Vec<ObjectId> = Vec::with_capacity(objects);
    for i in 0..objects {
        let pos = spawn_position(i, size)?;
        let key = keys[i % keys.len()].clone();
        match pool.call(RegionCommand::Spawn {
            pos,
            key: key.clone(),
            overrides: FieldValues::new(),
        }) {
            Ok(Reply::Spawned { id, .. }) => spawned.push(id),
            Ok(other) => log::warn!("unexpected reply to spawn: {:?}", other),
            Err(e) => log::warn!("could not spawn {} at {}: {}", key, pos, e),
        }
    }
    log::info!("spawned {} of {} objects", spawned.len(), objects);

    let mut interacted = 0;
    for &id in &spawned {
        if let Ok(Reply::Interacted { power: Some(_), .. }) =
            pool.call(RegionCommand::Interact { region: west, id, sneaking: false })
        {
            interacted += 1;
        }
    }

    let mut triggered = 0;
    for &id in &spawned {
        if let Ok(Reply::Signalled { action: Some(action), .. }) =
            pool.call(RegionCommand::Signal { region: west, id, powered: true })
        {
            log::debug!("{} triggered {:?}", id, action);
            triggered += 1;
        }
    }

    let replies: Vec<_> = spawned
        .iter()
        .step_by(2)
        .enumerate()
        .map(|(i, &id)| {
            pool.submit(RegionCommand::Move {
                region: west,
                id,
                to: BlockPos::new(size + 1, 64, i as i32 % size),
            })
        })
        .collect();
    let mut moved = 0;
    for rx in replies {
        match rx.recv() {
            Ok(Ok(Reply::Moved { .. })) => moved += 1,
            Ok(Ok(other)) => log::warn!("unexpected reply to move: {:?}", other),
            Ok(Err(e)) => log::warn!("move refused: {}", e),
            Err(_) => return Err("region worker stopped mid-move".into()),
        }
    }
    log::info!(
        "{} power changes, {} trigger actions, {} objects moved east",
        interacted,
        triggered,
        moved
    );

    for region in [west, east] {
        if let Reply::Saved { report, .. } = pool.call(RegionCommand::Save { region })? {
            log::info!(
                "{}: saved {} ({} custom, {} detached); host holds {}",
                region,
                report.total(),
                report.custom,
                report.detached.len(),
                host.stored(region)
            );
        }
        if let Reply::Loaded { ids, report, .. } = pool.call(RegionCommand::Load { region })? {
            log::info!(
                "{}: loaded {} ({} custom, {} placeholders)",
                region,
                ids.len(),
                report.custom,
                report.placeholders.len()
            );
        }
        pool.call(RegionCommand::Transmit { region, client: 1, viewer: version })?;
        if let Reply::Ticked(tick) = pool.call(RegionCommand::Tick { region })? {
            log::info!("{}: generation {}, {} stale", region, tick.generation, tick.stale.len());
        }
    }
    log::info!("client 1 received {} descriptors", host.sent_to(1));

    pool.shutdown();
    if let Some(live) = live {
        live.stop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_objects_fill_rows_then_layers() {
        assert_eq!(spawn_position(0, 4).unwrap(), BlockPos::new(0, GROUND, 0));
        assert_eq!(spawn_position(5, 4).unwrap(), BlockPos::new(1, GROUND, 1));
        assert_eq!(spawn_position(17, 4).unwrap(), BlockPos::new(1, GROUND + 1, 0));
    }

    #[test]
    fn oversized_regions_are_an_error_not_an_overflow() {
        assert!(spawn_position(0, 46_341).is_err());
        assert!(spawn_position(usize::MAX, 512).is_err());
        assert!(spawn_position(0, 46_340).is_ok());
    }
}
