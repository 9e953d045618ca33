use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use craft_registry::Registry;
use crossbeam_channel::{Receiver, Sender};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::CoreConfig;

/// Quiet period after the first change before reloading, so an editor's
/// save-rename-delete burst becomes one reload.
const DEBOUNCE: Duration = Duration::from_millis(250);

/// Content files an event touched. Only `*.toml` changes count.
pub fn content_paths(event: &Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => event
            .paths
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
            })
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Watches every content directory. Dropping the returned watcher stops it.
pub fn watch_content(config: &CoreConfig, tx: Sender<PathBuf>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
        Ok(event) => {
            for p in content_paths(&event) {
                let _ = tx.send(p);
            }
        }
        Err(e) => log::warn!("content watcher: {}", e),
    })?;
    for dir in &config.content_dirs {
        watcher.watch(dir, RecursiveMode::Recursive)?;
        log::info!("watching {}", dir.display());
    }
    Ok(watcher)
}

/// Reloads the registry after each burst of changes until the channel closes.
pub fn run(registry: &Registry, config: &CoreConfig, rx: &Receiver<PathBuf>) {
    while let Ok(first) = rx.recv() {
        std::thread::sleep(DEBOUNCE);
        let mut changed: BTreeSet<PathBuf> = BTreeSet::new();
        changed.insert(first);
        changed.extend(rx.try_iter());
        log::info!("content changes detected: {} file(s)", changed.len());
        for p in &changed {
            log::debug!("changed: {}", p.display());
        }
        reload(registry, config);
    }
}

/// Reloads in the background while another command runs, if `watch = true`.
pub struct LiveReload {
    watcher: RecommendedWatcher,
    handle: JoinHandle<()>,
}

impl LiveReload {
    pub fn start(registry: Arc<Registry>, config: &CoreConfig) -> Result<Option<LiveReload>, Box<dyn Error>> {
        if !config.watch {
            return Ok(None);
        }
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher = watch_content(config, tx)?;
        let config = config.clone();
        let handle = thread::Builder::new()
            .name("craft-reload".into())
            .spawn(move || run(&registry, &config, &rx))?;
        Ok(Some(LiveReload { watcher, handle }))
    }

    /// Stops watching and waits for an in-flight reload to finish.
    pub fn stop(self) {
        // the watcher owns the sender; dropping it ends `run`
        drop(self.watcher);
        if self.handle.join().is_err() {
            log::error!("content reload thread panicked");
        }
    }
}

/// One reload from disk. Failures keep the active snapshot and are logged.
pub fn reload(registry: &Registry, config: &CoreConfig) -> bool {
    let sources = match config.sources() {
        Ok(s) => s,
        Err(e) => {
            log::error!("content reload skipped: {}", e);
            return false;
        }
    };
    match registry.reload(&sources) {
        Ok(report) => {
            for ex in &report.excluded {
                log::warn!("{} excluded: {}", ex.key, ex.reason);
            }
            true
        }
        Err(e) => {
            log::error!("content reload rejected, keeping generation {}: {}", registry.generation(), e);
            false
        }
    }
}
