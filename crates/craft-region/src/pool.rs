use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use craft_bridge::{
    BlockPos, Bridge, BridgeError, ClientId, HostAdapter, HostError, InstantiateError, LoadReport,
    RegionCoord, SaveReport, WorldObject,
};
use craft_codec::ObjectInstance;
use craft_compat::Providers;
use craft_content::behavior::{self, Behavior, Facing, TriggerConfig, TriggerEdge};
use craft_content::{FieldValues, Key};
use craft_mapping::HostVersion;
use craft_registry::{Registry, RegistrySnapshot};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use hashbrown::HashMap;
use thiserror::Error;

use crate::arena::{ObjectId, RegionArena};
use crate::handoff::{Detached, HandoffError, Rejected};
use crate::ownership::{OwnershipMap, WorkerId};

#[derive(Clone, Debug)]
pub enum RegionCommand {
    /// Replace the region's contents with what the host has stored.
    Load { region: RegionCoord },
    Save { region: RegionCoord },
    Spawn {
        pos: BlockPos,
        key: Key,
        overrides: FieldValues,
    },
    Interact {
        region: RegionCoord,
        id: ObjectId,
        sneaking: bool,
    },
    /// Neighbour redstone-style signal changed for one object.
    Signal {
        region: RegionCoord,
        id: ObjectId,
        powered: bool,
    },
    Move {
        region: RegionCoord,
        id: ObjectId,
        to: BlockPos,
    },
    Tick { region: RegionCoord },
    Transmit {
        region: RegionCoord,
        client: ClientId,
        viewer: HostVersion,
    },
    /// Stops every worker taking commands. Moves already under way still
    /// finish.
    Shutdown,
}

impl RegionCommand {
    fn region(&self, ownership: &OwnershipMap) -> Option<RegionCoord> {
        match self {
            RegionCommand::Load { region }
            | RegionCommand::Save { region }
            | RegionCommand::Interact { region, .. }
            | RegionCommand::Signal { region, .. }
            | RegionCommand::Move { region, .. }
            | RegionCommand::Tick { region }
            | RegionCommand::Transmit { region, .. } => Some(*region),
            RegionCommand::Spawn { pos, .. } => Some(ownership.region_of(*pos)),
            RegionCommand::Shutdown => None,
        }
    }
}

/// Work a triggered behavior asks the host to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerAction {
    /// Break the block at `target`; it already passed the breaker's filter.
    Break { target: BlockPos },
    /// Move one block item from the container at `source` into the empty
    /// `target`. The host draws only items whose block `filter` allows.
    Place {
        source: BlockPos,
        target: BlockPos,
        filter: TriggerConfig,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub region: RegionCoord,
    pub generation: u64,
    pub native: usize,
    pub custom: usize,
    pub placeholders: usize,
    /// Custom objects whose key has no surrogate under the current snapshot.
    pub stale: Vec<ObjectId>,
    /// Power sources and the signal level they currently emit.
    pub emitting: Vec<(ObjectId, i32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Loaded {
        region: RegionCoord,
        ids: Vec<ObjectId>,
        report: LoadReport,
    },
    Saved {
        region: RegionCoord,
        report: SaveReport,
    },
    Spawned {
        id: ObjectId,
        region: RegionCoord,
    },
    Interacted {
        id: ObjectId,
        power: Option<i32>,
    },
    Signalled {
        id: ObjectId,
        edge: TriggerEdge,
        action: Option<TriggerAction>,
    },
    Moved {
        id: ObjectId,
        from: RegionCoord,
        to: RegionCoord,
    },
    Ticked(TickReport),
    Transmitted {
        region: RegionCoord,
        sent: usize,
    },
    Stopped {
        worker: WorkerId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Instantiate(#[from] InstantiateError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("region {0} is not loaded")]
    NotLoaded(RegionCoord),
    #[error("no object {id} in region {region}")]
    NoSuchObject { id: ObjectId, region: RegionCoord },
    #[error("{id} is not a custom object")]
    NotCustom { id: ObjectId },
    #[error("worker {0} is gone")]
    WorkerGone(WorkerId),
}

pub type CommandResult = Result<Reply, RegionError>;

#[derive(Copy, Clone, Debug)]
pub struct PoolConfig {
    pub workers: usize,
    pub region_size: i32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            region_size: 512,
        }
    }
}

enum WorkerMsg {
    Command(RegionCommand, Sender<CommandResult>),
    /// Second phase of a move, on the destination worker.
    Transfer {
        detached: Detached,
        source: WorkerId,
        reply: Sender<CommandResult>,
    },
    /// Destination refused the object; the source takes it back.
    Return {
        detached: Detached,
        error: HandoffError,
        reply: Sender<CommandResult>,
    },
    /// Acknowledged once every message queued ahead of it has been handled.
    Settle(Sender<WorkerId>),
    Exit,
}

/// Region workers: one thread each, owning a disjoint set of regions.
pub struct RegionPool {
    senders: Vec<Sender<WorkerMsg>>,
    handles: Vec<JoinHandle<()>>,
    ownership: Arc<OwnershipMap>,
}

impl RegionPool {
    pub fn start(
        registry: Arc<Registry>,
        host: Arc<dyn HostAdapter>,
        providers: Arc<Providers>,
        config: PoolConfig,
    ) -> io::Result<RegionPool> {
        Self::with_ownership(
            registry,
            host,
            providers,
            OwnershipMap::new(config.workers, config.region_size),
        )
    }

    pub fn with_ownership(
        registry: Arc<Registry>,
        host: Arc<dyn HostAdapter>,
        providers: Arc<Providers>,
        ownership: OwnershipMap,
    ) -> io::Result<RegionPool> {
        let ownership = Arc::new(ownership);
        let n = ownership.workers();
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..n).map(|_| unbounded()).unzip();
        let next_id = Arc::new(AtomicU64::new(1));

        let mut handles = Vec::with_capacity(n);
        for (id, rx) in receivers.into_iter().enumerate() {
            let worker = Worker {
                id,
                registry: registry.clone(),
                host: host.clone(),
                providers: providers.clone(),
                ownership: ownership.clone(),
                peers: senders.clone(),
                next_id: next_id.clone(),
                arenas: HashMap::new(),
            };
            let handle = thread::Builder::new()
                .name(format!("craft-region-{id}"))
                .spawn(move || worker.run(rx))?;
            handles.push(handle);
        }
        log::info!(
            "started {} region workers, regions {} blocks wide",
            n,
            ownership.region_size()
        );
        Ok(RegionPool {
            senders,
            handles,
            ownership,
        })
    }

    #[inline]
    pub fn ownership(&self) -> &OwnershipMap {
        &self.ownership
    }

    /// Routes `cmd` to the owner of its region. `Shutdown` goes to everyone
    /// and yields one reply per worker.
    pub fn submit(&self, cmd: RegionCommand) -> Receiver<CommandResult> {
        let (tx, rx) = bounded(self.senders.len().max(1));
        match cmd.region(&self.ownership) {
            Some(region) => {
                let worker = self.ownership.owner(region);
                if self.senders[worker]
                    .send(WorkerMsg::Command(cmd, tx.clone()))
                    .is_err()
                {
                    let _ = tx.send(Err(RegionError::WorkerGone(worker)));
                }
            }
            None => {
                for (worker, s) in self.senders.iter().enumerate() {
                    if s.send(WorkerMsg::Command(RegionCommand::Shutdown, tx.clone())).is_err() {
                        let _ = tx.send(Err(RegionError::WorkerGone(worker)));
                    }
                }
            }
        }
        rx
    }

    /// Submits and waits for the reply.
    pub fn call(&self, cmd: RegionCommand) -> CommandResult {
        let worker = cmd
            .region(&self.ownership)
            .map_or(0, |r| self.ownership.owner(r));
        self.submit(cmd)
            .recv()
            .unwrap_or(Err(RegionError::WorkerGone(worker)))
    }

    /// Stops all workers and waits for them.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        // Once every worker has stopped taking commands, all transfers are
        // queued. A settle round lands them; refusals are queued as returns
        // ahead of the exit.
        let replies = self.submit(RegionCommand::Shutdown);
        for _ in 0..self.senders.len() {
            let _ = replies.recv();
        }
        let (done, settled) = bounded(self.senders.len());
        for s in &self.senders {
            let _ = s.send(WorkerMsg::Settle(done.clone()));
        }
        drop(done);
        while settled.recv().is_ok() {}
        for s in &self.senders {
            let _ = s.send(WorkerMsg::Exit);
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("a region worker panicked");
            }
        }
    }
}

impl Drop for RegionPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    id: WorkerId,
    registry: Arc<Registry>,
    host: Arc<dyn HostAdapter>,
    providers: Arc<Providers>,
    ownership: Arc<OwnershipMap>,
    peers: Vec<Sender<WorkerMsg>>,
    next_id: Arc<AtomicU64>,
    arenas: HashMap<RegionCoord, RegionArena>,
}

impl Worker {
    fn run(mut self, rx: Receiver<WorkerMsg>) {
        let mut stopping = false;
        while let Ok(msg) = rx.recv() {
            match msg {
                WorkerMsg::Command(RegionCommand::Shutdown, reply) => {
                    stopping = true;
                    let _ = reply.send(Ok(Reply::Stopped { worker: self.id }));
                }
                WorkerMsg::Command(_, reply) if stopping => {
                    let _ = reply.send(Err(RegionError::WorkerGone(self.id)));
                }
                WorkerMsg::Command(cmd, reply) => {
                    if let Some(result) = self.handle(cmd, &reply) {
                        let _ = reply.send(result);
                    }
                }
                WorkerMsg::Transfer {
                    detached,
                    source,
                    reply,
                } => self.receive(detached, source, reply),
                WorkerMsg::Return {
                    detached,
                    error,
                    reply,
                } => self.restore(detached, error, &reply),
                WorkerMsg::Settle(done) => {
                    let _ = done.send(self.id);
                }
                WorkerMsg::Exit => break,
            }
        }
        log::debug!("region worker {} stopped with {} regions", self.id, self.arenas.len());
    }

    fn allocate_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn arena(&mut self, region: RegionCoord) -> Result<&mut RegionArena, RegionError> {
        self.arenas
            .get_mut(&region)
            .ok_or(RegionError::NotLoaded(region))
    }

    fn custom_mut(
        &mut self,
        region: RegionCoord,
        id: ObjectId,
    ) -> Result<(BlockPos, &mut ObjectInstance), RegionError> {
        let obj = self
            .arena(region)?
            .get_mut(id)
            .ok_or(RegionError::NoSuchObject { id, region })?;
        let pos = obj.pos();
        let instance = obj.as_custom_mut().ok_or(RegionError::NotCustom { id })?;
        Ok((pos, instance))
    }

    /// Runs one command. `None` means the reply travels with a hand-off and
    /// is sent by whichever worker finishes it.
    fn handle(&mut self, cmd: RegionCommand, reply: &Sender<CommandResult>) -> Option<CommandResult> {
        if let RegionCommand::Move { region, id, to } = cmd {
            self.begin_move(region, id, to, reply.clone());
            return None;
        }
        Some(self.apply(cmd))
    }

    fn apply(&mut self, cmd: RegionCommand) -> CommandResult {
        // One snapshot for the whole command.
        let snap = self.registry.snapshot();
        match cmd {
            RegionCommand::Load { region } => self.load(&snap, region),
            RegionCommand::Save { region } => {
                let arena = self.arena(region)?;
                let objects = arena.objects();
                let report = Bridge::new(&*self.host).save(&*snap, region, &objects)?;
                if !report.detached.is_empty() {
                    log::warn!("{}: {} objects saved detached", region, report.detached.len());
                }
                Ok(Reply::Saved { region, report })
            }
            RegionCommand::Spawn {
                pos,
                key,
                overrides,
            } => {
                let instance = Bridge::new(&*self.host).instantiate(&*snap, &key, overrides)?;
                let region = self.ownership.region_of(pos);
                let id = self.allocate_id();
                self.arena(region)?
                    .insert(id, WorldObject::Custom { pos, instance })?;
                Ok(Reply::Spawned { id, region })
            }
            RegionCommand::Interact {
                region,
                id,
                sneaking,
            } => {
                let (_, instance) = self.custom_mut(region, id)?;
                let power = snap
                    .definitions
                    .get(&instance.key)
                    .filter(|def| def.has_behavior("adjustable_power"))
                    .and_then(|def| behavior::cycle_power(&def.schema, &mut instance.values, sneaking));
                Ok(Reply::Interacted { id, power })
            }
            RegionCommand::Signal { region, id, powered } => {
                let (pos, instance) = self.custom_mut(region, id)?;
                let Some(trigger) = snap
                    .definitions
                    .get(&instance.key)
                    .and_then(|def| def.behaviors.iter().find(|b| b.trigger().is_some()))
                else {
                    return Ok(Reply::Signalled {
                        id,
                        edge: TriggerEdge::None,
                        action: None,
                    });
                };
                let edge = behavior::neighbor_signal(&mut instance.values, powered);
                let facing = behavior::facing(&instance.values);
                let action = match (edge, facing) {
                    (TriggerEdge::Rising, Some(f)) => self.plan_trigger(id, trigger, pos, f)?,
                    _ => None,
                };
                Ok(Reply::Signalled { id, edge, action })
            }
            RegionCommand::Tick { region } => {
                let version = self.host.version();
                let arena = self.arena(region)?;
                let mut report = TickReport {
                    region,
                    generation: snap.generation,
                    ..TickReport::default()
                };
                for (id, obj) in arena.iter() {
                    match obj {
                        WorldObject::Native(_) => report.native += 1,
                        WorldObject::Placeholder { .. } => report.placeholders += 1,
                        WorldObject::Custom { instance, .. } => {
                            report.custom += 1;
                            let powered = snap
                                .definitions
                                .get(&instance.key)
                                .is_some_and(|def| def.has_behavior("adjustable_power"));
                            if powered {
                                report.emitting.push((id, behavior::signal(&instance.values)));
                            }
                            let mapped = snap
                                .table(version)
                                .is_some_and(|t| t.resolve(&instance.key).is_ok());
                            if !mapped {
                                report.stale.push(id);
                            }
                        }
                    }
                }
                report.stale.sort_unstable();
                report.emitting.sort_unstable();
                Ok(Reply::Ticked(report))
            }
            RegionCommand::Transmit {
                region,
                client,
                viewer,
            } => {
                let objects = self.arena(region)?.objects();
                let sent = Bridge::new(&*self.host).transmit(
                    &*snap,
                    client,
                    viewer,
                    &objects,
                    &self.providers,
                )?;
                Ok(Reply::Transmitted { region, sent })
            }
            RegionCommand::Move { region, .. } => Err(RegionError::NotLoaded(region)),
            RegionCommand::Shutdown => Ok(Reply::Stopped { worker: self.id }),
        }
    }

    /// Block at `pos`: a custom object in a region this worker holds, else
    /// whatever the host reports.
    fn block_at(&self, pos: BlockPos) -> Result<Option<Key>, RegionError> {
        let region = self.ownership.region_of(pos);
        let local = self
            .arenas
            .get(&region)
            .and_then(|a| a.object_at(pos))
            .and_then(|o| o.key().cloned());
        match local {
            Some(key) => Ok(Some(key)),
            None => Ok(self.host.block_at(pos)?),
        }
    }

    /// What a rising edge does, or `None` when the faced block is refused.
    fn plan_trigger(
        &self,
        id: ObjectId,
        trigger: &Behavior,
        pos: BlockPos,
        facing: Facing,
    ) -> Result<Option<TriggerAction>, RegionError> {
        let (dx, dy, dz) = facing.offset();
        let target = pos.offset(dx, dy, dz);
        let block = self.block_at(target)?;
        if !trigger.accepts_target(block.as_ref()) {
            log::debug!(
                "{} {} refused target {} ({})",
                trigger.name(),
                id,
                target,
                block.as_ref().map_or("air", |k| k.as_str())
            );
            return Ok(None);
        }
        Ok(match trigger {
            Behavior::Breaker(_) => Some(TriggerAction::Break { target }),
            Behavior::Placer(filter) => {
                let (sx, sy, sz) = facing.opposite().offset();
                Some(TriggerAction::Place {
                    source: pos.offset(sx, sy, sz),
                    target,
                    filter: filter.clone(),
                })
            }
            Behavior::AdjustablePower => None,
        })
    }

    fn load(&mut self, snap: &RegistrySnapshot, region: RegionCoord) -> CommandResult {
        let (objects, report) = Bridge::new(&*self.host).load(snap, region)?;
        let tagged: Vec<(ObjectId, WorldObject)> = objects
            .into_iter()
            .map(|o| (self.allocate_id(), o))
            .collect();
        let ids = tagged.iter().map(|(id, _)| *id).collect();
        let size = self.ownership.region_size();
        self.arenas
            .entry(region)
            .or_insert_with(|| RegionArena::new(region, size))
            .replace(tagged);
        Ok(Reply::Loaded {
            region,
            ids,
            report,
        })
    }

    /// First phase: detach here, then attach locally or on the owner of `to`.
    fn begin_move(&mut self, region: RegionCoord, id: ObjectId, to: BlockPos, reply: Sender<CommandResult>) {
        let snap = self.registry.snapshot();
        let detached = match self
            .arena(region)
            .and_then(|a| a.detach(id, &snap).map_err(RegionError::from))
        {
            Ok(d) => d.retarget(to),
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let (_, dest) = self.ownership.owner_of(to);
        if dest == self.id {
            self.receive(detached, self.id, reply);
            return;
        }
        if let Err(err) = self.peers[dest].send(WorkerMsg::Transfer {
            detached,
            source: self.id,
            reply: reply.clone(),
        }) {
            let WorkerMsg::Transfer { detached, .. } = err.into_inner() else {
                return;
            };
            self.restore(detached, HandoffError::NotLoaded(self.ownership.region_of(to)), &reply);
        }
    }

    /// Second phase on the destination worker.
    fn receive(&mut self, detached: Detached, source: WorkerId, reply: Sender<CommandResult>) {
        let snap = self.registry.snapshot();
        let from = self.ownership.region_of(detached.origin());
        let to = self.ownership.region_of(detached.pos());
        let outcome = match self.arenas.get_mut(&to) {
            Some(arena) => arena.attach(detached, &snap),
            None => Err(Rejected {
                detached,
                error: HandoffError::NotLoaded(to),
            }),
        };
        match outcome {
            Ok(id) => {
                log::debug!("{} moved {} -> {}", id, from, to);
                let _ = reply.send(Ok(Reply::Moved { id, from, to }));
            }
            Err(Rejected { detached, error }) if source == self.id => {
                self.restore(detached, error, &reply);
            }
            Err(Rejected { detached, error }) => {
                let back = WorkerMsg::Return {
                    detached,
                    error,
                    reply,
                };
                if self.peers[source].send(back).is_err() {
                    log::error!("worker {} is gone, object lost in hand-off", source);
                }
            }
        }
    }

    /// Puts a refused object back where it came from and reports the refusal.
    /// It was valid there before the move, so it goes back unchecked.
    fn restore(&mut self, detached: Detached, error: HandoffError, reply: &Sender<CommandResult>) {
        let origin = detached.origin();
        let region = self.ownership.region_of(origin);
        let (id, object) = detached.retarget(origin).into_parts();
        let restored = match self.arenas.get_mut(&region) {
            Some(arena) => arena.insert(id, object),
            None => Err(HandoffError::NotLoaded(region)),
        };
        if let Err(again) = restored {
            log::error!("{} could not return to {}: {}", id, region, again);
        } else {
            log::warn!("move of {} refused, kept in {}: {}", id, region, error);
        }
        let _ = reply.send(Err(RegionError::Handoff(error)));
    }
}
