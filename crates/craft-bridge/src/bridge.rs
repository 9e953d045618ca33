use std::collections::BTreeMap;

use craft_codec::{DecodeError, Decoded, ObjectInstance, SurrogateCodec, UnknownObject, has_marker};
use craft_compat::{CapabilityRequest, CapabilityResponse, Providers, well_known};
use craft_content::{ContentDefinition, ContentKind, FieldValue, FieldValues, Key, SchemaViolation};
use craft_mapping::{HostVersion, UnmappedKey};
use thiserror::Error;

use crate::host::{ClientId, HostAdapter, HostError, NativeRecord};
use crate::pos::{BlockPos, RegionCoord};
use crate::report::{LoadReport, ObjectFailure, SaveReport};
use crate::wire::{ModelRef, WireDescriptor};

/// Read access to one consistent registry snapshot.
pub trait SurrogateView {
    /// Codec for `version`, or `None` when that version has no active table.
    fn codec(&self, version: HostVersion) -> Option<SurrogateCodec<'_>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("host version {0} has no active mapping table")]
    InactiveVersion(HostVersion),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstantiateError {
    #[error("host version {0} has no active mapping table")]
    InactiveVersion(HostVersion),
    #[error("{key} is not an active definition")]
    UnknownDefinition { key: Key },
    #[error(transparent)]
    Unmapped(#[from] UnmappedKey),
    #[error("{key}: {source}")]
    Schema { key: Key, source: SchemaViolation },
}

/// An object in the world model as seen through the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorldObject {
    /// Host-native object, passed through untouched.
    Native(NativeRecord),
    Custom {
        pos: BlockPos,
        instance: ObjectInstance,
    },
    Placeholder {
        pos: BlockPos,
        unknown: UnknownObject,
    },
}

impl WorldObject {
    pub fn pos(&self) -> BlockPos {
        match self {
            WorldObject::Native(r) => r.pos,
            WorldObject::Custom { pos, .. } | WorldObject::Placeholder { pos, .. } => *pos,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            WorldObject::Native(_) => None,
            WorldObject::Custom { instance, .. } => Some(&instance.key),
            WorldObject::Placeholder { unknown, .. } => unknown.key(),
        }
    }

    pub fn as_custom_mut(&mut self) -> Option<&mut ObjectInstance> {
        match self {
            WorldObject::Custom { instance, .. } => Some(instance),
            _ => None,
        }
    }
}

/// Decodes host records. A record that cannot be interpreted degrades to a
/// placeholder; the batch always completes.
pub fn decode_records(
    codec: &SurrogateCodec<'_>,
    records: Vec<NativeRecord>,
) -> (Vec<WorldObject>, LoadReport) {
    let mut report = LoadReport::default();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let pos = record.pos;
        let decoded = if has_marker(record.payload.as_slice()) {
            codec.decode_lenient(&record.payload)
        } else {
            // Unmarked records are ours only when their native state falls
            // inside a surrogate range.
            match codec.decode(&record.payload) {
                Ok(instance) => Decoded::Custom(instance),
                Err(reason @ DecodeError::SchemaMismatch { .. }) => {
                    Decoded::Placeholder(UnknownObject {
                        bytes: record.payload.clone(),
                        reason,
                    })
                }
                Err(_) => {
                    report.native += 1;
                    out.push(WorldObject::Native(record));
                    continue;
                }
            }
        };
        match decoded {
            Decoded::Custom(instance) => {
                report.custom += 1;
                out.push(WorldObject::Custom { pos, instance });
            }
            Decoded::Placeholder(unknown) => {
                log::warn!("object at {} loaded as placeholder: {}", pos, unknown.reason);
                report.placeholders.push(ObjectFailure {
                    pos,
                    key: unknown.key().cloned(),
                    reason: unknown.reason.to_string(),
                });
                out.push(WorldObject::Placeholder { pos, unknown });
            }
        }
    }
    (out, report)
}

/// Encodes world objects for the host. Placeholders are written back with
/// their original bytes; custom objects that no longer encode are detached
/// onto the fallback native with their key and fields intact.
pub fn encode_objects(
    codec: &SurrogateCodec<'_>,
    objects: &[WorldObject],
) -> (Vec<NativeRecord>, SaveReport) {
    let mut report = SaveReport::default();
    let mut out = Vec::with_capacity(objects.len());
    for obj in objects {
        let record = match obj {
            WorldObject::Native(r) => {
                report.native += 1;
                r.clone()
            }
            WorldObject::Placeholder { pos, unknown } => {
                report.preserved += 1;
                NativeRecord {
                    pos: *pos,
                    payload: unknown.bytes.clone(),
                }
            }
            WorldObject::Custom { pos, instance } => match codec.encode(instance) {
                Ok(payload) => {
                    report.custom += 1;
                    NativeRecord { pos: *pos, payload }
                }
                Err(e) => {
                    log::warn!("object {} at {} saved detached: {}", instance.key, pos, e);
                    report.detached.push(ObjectFailure {
                        pos: *pos,
                        key: Some(instance.key.clone()),
                        reason: e.to_string(),
                    });
                    NativeRecord {
                        pos: *pos,
                        payload: codec.encode_detached(instance),
                    }
                }
            },
        };
        out.push(record);
    }
    (out, report)
}

fn external_renderers(def: &ContentDefinition) -> Vec<&str> {
    let declared: Vec<&str> = def
        .requires
        .iter()
        .map(String::as_str)
        .filter(|c| *c == well_known::MODEL_ENGINE || *c == well_known::BETTER_MODEL)
        .collect();
    if declared.is_empty() {
        vec![well_known::MODEL_ENGINE, well_known::BETTER_MODEL]
    } else {
        declared
    }
}

fn model_ref(
    def: &ContentDefinition,
    state: u32,
    viewer: HostVersion,
    providers: &Providers,
) -> ModelRef {
    if let Some(external) = &def.appearance.external {
        let request = CapabilityRequest::ResolveModel {
            key: def.key.to_string(),
            model: external.clone(),
        };
        for cap in external_renderers(def) {
            match providers.delegate(cap, &request) {
                Ok(CapabilityResponse::Model { model }) => return ModelRef::External { model },
                Ok(other) => log::debug!("{}: {} answered {:?}", def.key, cap, other),
                Err(e) => log::debug!("{}: {}", def.key, e),
            }
        }
    }
    let model = def.appearance.model.clone();
    match def.kind {
        ContentKind::Item if viewer.has_item_model_component() => ModelRef::ItemModel { model },
        ContentKind::Item => ModelRef::CustomModelData(state),
        ContentKind::Block | ContentKind::Furniture => ModelRef::Block { model },
    }
}

fn expand_text(text: &str, providers: &Providers) -> String {
    if !text.contains('%') {
        return text.to_string();
    }
    let request = CapabilityRequest::ExpandText {
        text: text.to_string(),
    };
    match providers.delegate(well_known::PLACEHOLDER, &request) {
        Ok(CapabilityResponse::Text { text }) => text,
        _ => text.to_string(),
    }
}

fn describe_custom(
    codec: &SurrogateCodec<'_>,
    pos: BlockPos,
    instance: &ObjectInstance,
    viewer: HostVersion,
    providers: &Providers,
) -> Option<WireDescriptor> {
    let def = codec.definitions().get(&instance.key)?;
    let mapping = codec.table().resolve(&instance.key).ok()?;
    let packed = def.schema.pack(&instance.values).ok()?;
    let state = mapping.native_state(packed)?;
    let mut text = BTreeMap::new();
    for spec in def.schema.data_fields() {
        if let Some(FieldValue::Text(s)) = instance.values.get(&spec.name) {
            text.insert(spec.name.clone(), expand_text(s, providers));
        }
    }
    Some(WireDescriptor {
        pos,
        native: mapping.native().to_string(),
        state,
        model: Some(model_ref(def, state, viewer, providers)),
        text,
    })
}

fn fallback_descriptor(codec: &SurrogateCodec<'_>, pos: BlockPos) -> WireDescriptor {
    WireDescriptor {
        pos,
        native: codec.table().fallback().to_string(),
        state: 0,
        model: None,
        text: BTreeMap::new(),
    }
}

/// Stateless intercept layer over one host adapter. Every call takes the
/// snapshot to work against; nothing is retained between calls.
pub struct Bridge<'h, H: HostAdapter + ?Sized> {
    host: &'h H,
}

impl<'h, H: HostAdapter + ?Sized> Bridge<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self { host }
    }

    #[inline]
    pub fn version(&self) -> HostVersion {
        self.host.version()
    }

    fn codec<'v, V: SurrogateView + ?Sized>(
        &self,
        view: &'v V,
    ) -> Result<SurrogateCodec<'v>, BridgeError> {
        let version = self.host.version();
        view.codec(version)
            .ok_or(BridgeError::InactiveVersion(version))
    }

    /// Load path: host deserialization, then surrogate decode per record.
    pub fn load<V: SurrogateView + ?Sized>(
        &self,
        view: &V,
        region: RegionCoord,
    ) -> Result<(Vec<WorldObject>, LoadReport), BridgeError> {
        let codec = self.codec(view)?;
        let records = self.host.read_region(region)?;
        let (objects, report) = decode_records(&codec, records);
        log::debug!(
            "{}: loaded {} native, {} custom, {} placeholders",
            region,
            report.native,
            report.custom,
            report.placeholders.len()
        );
        Ok((objects, report))
    }

    /// Save path: encode per object, then the host's own persistence call.
    pub fn save<V: SurrogateView + ?Sized>(
        &self,
        view: &V,
        region: RegionCoord,
        objects: &[WorldObject],
    ) -> Result<SaveReport, BridgeError> {
        let codec = self.codec(view)?;
        let (records, report) = encode_objects(&codec, objects);
        self.host.write_region(region, records)?;
        Ok(report)
    }

    /// Network path: outgoing descriptors for a client on `viewer`. Native
    /// objects are left to the host. Authoritative state is only read.
    pub fn describe<V: SurrogateView + ?Sized>(
        &self,
        view: &V,
        objects: &[WorldObject],
        viewer: HostVersion,
        providers: &Providers,
    ) -> Vec<WireDescriptor> {
        // A viewer without its own table is served through protocol translation.
        let Some(codec) = view.codec(viewer).or_else(|| view.codec(self.host.version())) else {
            log::warn!("no mapping table for viewer {} or host {}", viewer, self.host.version());
            return Vec::new();
        };
        let mut out = Vec::new();
        for obj in objects {
            match obj {
                WorldObject::Native(_) => {}
                WorldObject::Placeholder { pos, .. } => out.push(fallback_descriptor(&codec, *pos)),
                WorldObject::Custom { pos, instance } => {
                    match describe_custom(&codec, *pos, instance, viewer, providers) {
                        Some(d) => out.push(d),
                        None => {
                            log::debug!("{} at {} has no surrogate for {}", instance.key, pos, viewer);
                            out.push(fallback_descriptor(&codec, *pos));
                        }
                    }
                }
            }
        }
        out
    }

    /// Describes `objects` and hands them to the host's transmission call.
    pub fn transmit<V: SurrogateView + ?Sized>(
        &self,
        view: &V,
        client: ClientId,
        viewer: HostVersion,
        objects: &[WorldObject],
        providers: &Providers,
    ) -> Result<usize, BridgeError> {
        let descriptors = self.describe(view, objects, viewer, providers);
        let n = descriptors.len();
        self.host.send(client, descriptors)?;
        Ok(n)
    }

    /// Runtime instantiation: schema defaults overlaid with `overrides`.
    pub fn instantiate<V: SurrogateView + ?Sized>(
        &self,
        view: &V,
        key: &Key,
        overrides: FieldValues,
    ) -> Result<ObjectInstance, InstantiateError> {
        let version = self.host.version();
        let codec = view
            .codec(version)
            .ok_or(InstantiateError::InactiveVersion(version))?;
        let def = codec
            .definitions()
            .get(key)
            .ok_or_else(|| InstantiateError::UnknownDefinition { key: key.clone() })?;
        codec.table().resolve(key)?;
        let values = def
            .schema
            .complete(overrides)
            .map_err(|source| InstantiateError::Schema {
                key: key.clone(),
                source,
            })?;
        Ok(ObjectInstance::new(key.clone(), values))
    }
}
