use craft_content::{
    ContentDefinition, DefinitionSet, FieldType, FieldValue, FieldValues, Key, ScalarType,
    SchemaViolation,
};
use craft_mapping::{MappingTable, SurrogateMapping, UnmappedKey};
use thiserror::Error;

use crate::instance::{ObjectInstance, SurrogateBytes};
use crate::nbt::{self, Compound, NbtError, Tag};

/// Top-level compound that marks a record as custom content.
pub const MARKER: &str = "craft";

const ID: &str = "id";
const STATE: &str = "state";
const KEY: &str = "key";
const PACKED: &str = "packed";
const DATA: &str = "data";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record truncated at byte {at} ({needed} more bytes needed)")]
    Truncated { at: usize, needed: usize },
    #[error("{key}: record does not match schema: {reason}")]
    SchemaMismatch { key: Key, reason: String },
    #[error("no active definition behind {native}[{state}] (marker key {key:?})")]
    UnknownSurrogate {
        native: String,
        state: u32,
        key: Option<Key>,
    },
    #[error("malformed record: {reason}")]
    Malformed { reason: String },
}

impl From<NbtError> for DecodeError {
    fn from(e: NbtError) -> Self {
        match e {
            NbtError::Truncated { at, needed } => DecodeError::Truncated { at, needed },
            NbtError::Malformed { .. } => DecodeError::Malformed {
                reason: e.to_string(),
            },
        }
    }
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("instance of {found} encoded against the mapping for {expected}")]
    KeyMismatch { expected: Key, found: Key },
    #[error("{key}: {source}")]
    Schema { key: Key, source: SchemaViolation },
    #[error("{key}: packed state {packed} lies outside its surrogate range")]
    StateOutOfRange { key: Key, packed: u32 },
    #[error(transparent)]
    Unmapped(#[from] UnmappedKey),
    #[error("{key} is not an active definition")]
    UnknownDefinition { key: Key },
}

/// A record the active snapshot cannot interpret. The original bytes are kept
/// untouched and written back verbatim on save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownObject {
    pub bytes: SurrogateBytes,
    pub reason: DecodeError,
}

impl UnknownObject {
    /// The custom key named in the record's marker, when it got that far.
    pub fn key(&self) -> Option<&Key> {
        match &self.reason {
            DecodeError::UnknownSurrogate { key, .. } => key.as_ref(),
            DecodeError::SchemaMismatch { key, .. } => Some(key),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    Custom(ObjectInstance),
    Placeholder(UnknownObject),
}

impl Decoded {
    #[inline]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Decoded::Placeholder(_))
    }

    /// Placeholders return their original bytes exactly.
    pub fn encode(&self, codec: &SurrogateCodec<'_>) -> Result<SurrogateBytes, EncodeError> {
        match self {
            Decoded::Custom(instance) => codec.encode(instance),
            Decoded::Placeholder(unknown) => Ok(unknown.bytes.clone()),
        }
    }
}

/// Cheap check for the custom marker. Unparseable input is not custom.
pub fn has_marker(bytes: &[u8]) -> bool {
    nbt::has_compound_entry(bytes, MARKER).unwrap_or(false)
}

fn scalar_tag_id(ty: &ScalarType) -> u8 {
    match ty {
        ScalarType::Bool => nbt::BYTE,
        ScalarType::Int { .. } => nbt::INT,
        ScalarType::Enum { .. } | ScalarType::Text { .. } => nbt::STRING,
    }
}

fn value_tag(value: &FieldValue, elem: Option<u8>) -> Tag {
    match value {
        FieldValue::Bool(b) => Tag::Byte(*b as i8),
        FieldValue::Int(v) => Tag::Int(*v),
        FieldValue::Enum(s) | FieldValue::Text(s) => Tag::String(s.clone()),
        FieldValue::List(items) => {
            let tags: Vec<Tag> = items.iter().map(|v| value_tag(v, None)).collect();
            let elem = elem
                .or_else(|| tags.first().map(Tag::id))
                .unwrap_or(nbt::END);
            Tag::List(elem, tags)
        }
    }
}

fn scalar_value(ty: &ScalarType, tag: &Tag) -> Option<FieldValue> {
    match (ty, tag) {
        (ScalarType::Bool, Tag::Byte(0)) => Some(FieldValue::Bool(false)),
        (ScalarType::Bool, Tag::Byte(1)) => Some(FieldValue::Bool(true)),
        (ScalarType::Int { .. }, Tag::Int(v)) => Some(FieldValue::Int(*v)),
        (ScalarType::Enum { .. }, Tag::String(s)) => Some(FieldValue::Enum(s.clone())),
        (ScalarType::Text { .. }, Tag::String(s)) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn field_value(ty: &FieldType, tag: &Tag) -> Option<FieldValue> {
    match (ty, tag) {
        (FieldType::Scalar(s), t) => scalar_value(s, t),
        (FieldType::List { of, .. }, Tag::List(_, items)) => items
            .iter()
            .map(|t| scalar_value(of, t))
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::List),
        _ => None,
    }
}

fn record(native: &str, state: u32, key: &Key, packed: u32, data: Compound) -> SurrogateBytes {
    let marker = Compound::new()
        .with(KEY, Tag::String(key.as_str().to_string()))
        .with(PACKED, Tag::Int(packed as i32))
        .with(DATA, Tag::Compound(data));
    let root = Compound::new()
        .with(ID, Tag::String(native.to_string()))
        .with(STATE, Tag::Int(state as i32))
        .with(MARKER, Tag::Compound(marker));
    SurrogateBytes::new(nbt::write_root("", &root))
}

/// Encodes `instance` onto `mapping`: state fields are packed into the native
/// state, text and list fields travel in the marker's data compound.
pub fn encode(
    instance: &ObjectInstance,
    definition: &ContentDefinition,
    mapping: &SurrogateMapping,
) -> Result<SurrogateBytes, EncodeError> {
    if mapping.key != instance.key || definition.key != instance.key {
        return Err(EncodeError::KeyMismatch {
            expected: mapping.key.clone(),
            found: instance.key.clone(),
        });
    }
    let schema = &definition.schema;
    let schema_err = |source| EncodeError::Schema {
        key: instance.key.clone(),
        source,
    };
    schema.validate(&instance.values).map_err(schema_err)?;
    let packed = schema.pack(&instance.values).map_err(schema_err)?;
    let state = mapping
        .native_state(packed)
        .ok_or_else(|| EncodeError::StateOutOfRange {
            key: instance.key.clone(),
            packed,
        })?;
    let mut data = Compound::new();
    for spec in schema.data_fields() {
        if let Some(v) = instance.values.get(&spec.name) {
            data.insert(
                spec.name.clone(),
                value_tag(v, Some(scalar_tag_id(spec.ty.element()))),
            );
        }
    }
    Ok(record(mapping.native(), state, &instance.key, packed, data))
}

/// Encodes an object whose key has no surrogate under `fallback_native`.
/// Every field is kept in the data compound so the object decodes again once
/// its definition is mapped.
pub fn encode_detached(instance: &ObjectInstance, fallback_native: &str) -> SurrogateBytes {
    let mut data = Compound::new();
    for (name, v) in &instance.values {
        data.insert(name.clone(), value_tag(v, None));
    }
    record(fallback_native, 0, &instance.key, 0, data)
}

/// Codec bound to one definition set and the mapping table built from it.
#[derive(Clone, Copy)]
pub struct SurrogateCodec<'a> {
    definitions: &'a DefinitionSet,
    table: &'a MappingTable,
}

impl<'a> SurrogateCodec<'a> {
    pub fn new(definitions: &'a DefinitionSet, table: &'a MappingTable) -> Self {
        Self { definitions, table }
    }

    #[inline]
    pub fn table(&self) -> &'a MappingTable {
        self.table
    }

    #[inline]
    pub fn definitions(&self) -> &'a DefinitionSet {
        self.definitions
    }

    pub fn encode(&self, instance: &ObjectInstance) -> Result<SurrogateBytes, EncodeError> {
        let def = self
            .definitions
            .get(&instance.key)
            .ok_or_else(|| EncodeError::UnknownDefinition {
                key: instance.key.clone(),
            })?;
        let mapping = self.table.resolve(&instance.key)?;
        encode(instance, def, mapping)
    }

    pub fn encode_detached(&self, instance: &ObjectInstance) -> SurrogateBytes {
        encode_detached(instance, self.table.fallback())
    }

    /// Strict decode. Marked records resolve by their key; unmarked records
    /// fall back to a reverse lookup of the native id and state.
    pub fn decode(&self, bytes: &SurrogateBytes) -> Result<ObjectInstance, DecodeError> {
        let (_, root) = nbt::read_root(bytes.as_slice())?;
        let native = match root.get(ID) {
            Some(Tag::String(s)) => s.as_str(),
            _ => return Err(malformed("missing string entry 'id'")),
        };
        let state = match root.get(STATE) {
            Some(Tag::Int(v)) => *v as u32,
            _ => return Err(malformed("missing int entry 'state'")),
        };
        match root.get(MARKER) {
            Some(Tag::Compound(marker)) => self.decode_marked(native, state, marker),
            Some(_) => Err(malformed("marker entry is not a compound")),
            None => self.decode_unmarked(native, state),
        }
    }

    /// Decode that never fails: anything uninterpretable becomes a placeholder.
    pub fn decode_lenient(&self, bytes: &SurrogateBytes) -> Decoded {
        match self.decode(bytes) {
            Ok(instance) => Decoded::Custom(instance),
            Err(reason) => {
                log::debug!("{}: keeping record as placeholder: {}", self.table.version(), reason);
                Decoded::Placeholder(UnknownObject {
                    bytes: bytes.clone(),
                    reason,
                })
            }
        }
    }

    fn decode_marked(
        &self,
        native: &str,
        state: u32,
        marker: &Compound,
    ) -> Result<ObjectInstance, DecodeError> {
        let key: Key = match marker.get(KEY) {
            Some(Tag::String(s)) => s
                .parse()
                .map_err(|e| malformed(format!("marker key: {e}")))?,
            _ => return Err(malformed("marker has no string 'key'")),
        };
        let packed = match marker.get(PACKED) {
            Some(Tag::Int(v)) => *v as u32,
            _ => return Err(malformed("marker has no int 'packed'")),
        };
        let data = match marker.get(DATA) {
            Some(Tag::Compound(c)) => Some(c),
            None => None,
            Some(_) => return Err(malformed("marker data is not a compound")),
        };
        let unknown = || DecodeError::UnknownSurrogate {
            native: native.to_string(),
            state,
            key: Some(key.clone()),
        };
        let def = self.definitions.get(&key).ok_or_else(unknown)?;
        if self.table.resolve(&key).is_err() {
            return Err(unknown());
        }
        let values = rebuild_values(def, packed, data)?;
        Ok(ObjectInstance::new(key, values))
    }

    fn decode_unmarked(&self, native: &str, state: u32) -> Result<ObjectInstance, DecodeError> {
        let unknown = || DecodeError::UnknownSurrogate {
            native: native.to_string(),
            state,
            key: None,
        };
        let mapping = self.table.by_surrogate(native, state).ok_or_else(unknown)?;
        let def = self.definitions.get(&mapping.key).ok_or_else(unknown)?;
        let packed = mapping.packed_for(state).ok_or_else(unknown)?;
        let values = rebuild_values(def, packed, None)?;
        Ok(ObjectInstance::new(mapping.key.clone(), values))
    }
}

/// Rebuilds field values: data entries win, then packed state, then defaults.
fn rebuild_values(
    def: &ContentDefinition,
    packed: u32,
    data: Option<&Compound>,
) -> Result<FieldValues, DecodeError> {
    let mismatch = |reason: String| DecodeError::SchemaMismatch {
        key: def.key.clone(),
        reason,
    };
    let schema = &def.schema;
    let state_values = schema.unpack(packed).map_err(|e| mismatch(e.to_string()))?;
    let mut out = FieldValues::new();
    if let Some(data) = data {
        for (name, tag) in data.iter() {
            let spec = schema
                .field(name)
                .ok_or_else(|| mismatch(format!("unexpected field '{name}'")))?;
            let v = field_value(&spec.ty, tag)
                .ok_or_else(|| mismatch(format!("field '{name}' carries tag {}", tag.id())))?;
            out.insert(name.to_string(), v);
        }
    }
    for spec in schema.fields() {
        if out.contains_key(&spec.name) {
            continue;
        }
        let v = state_values
            .get(&spec.name)
            .cloned()
            .unwrap_or_else(|| spec.default.clone());
        out.insert(spec.name.clone(), v);
    }
    schema.validate(&out).map_err(|e| mismatch(e.to_string()))?;
    Ok(out)
}
