use crate::behavior::Behavior;
use crate::config::{AppearanceDef, FlagsDef};
use crate::key::Key;
use crate::schema::Schema;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentKind {
    Block,
    Item,
    Furniture,
}

impl ContentKind {
    pub fn parse(s: &str) -> Option<ContentKind> {
        match s {
            "block" => Some(ContentKind::Block),
            "item" => Some(ContentKind::Item),
            "furniture" => Some(ContentKind::Furniture),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Block => "block",
            ContentKind::Item => "item",
            ContentKind::Furniture => "furniture",
        }
    }

    /// Surrogate family used when a definition does not name one.
    pub fn default_family(self) -> &'static str {
        match self {
            ContentKind::Block => "note_block",
            ContentKind::Item => "item_model",
            ContentKind::Furniture => "display_entity",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Appearance {
    pub model: String,
    pub texture: Option<String>,
    pub external: Option<String>,
}

impl Appearance {
    pub(crate) fn from_def(key: &Key, def: Option<AppearanceDef>) -> Appearance {
        let def = def.unwrap_or_default();
        Appearance {
            model: def
                .model
                .unwrap_or_else(|| format!("{}:{}", key.namespace(), key.path())),
            texture: def.texture,
            external: def.external,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BehaviorFlags {
    pub solid: bool,
    pub transparent: bool,
    pub emits_light: bool,
    pub interactive: bool,
    pub ticking: bool,
}

impl BehaviorFlags {
    pub(crate) fn from_def(kind: ContentKind, def: Option<FlagsDef>) -> BehaviorFlags {
        let def = def.unwrap_or_default();
        let solid = def.solid.unwrap_or(kind == ContentKind::Block);
        BehaviorFlags {
            solid,
            transparent: def.transparent.unwrap_or(!solid),
            emits_light: def.emits_light.unwrap_or(false),
            interactive: def.interactive.unwrap_or(false),
            ticking: def.ticking.unwrap_or(false),
        }
    }
}

/// Immutable description of one custom content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDefinition {
    pub key: Key,
    pub kind: ContentKind,
    pub family: String,
    pub schema: Schema,
    pub appearance: Appearance,
    pub flags: BehaviorFlags,
    pub behaviors: Vec<Behavior>,
    pub requires: Vec<String>,
    /// Name of the source the definition was declared in.
    pub origin: String,
}

impl ContentDefinition {
    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.iter().any(|b| b.name() == name)
    }
}
