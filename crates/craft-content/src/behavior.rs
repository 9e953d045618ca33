use std::collections::HashSet;

use crate::config::BehaviorDef;
use crate::key::Key;
use crate::schema::{FieldType, FieldValue, FieldValues, ScalarType, Schema};

pub const POWER_FIELD: &str = "power";
pub const FACING_FIELD: &str = "facing";
pub const TRIGGERED_FIELD: &str = "triggered";

/// Host blocks that triggerable behaviors never touch unless a list is given.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "minecraft:bedrock",
    "minecraft:end_portal_frame",
    "minecraft:end_portal",
    "minecraft:nether_portal",
    "minecraft:barrier",
    "minecraft:command_block",
    "minecraft:chain_command_block",
    "minecraft:repeating_command_block",
    "minecraft:structure_block",
    "minecraft:end_gateway",
    "minecraft:jigsaw",
    "minecraft:structure_void",
    "minecraft:moving_piston",
    "minecraft:light",
];

/// Host blocks that count as empty space.
pub const AIR: &[&str] = &["minecraft:air", "minecraft:cave_air", "minecraft:void_air"];

/// `None` is how a host reports an empty position.
pub fn is_air(block: Option<&Key>) -> bool {
    block.is_none_or(|k| AIR.contains(&k.as_str()))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Facing {
    North,
    South,
    West,
    East,
    Up,
    Down,
}

impl Facing {
    pub fn parse(s: &str) -> Option<Facing> {
        Some(match s {
            "north" => Facing::North,
            "south" => Facing::South,
            "west" => Facing::West,
            "east" => Facing::East,
            "up" => Facing::Up,
            "down" => Facing::Down,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Facing::North => "north",
            Facing::South => "south",
            Facing::West => "west",
            Facing::East => "east",
            Facing::Up => "up",
            Facing::Down => "down",
        }
    }

    pub fn opposite(self) -> Facing {
        match self {
            Facing::North => Facing::South,
            Facing::South => Facing::North,
            Facing::West => Facing::East,
            Facing::East => Facing::West,
            Facing::Up => Facing::Down,
            Facing::Down => Facing::Up,
        }
    }

    #[inline]
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Facing::North => (0, 0, -1),
            Facing::South => (0, 0, 1),
            Facing::West => (-1, 0, 0),
            Facing::East => (1, 0, 0),
            Facing::Up => (0, 1, 0),
            Facing::Down => (0, -1, 0),
        }
    }
}

/// Which neighbouring host blocks a triggered behavior may act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerConfig {
    pub whitelist: bool,
    pub targets: HashSet<Key>,
}

impl TriggerConfig {
    fn compile(whitelist: bool, blocks: &[String]) -> Result<TriggerConfig, String> {
        let mut targets = HashSet::with_capacity(blocks.len());
        for raw in blocks {
            targets.insert(Key::host(raw).map_err(|e| e.to_string())?);
        }
        if targets.is_empty() && !whitelist {
            for raw in DEFAULT_BLACKLIST {
                targets.insert(Key::host(raw).map_err(|e| e.to_string())?);
            }
        }
        Ok(TriggerConfig { whitelist, targets })
    }

    #[inline]
    pub fn allows(&self, target: &Key) -> bool {
        self.targets.contains(target) == self.whitelist
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Emits a signal equal to `power`; interaction cycles the level.
    AdjustablePower,
    /// On a rising signal, breaks the block it faces.
    Breaker(TriggerConfig),
    /// On a rising signal, places a block from behind into the block it faces.
    Placer(TriggerConfig),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerEdge {
    None,
    Rising,
    Falling,
}

fn require_int(schema: &Schema, name: &str, behavior: &str) -> Result<(), String> {
    match schema.field(name).map(|f| &f.ty) {
        Some(FieldType::Scalar(ScalarType::Int { .. })) => Ok(()),
        _ => Err(format!("behavior '{behavior}' needs an int field '{name}'")),
    }
}

fn require_bool(schema: &Schema, name: &str, behavior: &str) -> Result<(), String> {
    match schema.field(name).map(|f| &f.ty) {
        Some(FieldType::Scalar(ScalarType::Bool)) => Ok(()),
        _ => Err(format!("behavior '{behavior}' needs a bool field '{name}'")),
    }
}

fn require_facing(schema: &Schema, behavior: &str) -> Result<(), String> {
    match schema.field(FACING_FIELD).map(|f| &f.ty) {
        Some(FieldType::Scalar(ScalarType::Enum { values })) => {
            if let Some(bad) = values.iter().find(|v| Facing::parse(v).is_none()) {
                return Err(format!(
                    "behavior '{behavior}': '{FACING_FIELD}' value '{bad}' is not a direction"
                ));
            }
            Ok(())
        }
        _ => Err(format!(
            "behavior '{behavior}' needs an enum field '{FACING_FIELD}'"
        )),
    }
}

impl Behavior {
    /// Validates a behavior against the schema it will operate on.
    pub fn compile(def: &BehaviorDef, schema: &Schema) -> Result<Behavior, String> {
        match def {
            BehaviorDef::AdjustablePower => {
                require_int(schema, POWER_FIELD, "adjustable_power")?;
                Ok(Behavior::AdjustablePower)
            }
            BehaviorDef::Breaker { whitelist, blocks } => {
                require_facing(schema, "breaker")?;
                require_bool(schema, TRIGGERED_FIELD, "breaker")?;
                Ok(Behavior::Breaker(TriggerConfig::compile(*whitelist, blocks)?))
            }
            BehaviorDef::Placer { whitelist, blocks } => {
                require_facing(schema, "placer")?;
                require_bool(schema, TRIGGERED_FIELD, "placer")?;
                Ok(Behavior::Placer(TriggerConfig::compile(*whitelist, blocks)?))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Behavior::AdjustablePower => "adjustable_power",
            Behavior::Breaker(_) => "breaker",
            Behavior::Placer(_) => "placer",
        }
    }

    pub fn trigger(&self) -> Option<&TriggerConfig> {
        match self {
            Behavior::Breaker(t) | Behavior::Placer(t) => Some(t),
            Behavior::AdjustablePower => None,
        }
    }

    /// Whether a rising edge may act on the faced block. A breaker needs a
    /// solid target its filter allows; a placer needs empty space (its filter
    /// applies to the item drawn from behind, which only the host can see).
    pub fn accepts_target(&self, block: Option<&Key>) -> bool {
        match self {
            Behavior::Breaker(t) => !is_air(block) && block.is_some_and(|k| t.allows(k)),
            Behavior::Placer(_) => is_air(block),
            Behavior::AdjustablePower => false,
        }
    }
}

/// Steps `power` up (or down when sneaking), wrapping at the range ends.
pub fn cycle_power(schema: &Schema, values: &mut FieldValues, sneaking: bool) -> Option<i32> {
    let Some(FieldType::Scalar(ScalarType::Int { min, max })) =
        schema.field(POWER_FIELD).map(|f| &f.ty)
    else {
        return None;
    };
    let current = values.get(POWER_FIELD)?.as_int()?;
    let next = if sneaking {
        if current <= *min { *max } else { current - 1 }
    } else if current >= *max {
        *min
    } else {
        current + 1
    };
    values.insert(POWER_FIELD.to_string(), FieldValue::Int(next));
    Some(next)
}

pub fn signal(values: &FieldValues) -> i32 {
    values
        .get(POWER_FIELD)
        .and_then(FieldValue::as_int)
        .unwrap_or(0)
}

pub fn facing(values: &FieldValues) -> Option<Facing> {
    values
        .get(FACING_FIELD)
        .and_then(FieldValue::as_str)
        .and_then(Facing::parse)
}

/// Records the neighbour signal in `triggered` and reports the edge.
pub fn neighbor_signal(values: &mut FieldValues, powered: bool) -> TriggerEdge {
    let triggered = values
        .get(TRIGGERED_FIELD)
        .and_then(FieldValue::as_bool)
        .unwrap_or(false);
    match (powered, triggered) {
        (true, false) => {
            values.insert(TRIGGERED_FIELD.to_string(), FieldValue::Bool(true));
            TriggerEdge::Rising
        }
        (false, true) => {
            values.insert(TRIGGERED_FIELD.to_string(), FieldValue::Bool(false));
            TriggerEdge::Falling
        }
        _ => TriggerEdge::None,
    }
}
