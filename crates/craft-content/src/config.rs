use serde::Deserialize;

// One content file: any number of [[content]] tables.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ContentFile {
    #[serde(default)]
    pub content: Vec<ContentDef>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContentDef {
    pub key: String,
    #[serde(default)]
    pub kind: Option<String>,
    // Surrogate family override (e.g. "tripwire" instead of the kind default)
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub appearance: Option<AppearanceDef>,
    #[serde(default)]
    pub flags: Option<FlagsDef>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorDef>,
    // Capability names this definition cannot work without
    #[serde(default)]
    pub requires: Vec<String>,
}

// Field type is a flat table so that nested element specs (and mistakes
// like a list of lists) can be reported instead of failing the parse.
#[derive(Deserialize, Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub of: Option<Box<ElementDef>>,
    #[serde(default)]
    pub default: Option<toml::Value>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ElementDef {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub of: Option<Box<ElementDef>>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct AppearanceDef {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub texture: Option<String>,
    // Model served by an external renderer; pairs with `requires`
    #[serde(default)]
    pub external: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, Default)]
pub struct FlagsDef {
    #[serde(default)]
    pub solid: Option<bool>,
    #[serde(default)]
    pub transparent: Option<bool>,
    #[serde(default)]
    pub emits_light: Option<bool>,
    #[serde(default)]
    pub interactive: Option<bool>,
    #[serde(default)]
    pub ticking: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BehaviorDef {
    AdjustablePower,
    Breaker {
        #[serde(default)]
        whitelist: bool,
        #[serde(default)]
        blocks: Vec<String>,
    },
    Placer {
        #[serde(default)]
        whitelist: bool,
        #[serde(default)]
        blocks: Vec<String>,
    },
}
