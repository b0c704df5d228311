//! Persisted form of the group graph.
//!
//! Groups are stored as one JSON object keyed by group id:
//!
//! ```json
//! {
//!   "Admin": {
//!     "Name": "Admin Group",
//!     "Default": false,
//!     "Permissions": ["unturned.commands.admin.*"],
//!     "Prefixes": ["Admin"],
//!     "Suffixes": ["Admin"],
//!     "Inherits": ["Guest"],
//!     "Cooldown": 0,
//!     "Color": "#0000FF"
//!   }
//! }
//! ```
//!
//! List fields also accept a bare string, which hand-edited files often use
//! for a single entry.

use crate::error::GroupError;
use crate::graph::GroupGraph;
use crate::group::{Color, Group, NO_COOLDOWN_OVERRIDE};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::warn;

const NO_COLOR: &str = "none";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    default: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    permissions: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    prefixes: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    suffixes: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    inherits: Vec<String>,
    #[serde(default = "default_cooldown")]
    cooldown: i32,
    #[serde(default = "default_color")]
    color: String,
}

fn default_cooldown() -> i32 {
    NO_COOLDOWN_OVERRIDE
}

fn default_color() -> String {
    NO_COLOR.to_string()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
        OneOrMany::Null(()) => Vec::new(),
    })
}

impl GroupDocument {
    fn from_group(group: &Group) -> Self {
        Self {
            name: Some(group.name().to_string()),
            default: group.is_default(),
            permissions: group.permissions().to_vec(),
            prefixes: group.prefixes().to_vec(),
            suffixes: group.suffixes().to_vec(),
            inherits: group.inherits().to_vec(),
            cooldown: group.cooldown(),
            color: group
                .color()
                .map(|color| color.to_string())
                .unwrap_or_else(default_color),
        }
    }
}

impl From<GroupDocument> for Value {
    fn from(doc: GroupDocument) -> Self {
        let mut fields = Map::new();
        fields.insert("Name".into(), doc.name.map_or(Value::Null, Value::from));
        fields.insert("Default".into(), doc.default.into());
        fields.insert("Permissions".into(), doc.permissions.into());
        fields.insert("Prefixes".into(), doc.prefixes.into());
        fields.insert("Suffixes".into(), doc.suffixes.into());
        fields.insert("Inherits".into(), doc.inherits.into());
        fields.insert("Cooldown".into(), doc.cooldown.into());
        fields.insert("Color".into(), doc.color.into());
        Value::Object(fields)
    }
}

impl GroupGraph {
    /// Builds a graph from a persisted groups document.
    ///
    /// All groups are created first, then edges are added, so a group may
    /// inherit one declared after it. Edges naming an unknown group or
    /// closing a cycle are skipped with a warning rather than failing the
    /// whole document.
    pub fn from_document(document: &Value) -> Result<Self, GroupError> {
        let entries = document.as_object().ok_or_else(|| {
            GroupError::MalformedDocument("groups document must be a JSON object".to_string())
        })?;

        let mut parsed = Vec::with_capacity(entries.len());
        for (id, value) in entries {
            let doc: GroupDocument = serde_json::from_value(value.clone())
                .map_err(|e| GroupError::MalformedDocument(format!("group {id}: {e}")))?;
            parsed.push((id.as_str(), doc));
        }

        let mut graph = GroupGraph::new();
        for (id, doc) in &parsed {
            let color = if doc.color.eq_ignore_ascii_case(NO_COLOR) {
                None
            } else {
                match doc.color.parse::<Color>() {
                    Ok(color) => Some(color),
                    Err(e) => {
                        warn!("Group {}: {}, using no colour", id, e);
                        None
                    }
                }
            };

            let mut group = Group::new(*id, doc.name.clone().unwrap_or_else(|| id.to_string()))
                .with_default(doc.default)
                .with_cooldown(doc.cooldown)
                .with_color(color);
            for permission in &doc.permissions {
                group.add_permission(permission.as_str());
            }
            for prefix in &doc.prefixes {
                group.add_prefix(prefix.as_str());
            }
            for suffix in &doc.suffixes {
                group.add_suffix(suffix.as_str());
            }
            graph.add_group(group)?;
        }

        for (id, doc) in &parsed {
            for parent in &doc.inherits {
                if let Err(e) = graph.add_inherit(id, parent) {
                    warn!("Skipping inheritance {} -> {}: {}", id, parent, e);
                }
            }
        }

        Ok(graph)
    }

    /// Serializes every group into the persisted document shape.
    pub fn to_document(&self) -> Value {
        let entries: Map<String, Value> = self
            .groups()
            .map(|group| (group.id().to_string(), GroupDocument::from_group(group).into()))
            .collect();
        Value::Object(entries)
    }
}
