//! Group records and their display colour.

use std::fmt;
use std::str::FromStr;

/// Cooldown value meaning "do not override the inherited or command cooldown".
pub const NO_COOLDOWN_OVERRIDE: i32 = -1;

/// Display colour of a group. Opaque to the authorization logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parses `#RRGGBB` (the leading `#` is optional).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(format!("Invalid colour: {s}"));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| format!("Invalid colour: {s}"))
        };

        Ok(Color::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// A named, inheritable bundle of permissions, chat decorations and cooldown.
///
/// All collections hold the group's *own* entries only. Inherited values are
/// computed on demand by [`GroupGraph::resolve_effective`](crate::GroupGraph::resolve_effective).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: String,
    name: String,
    is_default: bool,
    cooldown: i32,
    color: Option<Color>,
    permissions: Vec<String>,
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    inherits: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_default: false,
            cooldown: NO_COOLDOWN_OVERRIDE,
            color: None,
            permissions: Vec::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            inherits: Vec::new(),
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_cooldown(mut self, cooldown: i32) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_color(mut self, color: Option<Color>) -> Self {
        self.color = color;
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.add_permission(permission);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.add_prefix(prefix);
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.add_suffix(suffix);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn cooldown(&self) -> i32 {
        self.cooldown
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Parent group ids, in declaration order.
    pub fn inherits(&self) -> &[String] {
        &self.inherits
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_default(&mut self, is_default: bool) {
        self.is_default = is_default;
    }

    pub fn set_cooldown(&mut self, cooldown: i32) {
        self.cooldown = cooldown;
    }

    pub fn set_color(&mut self, color: Option<Color>) {
        self.color = color;
    }

    /// Adds a permission. Returns false if it was already present.
    pub fn add_permission(&mut self, permission: impl Into<String>) -> bool {
        push_unique(&mut self.permissions, permission.into())
    }

    pub fn remove_permission(&mut self, permission: &str) -> bool {
        remove_entry(&mut self.permissions, permission)
    }

    pub fn add_prefix(&mut self, prefix: impl Into<String>) -> bool {
        push_unique(&mut self.prefixes, prefix.into())
    }

    pub fn remove_prefix(&mut self, prefix: &str) -> bool {
        remove_entry(&mut self.prefixes, prefix)
    }

    pub fn add_suffix(&mut self, suffix: impl Into<String>) -> bool {
        push_unique(&mut self.suffixes, suffix.into())
    }

    pub fn remove_suffix(&mut self, suffix: &str) -> bool {
        remove_entry(&mut self.suffixes, suffix)
    }

    // Edges are only ever added through the graph, which checks for cycles first.
    pub(crate) fn push_inherit(&mut self, parent: &str) {
        self.inherits.push(parent.to_string());
    }

    pub(crate) fn remove_inherit(&mut self, parent: &str) -> bool {
        remove_entry(&mut self.inherits, parent)
    }
}

fn push_unique(entries: &mut Vec<String>, value: String) -> bool {
    if entries.contains(&value) {
        return false;
    }
    entries.push(value);
    true
}

fn remove_entry(entries: &mut Vec<String>, value: &str) -> bool {
    let before = entries.len();
    entries.retain(|entry| entry != value);
    entries.len() != before
}
