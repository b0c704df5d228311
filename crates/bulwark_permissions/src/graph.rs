//! The permission group graph and effective-attribute resolution.

use crate::error::GroupError;
use crate::group::{Color, Group, NO_COOLDOWN_OVERRIDE};
use std::collections::{HashMap, HashSet};

/// Permission entry that grants every permission.
pub const ALL_PERMISSIONS: &str = "*";

/// Inheritance-flattened attributes of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveGroup {
    /// Own permissions first, then each ancestor's in traversal order, without duplicates
    pub permissions: Vec<String>,
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
    /// Resolved cooldown, `-1` when neither the group nor any ancestor overrides it
    pub cooldown: i32,
}

impl EffectiveGroup {
    /// Checks a permission against the resolved set.
    ///
    /// An entry matches when it is identical to `permission`, when it ends in
    /// `*` and the part before the `*` is a literal prefix of `permission`, or
    /// when it is the global [`ALL_PERMISSIONS`] wildcard.
    pub fn permits(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|entry| permission_matches(entry, permission))
    }
}

fn permission_matches(entry: &str, permission: &str) -> bool {
    if entry == ALL_PERMISSIONS || entry == permission {
        return true;
    }
    match entry.strip_suffix('*') {
        Some(stem) => permission.starts_with(stem),
        None => false,
    }
}

/// Directed inheritance graph of named permission groups.
///
/// Groups are kept in insertion order. Edges point from a child to the
/// parents it inherits from and are validated on insertion, so the graph is
/// acyclic at all times and resolution never has to detect cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupGraph {
    groups: Vec<Group>,
    index: HashMap<String, usize>,
}

impl GroupGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The graph written on first run: a default `Guest` group and an
    /// `Admin` group that inherits it.
    pub fn bootstrap() -> Self {
        let guest = Group::new("Guest", "Guest Group")
            .with_default(true)
            .with_cooldown(NO_COOLDOWN_OVERRIDE)
            .with_permission("unturned.commands.nonadmin.*")
            .with_prefix("Guest")
            .with_suffix("Guest");

        let mut admin = Group::new("Admin", "Admin Group")
            .with_cooldown(0)
            .with_color(Some(Color::BLUE))
            .with_permission("unturned.commands.admin.*")
            .with_prefix("Admin")
            .with_suffix("Admin");
        admin.push_inherit("Guest");

        let mut graph = Self {
            groups: vec![guest, admin],
            index: HashMap::new(),
        };
        graph.reindex();
        graph
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn group(&self, id: &str) -> Option<&Group> {
        self.index.get(id).map(|&i| &self.groups[i])
    }

    /// All groups, in insertion order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// The first group flagged as default, if any.
    pub fn default_group(&self) -> Option<&Group> {
        self.groups.iter().find(|group| group.is_default())
    }

    pub fn add_group(&mut self, mut group: Group) -> Result<(), GroupError> {
        if self.contains(group.id()) {
            return Err(GroupError::DuplicateId(group.id().to_string()));
        }

        // Edges can only be added through `add_inherit`.
        let parents: Vec<String> = group.inherits().to_vec();
        for parent in &parents {
            group.remove_inherit(parent);
        }

        self.index.insert(group.id().to_string(), self.groups.len());
        self.groups.push(group);
        Ok(())
    }

    /// Removes a group and every edge that pointed at it.
    pub fn remove_group(&mut self, id: &str) -> Result<Group, GroupError> {
        let position = self
            .index
            .remove(id)
            .ok_or_else(|| GroupError::UnknownGroup(id.to_string()))?;

        let removed = self.groups.remove(position);
        for group in &mut self.groups {
            group.remove_inherit(id);
        }
        self.reindex();
        Ok(removed)
    }

    /// Adds `parent` to the inheritance list of `group`.
    ///
    /// Fails with [`GroupError::Cycle`] on a self-loop or when `group` is
    /// already reachable from `parent`, and with [`GroupError::DuplicateEdge`]
    /// when the edge exists. The graph is untouched on failure.
    pub fn add_inherit(&mut self, group: &str, parent: &str) -> Result<(), GroupError> {
        let child_index = self.position(group)?;
        self.position(parent)?;

        if group == parent || self.is_reachable(parent, group) {
            return Err(GroupError::Cycle {
                group: group.to_string(),
                parent: parent.to_string(),
            });
        }
        if self.groups[child_index].inherits().iter().any(|p| p == parent) {
            return Err(GroupError::DuplicateEdge {
                group: group.to_string(),
                parent: parent.to_string(),
            });
        }

        self.groups[child_index].push_inherit(parent);
        Ok(())
    }

    /// Removes an inheritance edge. Returns false if it did not exist.
    pub fn remove_inherit(&mut self, group: &str, parent: &str) -> Result<bool, GroupError> {
        let index = self.position(group)?;
        Ok(self.groups[index].remove_inherit(parent))
    }

    pub fn add_permission(&mut self, group: &str, permission: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.add_permission(permission))
    }

    pub fn remove_permission(&mut self, group: &str, permission: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.remove_permission(permission))
    }

    pub fn add_prefix(&mut self, group: &str, prefix: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.add_prefix(prefix))
    }

    pub fn remove_prefix(&mut self, group: &str, prefix: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.remove_prefix(prefix))
    }

    pub fn add_suffix(&mut self, group: &str, suffix: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.add_suffix(suffix))
    }

    pub fn remove_suffix(&mut self, group: &str, suffix: &str) -> Result<bool, GroupError> {
        Ok(self.group_mut(group)?.remove_suffix(suffix))
    }

    pub fn set_cooldown(&mut self, group: &str, cooldown: i32) -> Result<(), GroupError> {
        self.group_mut(group)?.set_cooldown(cooldown);
        Ok(())
    }

    /// Flattens the inheritance of `id` into its effective attributes.
    ///
    /// Depth-first, own group first, parents in declaration order. Each
    /// ancestor is visited once, so a diamond contributes its shared root a
    /// single time.
    pub fn resolve_effective(&self, id: &str) -> Result<EffectiveGroup, GroupError> {
        self.position(id)?;

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.visit(id, &mut visited, &mut order);

        let mut seen_permissions = HashSet::new();
        let mut effective = EffectiveGroup {
            permissions: Vec::new(),
            prefixes: Vec::new(),
            suffixes: Vec::new(),
            cooldown: NO_COOLDOWN_OVERRIDE,
        };

        for group in order {
            for permission in group.permissions() {
                if seen_permissions.insert(permission.as_str()) {
                    effective.permissions.push(permission.clone());
                }
            }
            effective.prefixes.extend(group.prefixes().iter().cloned());
            effective.suffixes.extend(group.suffixes().iter().cloned());
            if effective.cooldown == NO_COOLDOWN_OVERRIDE {
                effective.cooldown = group.cooldown();
            }
        }

        Ok(effective)
    }

    /// Whether `group` holds `permission`. Unknown groups hold nothing.
    pub fn has_permission(&self, group: &str, permission: &str) -> bool {
        self.resolve_effective(group)
            .map(|effective| effective.permits(permission))
            .unwrap_or(false)
    }

    fn visit<'a>(&'a self, id: &str, visited: &mut HashSet<&'a str>, order: &mut Vec<&'a Group>) {
        let Some(group) = self.group(id) else {
            return;
        };
        if !visited.insert(group.id()) {
            return;
        }
        order.push(group);
        for parent in group.inherits() {
            self.visit(parent, visited, order);
        }
    }

    fn is_reachable(&self, from: &str, target: &str) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(group) = self.group(current) {
                stack.extend(group.inherits().iter().map(String::as_str));
            }
        }
        false
    }

    fn position(&self, id: &str) -> Result<usize, GroupError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| GroupError::UnknownGroup(id.to_string()))
    }

    fn group_mut(&mut self, id: &str) -> Result<&mut Group, GroupError> {
        let index = self.position(id)?;
        Ok(&mut self.groups[index])
    }

    fn reindex(&mut self) {
        self.index = self
            .groups
            .iter()
            .enumerate()
            .map(|(i, group)| (group.id().to_string(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> GroupGraph {
        let mut graph = GroupGraph::new();
        graph
            .add_group(Group::new("A", "Root").with_permission("a.read").with_prefix("[A]"))
            .unwrap();
        graph
            .add_group(Group::new("B", "Left").with_permission("b.read"))
            .unwrap();
        graph
            .add_group(Group::new("C", "Right").with_permission("c.read").with_cooldown(7))
            .unwrap();
        graph
            .add_group(Group::new("D", "Bottom").with_permission("d.read"))
            .unwrap();
        graph.add_inherit("B", "A").unwrap();
        graph.add_inherit("C", "A").unwrap();
        graph.add_inherit("D", "B").unwrap();
        graph.add_inherit("D", "C").unwrap();
        graph
    }

    #[test]
    fn test_duplicate_group_id_rejected() {
        let mut graph = GroupGraph::new();
        graph.add_group(Group::new("Guest", "Guest")).unwrap();
        let err = graph.add_group(Group::new("Guest", "Other")).unwrap_err();
        assert_eq!(err, GroupError::DuplicateId("Guest".to_string()));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.group("Guest").unwrap().name(), "Guest");
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = diamond();
        let before = graph.clone();
        let err = graph.add_inherit("A", "A").unwrap_err();
        assert!(matches!(err, GroupError::Cycle { .. }));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() {
        let mut graph = diamond();
        let before = graph.clone();

        // A is an ancestor of D, so D cannot become a parent of A.
        let err = graph.add_inherit("A", "D").unwrap_err();
        assert!(err.is_integrity_error());
        assert!(matches!(err, GroupError::Cycle { .. }));
        assert_eq!(graph, before);

        let err = graph.add_inherit("A", "B").unwrap_err();
        assert!(matches!(err, GroupError::Cycle { .. }));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = diamond();
        let err = graph.add_inherit("D", "B").unwrap_err();
        assert_eq!(
            err,
            GroupError::DuplicateEdge {
                group: "D".to_string(),
                parent: "B".to_string()
            }
        );
        assert_eq!(graph.group("D").unwrap().inherits(), ["B", "C"]);
    }

    #[test]
    fn test_inherit_unknown_group() {
        let mut graph = diamond();
        assert_eq!(
            graph.add_inherit("D", "Z").unwrap_err(),
            GroupError::UnknownGroup("Z".to_string())
        );
        assert_eq!(
            graph.add_inherit("Z", "D").unwrap_err(),
            GroupError::UnknownGroup("Z".to_string())
        );
    }

    #[test]
    fn test_diamond_resolves_root_once() {
        let graph = diamond();
        let effective = graph.resolve_effective("D").unwrap();

        assert_eq!(effective.permissions, ["d.read", "b.read", "a.read", "c.read"]);
        assert_eq!(
            effective.permissions.iter().filter(|p| *p == "a.read").count(),
            1
        );
        assert_eq!(effective.prefixes, ["[A]"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let graph = diamond();
        let first = graph.resolve_effective("D").unwrap();
        for _ in 0..5 {
            assert_eq!(graph.resolve_effective("D").unwrap(), first);
        }
    }

    #[test]
    fn test_cooldown_resolution() {
        let mut graph = diamond();

        // D and B do not override, A does not either, C does.
        assert_eq!(graph.resolve_effective("D").unwrap().cooldown, 7);

        graph.set_cooldown("A", 3).unwrap();
        // Traversal order is D, B, A, C: A is found first.
        assert_eq!(graph.resolve_effective("D").unwrap().cooldown, 3);

        graph.set_cooldown("D", 0).unwrap();
        assert_eq!(graph.resolve_effective("D").unwrap().cooldown, 0);

        assert_eq!(graph.resolve_effective("B").unwrap().cooldown, 3);
    }

    #[test]
    fn test_prefixes_own_first() {
        let mut graph = diamond();
        graph.add_prefix("D", "[D]").unwrap();
        graph.add_suffix("B", "(b)").unwrap();
        let effective = graph.resolve_effective("D").unwrap();
        assert_eq!(effective.prefixes, ["[D]", "[A]"]);
        assert_eq!(effective.suffixes, ["(b)"]);
    }

    #[test]
    fn test_wildcard_matching() {
        let mut graph = GroupGraph::new();
        graph
            .add_group(Group::new("Mod", "Moderators").with_permission("admin.kick.*"))
            .unwrap();
        graph
            .add_group(Group::new("Owner", "Owner").with_permission(ALL_PERMISSIONS))
            .unwrap();

        assert!(graph.has_permission("Mod", "admin.kick.player"));
        assert!(graph.has_permission("Mod", "admin.kick."));
        assert!(!graph.has_permission("Mod", "admin.kick"));
        assert!(!graph.has_permission("Mod", "admin.ban"));
        assert!(graph.has_permission("Owner", "anything.at.all"));
        assert!(!graph.has_permission("Nobody", "admin.kick.player"));
    }

    #[test]
    fn test_bootstrap_groups() {
        let graph = GroupGraph::bootstrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.default_group().unwrap().id(), "Guest");

        let admin = graph.group("Admin").unwrap();
        assert_eq!(admin.permissions(), ["unturned.commands.admin.*"]);
        assert_eq!(admin.inherits(), ["Guest"]);
        assert_eq!(admin.color(), Some(Color::BLUE));

        assert!(graph.has_permission("Admin", "unturned.commands.admin.spy"));
        assert!(!graph.has_permission("Guest", "unturned.commands.admin.spy"));
        assert!(graph.has_permission("Admin", "unturned.commands.nonadmin.help"));
        assert_eq!(graph.resolve_effective("Admin").unwrap().cooldown, 0);
        assert_eq!(graph.resolve_effective("Guest").unwrap().cooldown, -1);

        let ids: Vec<&str> = graph.groups().map(|group| group.id()).collect();
        assert_eq!(ids, ["Guest", "Admin"]);
        let mut graph = graph;
        assert!(matches!(
            graph.add_group(Group::new("Guest", "Again")),
            Err(GroupError::DuplicateId(_))
        ));
        assert!(matches!(
            graph.add_inherit("Admin", "Guest"),
            Err(GroupError::DuplicateEdge { .. })
        ));
        assert!(matches!(
            graph.add_inherit("Guest", "Admin"),
            Err(GroupError::Cycle { .. })
        ));
    }

    #[test]
    fn test_remove_group_strips_edges() {
        let mut graph = diamond();
        graph.remove_group("B").unwrap();

        assert!(!graph.contains("B"));
        assert_eq!(graph.group("D").unwrap().inherits(), ["C"]);
        assert_eq!(
            graph.resolve_effective("D").unwrap().permissions,
            ["d.read", "c.read", "a.read"]
        );
        assert!(matches!(
            graph.remove_group("B"),
            Err(GroupError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_add_group_ignores_preset_edges() {
        let mut graph = GroupGraph::new();
        let mut group = Group::new("X", "X");
        group.push_inherit("X");
        graph.add_group(group).unwrap();
        assert!(graph.group("X").unwrap().inherits().is_empty());
    }
}
