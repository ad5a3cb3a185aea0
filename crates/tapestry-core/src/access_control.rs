//! §4.4/§3 access control ingest: principal-id namespacing helpers and the
//! optional membership graph a driver may emit alongside its entities.
//! Expanding a group principal into its members is the retrieval engine's
//! concern (out of scope here); this only normalizes what a driver writes.

use crate::driver::AccessControlMembership;
use crate::entity::AccessControl;
use std::collections::{HashMap, HashSet};

/// Namespaced principal-id constructors, matching the kinds named in the
/// glossary (`user:`, `group:sp:`, `group:ad:`).
pub mod principal {
    pub fn user(login: &str) -> String {
        format!("user:{login}")
    }

    pub fn sharepoint_group(id: &str) -> String {
        format!("group:sp:{id}")
    }

    pub fn active_directory_group(login_name: &str) -> String {
        format!("group:ad:{login_name}")
    }
}

/// When both `viewers` and `is_public` are unset/empty, an entity has no
/// ACL and is visible to anyone in the organization.
pub fn has_acl(access: &AccessControl) -> bool {
    access.is_public || !access.viewers.is_empty()
}

/// The unexpanded membership graph a driver emits via
/// `generate_access_control_memberships`. Kept as plain edges; nothing
/// here computes transitive closure.
#[derive(Debug, Default)]
pub struct MembershipGraph {
    /// group_id -> direct members
    edges: HashMap<String, HashSet<(String, String)>>,
}

impl MembershipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, membership: AccessControlMembership) {
        self.edges
            .entry(membership.group_id)
            .or_default()
            .insert((membership.member_id, membership.member_type));
    }

    pub fn direct_members(&self, group_id: &str) -> Vec<(&str, &str)> {
        self.edges
            .get(group_id)
            .map(|set| set.iter().map(|(id, kind)| (id.as_str(), kind.as_str())))
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn group_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_with_no_viewers_and_not_public_has_no_acl() {
        let access = AccessControl {
            viewers: vec![],
            is_public: false,
        };
        assert!(!has_acl(&access));
    }

    #[test]
    fn membership_graph_groups_by_group_id() {
        let mut graph = MembershipGraph::new();
        graph.add(AccessControlMembership {
            member_id: principal::user("alice"),
            member_type: "user".to_string(),
            group_id: principal::active_directory_group(r"DOM\grp"),
            group_name: "grp".to_string(),
        });
        assert_eq!(graph.group_count(), 1);
        assert_eq!(
            graph.direct_members(&principal::active_directory_group(r"DOM\grp")).len(),
            1
        );
    }
}
