//! §3/§9: the entity sum type each driver emits, and the deterministic
//! identity/content-hash functions used to dedupe and decide what changed
//! between two syncs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A reference to a parent entity, carried so a child (e.g. a comment) can
/// be resolved back to the object it belongs to without a second fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub entity_id: String,
    pub name: String,
    pub entity_type: String,
}

/// Who may see this entity in search results, as reported by the source.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessControl {
    pub viewers: Vec<String>,
    pub is_public: bool,
}

impl AccessControl {
    pub fn visible_to(&self, principal_ids: &[String]) -> bool {
        self.is_public || principal_ids.iter().any(|p| self.viewers.contains(p))
    }
}

/// Bookkeeping attached to an entity as it moves through ingestion. Every
/// field is optional because it is filled in progressively: a driver sets
/// `source_name`/`entity_type` at emission time, the sync runner fills
/// `sync_id`/`sync_job_id`/`hash`, and the vector store fills
/// `db_entity_id`/`db_created_at`/`db_updated_at` once the point exists.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntityMetadata {
    pub source_name: Option<String>,
    pub entity_type: Option<String>,
    pub sync_id: Option<Uuid>,
    pub sync_job_id: Option<Uuid>,
    pub hash: Option<String>,
    pub chunk_index: Option<u32>,
    pub original_entity_id: Option<String>,
    pub db_entity_id: Option<Uuid>,
    pub db_created_at: Option<DateTime<Utc>>,
    pub db_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseFields {
    pub entity_id: String,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// The text a driver wants embedded; distinct from any field used for
    /// display.
    pub textual_representation: String,
    pub metadata: EntityMetadata,
    pub access: AccessControl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFields {
    pub url: Option<String>,
    pub size: Option<u64>,
    pub file_type: Option<String>,
    pub mime_type: Option<String>,
    pub local_path: Option<String>,
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFileFields {
    pub repo_name: String,
    pub path_in_repo: String,
    pub repo_owner: Option<String>,
    pub language: Option<String>,
    pub commit_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymorphicFields {
    pub table_name: String,
    pub schema_name: Option<String>,
    pub primary_key_columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStatus {
    Deleted,
    PermissionRevoked,
}

/// Every entity shape a driver can emit, per the §9 redesign note replacing
/// a class-inheritance entity hierarchy with a closed sum type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Base(BaseFields),
    File {
        base: BaseFields,
        file: FileFields,
    },
    CodeFile {
        base: BaseFields,
        file: FileFields,
        code: CodeFileFields,
    },
    Polymorphic {
        base: BaseFields,
        table: PolymorphicFields,
    },
    Email {
        base: BaseFields,
        file: FileFields,
    },
    Web {
        base: BaseFields,
        crawl_url: String,
    },
    Deletion {
        base: BaseFields,
        status: DeletionStatus,
    },
}

impl Entity {
    pub fn base(&self) -> &BaseFields {
        match self {
            Entity::Base(b)
            | Entity::File { base: b, .. }
            | Entity::CodeFile { base: b, .. }
            | Entity::Polymorphic { base: b, .. }
            | Entity::Email { base: b, .. }
            | Entity::Web { base: b, .. }
            | Entity::Deletion { base: b, .. } => b,
        }
    }

    pub fn base_mut(&mut self) -> &mut BaseFields {
        match self {
            Entity::Base(b)
            | Entity::File { base: b, .. }
            | Entity::CodeFile { base: b, .. }
            | Entity::Polymorphic { base: b, .. }
            | Entity::Email { base: b, .. }
            | Entity::Web { base: b, .. }
            | Entity::Deletion { base: b, .. } => b,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.base().entity_id
    }

    /// Content hash over the fields that matter for change detection: the
    /// textual representation plus name. A driver re-emitting the same
    /// entity unchanged produces the same hash, which is how the sync
    /// runner tells `kept` from `updated` without refetching from the
    /// destination.
    pub fn content_hash(&self) -> String {
        let base = self.base();
        let mut hasher = Sha256::new();
        hasher.update(base.entity_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(base.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(base.textual_representation.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Stable point identity, derived the same way regardless of how many
    /// times this entity is re-synced: a version-5 UUID namespaced under
    /// the logical entity's relational-store id (`db_entity_id`) and keyed
    /// by this entity's source-assigned id. Stable across re-embeddings of
    /// the same logical entity, which is what makes upsert-by-id
    /// idempotent.
    pub fn point_id(&self, db_entity_id: Uuid) -> Uuid {
        Uuid::new_v5(&db_entity_id, self.entity_id().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entity {
        Entity::Base(BaseFields {
            entity_id: "abc".to_string(),
            breadcrumbs: vec![],
            name: "Doc".to_string(),
            created_at: None,
            updated_at: None,
            textual_representation: "hello world".to_string(),
            metadata: EntityMetadata::default(),
            access: AccessControl::default(),
        })
    }

    #[test]
    fn content_hash_is_stable_across_unrelated_metadata_changes() {
        let mut a = sample();
        let b = sample();
        assert_eq!(a.content_hash(), b.content_hash());

        a.base_mut().metadata.sync_job_id = Some(Uuid::new_v4());
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_changes_with_text() {
        let mut a = sample();
        a.base_mut().textual_representation = "different".to_string();
        assert_ne!(a.content_hash(), sample().content_hash());
    }

    #[test]
    fn point_id_is_deterministic_per_db_entity() {
        let db_entity_id = Uuid::new_v4();
        let a = sample().point_id(db_entity_id);
        let b = sample().point_id(db_entity_id);
        assert_eq!(a, b);

        let other_db_entity_id = Uuid::new_v4();
        assert_ne!(a, sample().point_id(other_db_entity_id));
    }

    #[test]
    fn access_control_visibility() {
        let private = AccessControl {
            viewers: vec!["user:1".to_string()],
            is_public: false,
        };
        assert!(private.visible_to(&["user:1".to_string()]));
        assert!(!private.visible_to(&["user:2".to_string()]));

        let public = AccessControl {
            viewers: vec![],
            is_public: true,
        };
        assert!(public.visible_to(&["anyone".to_string()]));
    }
}
