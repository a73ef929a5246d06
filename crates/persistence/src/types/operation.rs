//! Staged operations, resource references and uniqueness constraints.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::TransactionId;

/// The two resource kinds a transaction can span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A binary object in object storage.
    Object,
    /// A JSON document in the document store.
    Document,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Object => write!(f, "object"),
            ResourceKind::Document => write!(f, "document"),
        }
    }
}

/// Identifies one concrete resource.
///
/// The display form (`object:bucket/key`, `document:collection/id`) is the
/// key used in rollback status maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceRef {
    /// An object in a bucket.
    Object { bucket: String, key: String },
    /// A document in a collection.
    Document { collection: String, id: String },
}

impl ResourceRef {
    /// Creates an object reference.
    pub fn object(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        ResourceRef::Object {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Creates a document reference.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        ResourceRef::Document {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Returns the resource kind.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceRef::Object { .. } => ResourceKind::Object,
            ResourceRef::Document { .. } => ResourceKind::Document,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceRef::Object { bucket, key } => write!(f, "object:{}/{}", bucket, key),
            ResourceRef::Document { collection, id } => {
                write!(f, "document:{}/{}", collection, id)
            }
        }
    }
}

/// The kind of write a staged operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Creates a new resource.
    Create,
    /// Replaces an existing document.
    Update,
    /// Removes an existing document.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Which value of a document a uniqueness constraint looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstraintField {
    /// The document id itself.
    DocumentId,
    /// A top-level attribute of the document payload.
    Attribute(String),
}

impl fmt::Display for ConstraintField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintField::DocumentId => write!(f, "id"),
            ConstraintField::Attribute(name) => write!(f, "{}", name),
        }
    }
}

/// A value that must be unique within a collection.
///
/// # Examples
///
/// ```
/// use tandem_persistence::types::UniquenessConstraint;
///
/// let email = UniquenessConstraint::field("users", "email", "a@example.com");
/// assert_eq!(email.to_string(), "email within users");
///
/// let user = UniquenessConstraint::document_id("users", "u1");
/// assert_eq!(user.to_string(), "id within users");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniquenessConstraint {
    /// The collection the value must be unique in.
    pub scope: String,
    /// The constrained field.
    pub field: ConstraintField,
    /// The candidate value.
    pub value: String,
}

impl UniquenessConstraint {
    /// A constraint on an attribute value.
    pub fn field(
        scope: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            scope: scope.into(),
            field: ConstraintField::Attribute(field.into()),
            value: value.into(),
        }
    }

    /// A constraint on the document id.
    pub fn document_id(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            field: ConstraintField::DocumentId,
            value: id.into(),
        }
    }
}

impl fmt::Display for UniquenessConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} within {}", self.field, self.scope)
    }
}

/// A document write submitted for staging.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentWrite {
    /// Create a new document, subject to uniqueness constraints.
    Create {
        collection: String,
        id: String,
        data: Value,
        constraints: Vec<UniquenessConstraint>,
    },
    /// Replace a document, optionally guarded by the version it was read at.
    Update {
        collection: String,
        id: String,
        data: Value,
        expected_version: Option<u64>,
    },
    /// Delete a document, optionally guarded by the version it was read at.
    Delete {
        collection: String,
        id: String,
        expected_version: Option<u64>,
    },
}

impl DocumentWrite {
    /// Builds an unconstrained create.
    pub fn create(collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        DocumentWrite::Create {
            collection: collection.into(),
            id: id.into(),
            data,
            constraints: Vec::new(),
        }
    }

    /// Builds an unguarded update.
    pub fn update(collection: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        DocumentWrite::Update {
            collection: collection.into(),
            id: id.into(),
            data,
            expected_version: None,
        }
    }

    /// Builds an unguarded delete.
    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DocumentWrite::Delete {
            collection: collection.into(),
            id: id.into(),
            expected_version: None,
        }
    }

    /// Adds a uniqueness constraint. Only creates carry constraints.
    pub fn with_constraint(mut self, constraint: UniquenessConstraint) -> Self {
        if let DocumentWrite::Create { constraints, .. } = &mut self {
            constraints.push(constraint);
        }
        self
    }

    /// Guards an update or delete by the version it was read at.
    pub fn expecting_version(mut self, version: u64) -> Self {
        match &mut self {
            DocumentWrite::Update {
                expected_version, ..
            }
            | DocumentWrite::Delete {
                expected_version, ..
            } => *expected_version = Some(version),
            DocumentWrite::Create { .. } => {}
        }
        self
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            DocumentWrite::Create { .. } => OperationKind::Create,
            DocumentWrite::Update { .. } => OperationKind::Update,
            DocumentWrite::Delete { .. } => OperationKind::Delete,
        }
    }

    /// Returns the targeted document.
    pub fn target(&self) -> ResourceRef {
        match self {
            DocumentWrite::Create { collection, id, .. }
            | DocumentWrite::Update { collection, id, .. }
            | DocumentWrite::Delete { collection, id, .. } => {
                ResourceRef::document(collection.clone(), id.clone())
            }
        }
    }

    /// Returns the constraints carried by this write.
    pub fn constraints(&self) -> &[UniquenessConstraint] {
        match self {
            DocumentWrite::Create { constraints, .. } => constraints,
            _ => &[],
        }
    }

    /// Returns the optimistic version guard, if any.
    pub fn expected_version(&self) -> Option<u64> {
        match self {
            DocumentWrite::Update {
                expected_version, ..
            }
            | DocumentWrite::Delete {
                expected_version, ..
            } => *expected_version,
            DocumentWrite::Create { .. } => None,
        }
    }
}

/// One entry of a context's append-only operation log.
///
/// Immutable once appended; `sequence` is monotonic within its context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedOperation {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    /// Create, update or delete.
    pub kind: OperationKind,
    /// The targeted resource.
    pub target: ResourceRef,
    /// Document payload, or object metadata for uploads.
    pub payload: Value,
    /// Optimistic version guard for updates and deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
    /// Uniqueness constraints checked before the operation was accepted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<UniquenessConstraint>,
}

impl StagedOperation {
    /// Returns the resource kind of the target.
    pub fn resource_kind(&self) -> ResourceKind {
        self.target.kind()
    }
}

/// Status of a resource touched by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleStatus {
    /// Recorded against an open context.
    Staged,
    /// Part of a committed transaction.
    Committed,
    /// Removed by compensation or discarded with its transaction.
    Deleted,
}

/// A resource together with the transaction that owns it.
///
/// A handle has an owner only while it is `Staged`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHandle {
    /// The resource.
    pub resource: ResourceRef,
    /// Current status.
    pub status: HandleStatus,
    /// The owning context while staged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<TransactionId>,
}

impl ResourceHandle {
    /// Creates a staged handle owned by `owner`.
    pub fn staged(resource: ResourceRef, owner: TransactionId) -> Self {
        Self {
            resource,
            status: HandleStatus::Staged,
            owner: Some(owner),
        }
    }

    /// Returns the resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Moves the handle to a terminal status and releases its owner.
    pub fn settle(&mut self, status: HandleStatus) {
        self.status = status;
        self.owner = None;
    }
}

/// The result of a successful object upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectHandle {
    /// Bucket the object lives in.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
    /// Size in bytes.
    pub size: usize,
    /// Entity tag reported by the store, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

impl ObjectHandle {
    /// Returns the reference used for compensation.
    pub fn resource(&self) -> ResourceRef {
        ResourceRef::object(self.bucket.clone(), self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_ref_display() {
        assert_eq!(
            ResourceRef::object("avatars", "users/u1/a.png").to_string(),
            "object:avatars/users/u1/a.png"
        );
        assert_eq!(
            ResourceRef::document("users", "u1").to_string(),
            "document:users/u1"
        );
    }

    #[test]
    fn test_constraints_only_attach_to_creates() {
        let create = DocumentWrite::create("users", "u1", json!({}))
            .with_constraint(UniquenessConstraint::document_id("users", "u1"));
        assert_eq!(create.constraints().len(), 1);

        let update = DocumentWrite::update("users", "u1", json!({}))
            .with_constraint(UniquenessConstraint::document_id("users", "u1"));
        assert!(update.constraints().is_empty());
    }

    #[test]
    fn test_expected_version_guard() {
        let update = DocumentWrite::update("events", "e1", json!({})).expecting_version(4);
        assert_eq!(update.expected_version(), Some(4));
        assert_eq!(update.kind(), OperationKind::Update);

        let create = DocumentWrite::create("events", "e1", json!({})).expecting_version(4);
        assert_eq!(create.expected_version(), None);
    }

    #[test]
    fn test_handle_settle_releases_owner() {
        let mut handle =
            ResourceHandle::staged(ResourceRef::document("users", "u1"), TransactionId::new());
        assert!(handle.owner.is_some());
        handle.settle(HandleStatus::Committed);
        assert_eq!(handle.status, HandleStatus::Committed);
        assert!(handle.owner.is_none());
    }
}
