//! Relationships Module - relation metadata, path resolution and record fields

pub mod metadata;
pub mod registry;
pub mod related;

pub use metadata::{RelationDef, RelationshipType};
pub use registry::{find_relation, relations_of, resolve_path};
pub use related::{Related, RelatedMany};
