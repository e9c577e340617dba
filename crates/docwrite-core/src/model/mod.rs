pub mod derived;
pub mod entity;
pub mod field;
pub mod identity;


pub use entity::{DataStoreInfo, EntityAccess, EntityModel};
pub use field::{FieldAccess, FieldKind, FieldModel, MergePolicy, RoleSet};
pub use identity::{EntityIdentity, ID_FIELD};
