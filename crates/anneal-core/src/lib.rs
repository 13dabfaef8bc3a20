pub mod diff;
pub mod error;
pub mod ops;
pub mod schema;

pub use diff::diff;
pub use error::SchemaError;
pub use ops::{Operation, TableOp};
pub use schema::{
    ColumnDef, ForeignKeyDef, IndexDef, PrimaryKeyDef, Schema, TableDef, UniqueDef,
};
