//! Database bootstrap: pool construction, WAL mode, and embedded
//! migrations. The actual `sqlx` plumbing lives in `adapters::sqlite`
//! (it owns the repositories that need it); this module re-exports the
//! bootstrap entry points under the name the rest of the crate expects.

pub use crate::adapters::sqlite::{
    create_migrated_test_pool, initialize_database, initialize_default_database, DatabaseError,
};
