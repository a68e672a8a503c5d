//! relfile — an educational relational storage engine.
//!
//! The engine is organized bottom-up:
//!
//! - [`point`] — the 2-D point value shared by records, indices, and SQL.
//! - [`value`] / [`schema`] — the dynamically-typed record field and the attribute
//!   list, primary key, and per-attribute index choice that describe a table.
//! - [`store`] — fixed-width record packing on top of a single data file, with a
//!   free list for deleted slots.
//! - [`index`] — three pluggable secondary index structures: an extendible hash
//!   with overflow chaining, an AVL tree persisted as a node array, and an R-tree
//!   over 2-D points.
//! - [`table`] — `TableManager`, which owns a record store and its indices and
//!   plans INSERT/SELECT/DELETE against whichever indices exist for a query.
//! - [`sql`] — a hand-rolled parser for the crate's SQL dialect (CREATE TABLE,
//!   INSERT, SELECT, DELETE, IMPORT FROM CSV, plus RADIUS/KNN spatial predicates).
//! - [`engine`] — `Engine`, the top-level handle: opens a base directory,
//!   discovers existing tables, and executes SQL text against them.
//!
//! Every public, fallible entry point returns [`error::RelResult`]. The engine
//! never panics on malformed input; callers embed it and must not be brought down
//! by a bad query.

pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod point;
pub mod result;
pub mod schema;
pub mod sql;
pub mod store;
pub mod table;
pub mod value;

pub use engine::{Engine, EngineConfig};
pub use error::{RelError, RelResult};
pub use point::Point;
pub use schema::{Attribute, IndexKind, TableSchema};
pub use value::{DataType, Value};
