//! Typed row codec: schemas, tuples, and the tuple builder.
//!
//! A [`Tuple`] is the unit the heap stores; to the heap it is an opaque byte
//! sequence. This module gives those bytes a typed interpretation:
//!
//! ```text
//! +--------------+----------------------+--------------------+
//! | null bitmap? | fixed area           | var area           |
//! | ceil(n/8) B  | one cell per column  | varchar payloads   |
//! +--------------+----------------------+--------------------+
//! ```
//!
//! Fixed cells hold the value itself for fixed-width types, `CHAR(N)` as N
//! zero-padded bytes, and `(offset, len)` u16 pairs for `VARCHAR` with the
//! offset measured from the start of the row.

mod error;
mod schema;
mod tuple;

pub use error::RecordError;
pub use schema::{Column, ColumnType, Schema};
pub use tuple::{Tuple, TupleBuilder};
