//! Record mapping: schema-driven SQL for plain records.
//!
//! A model is declared once with [`Schema::builder`]. The resulting
//! `Arc<Schema>` owns the field declarations and the select, insert, update
//! and delete templates; [`Record`]s hold only values and borrow everything
//! else from their schema.

mod field;
mod record;
mod schema;

pub use field::{DefaultFactory, Field, FieldDefault, FieldType};
pub use record::{FindOptions, Limit, Record};
pub use schema::{Schema, SchemaBuilder, SchemaError};
