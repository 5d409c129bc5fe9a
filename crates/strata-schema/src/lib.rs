//! # strata-schema
//!
//! The mandatory schema gate for entity metadata, plus JSON Schema export of
//! Strata's own types.
//!
//! This crate provides:
//! - [`SchemaValidator`]: validates metadata against `{entity_kind}_metadata`
//!   and stamps passing metadata
//! - [`SchemaCache`]: explicitly constructed, injectable cache of fetched
//!   schema documents and their compiled validators
//! - [`SchemaSource`]: the trait through which the external schema registry
//!   is consumed, with an in-memory [`StaticSchemaSource`]
//! - [`TypeRegistry`]: schemars-generated schemas for core types, used by
//!   `strata schema`

mod cache;
mod error;
mod registry;
mod source;
mod validator;

pub use cache::{CachedSchema, SchemaCache};
pub use error::{FieldError, SchemaError};
pub use registry::TypeRegistry;
pub use source::{SchemaSource, StaticSchemaSource};
pub use validator::{SchemaValidator, ValidationReport, check_metadata, stamp_metadata};
