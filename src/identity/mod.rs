// src/identity/mod.rs

//! Content-addressed dataset identity.
//!
//! - [`params`] normalises parameter values into an order-stable form.
//! - [`hash`] turns canonical bytes into a stable 63-bit identity hash.
//! - [`metadata`] is the [`DatasetMetadata`] identity itself.

pub mod hash;
pub mod metadata;
pub mod params;

pub use metadata::{DEFAULT_VERSION, DatasetMetadata, MetadataBuilder, TimeLevel};
pub use params::{ParamValue, Params};
