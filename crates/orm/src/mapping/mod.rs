//! Mapping Metadata - Declarative entity descriptors and their registry
//!
//! Descriptors are explicit values assembled once at startup and validated
//! eagerly; the runtime performs no introspection of its own.

pub mod descriptor;
pub mod registry;

pub use descriptor::*;
pub use registry::*;
