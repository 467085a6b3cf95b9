//! kvdoc — document collections, secondary indexes, and atomic
//! multi-collection commits over an ordered key-value store.
//!
//! This is the public meta-crate. Downstream users depend on **kvdoc** only;
//! the runtime lives in `kvdoc-core`.

pub use kvdoc_core as core;

pub use kvdoc_core::error::Error;

//
// Prelude
//

pub mod prelude {
    pub use kvdoc_core::prelude::*;
}
