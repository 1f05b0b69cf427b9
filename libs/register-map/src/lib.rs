//! MDW register map
//!
//! Register-description-driven access to a blender's holding registers:
//!
//! - `catalog` / `profile` / `map`: validated register map and read profiles
//! - `address`: offset → wire address resolution
//! - `codec`: raw words ↔ engineering values
//! - `span`: offset range covered by a selection
//! - `reader` / `writer`: profile reads and variable writes over a
//!   [`RegisterTransport`]

pub mod address;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod map;
pub mod profile;
pub mod reader;
pub mod span;
pub mod transport;
pub mod writer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use address::{checked_address, resolve_address, ResolvedRead};
pub use catalog::{Access, RegisterCatalog, RegisterKind, RegisterSpec};
pub use codec::WordOrder;
pub use error::{RegisterError, Result};
pub use map::RegisterMap;
pub use profile::ProfileSet;
pub use reader::{ReadOrchestrator, ReadResult, ReaderOptions, VariableValue};
pub use span::{compute_span, Span};
pub use transport::RegisterTransport;
pub use writer::ValueWriter;
