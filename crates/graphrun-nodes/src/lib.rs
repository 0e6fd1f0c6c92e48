pub mod builtin;
pub mod registry;
pub mod schema;

pub use registry::{NodeKind, NodeRegistry, RegisteredNode};
pub use schema::{NodeSchema, SlotInfo};
