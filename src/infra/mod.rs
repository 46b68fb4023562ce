//! Infrastructure collaborator: nodes, links and placed applications.

/// Application graphs bound to nodes.
pub mod application;
/// Power-consuming entities and their pause state.
pub mod entity;
pub mod registry;

pub use application::{Application, DataFlow, Task};
pub use entity::{EntityKind, PowerEntity, PowerMeasurement, PowerModel, PowerState};
pub use registry::Infrastructure;
