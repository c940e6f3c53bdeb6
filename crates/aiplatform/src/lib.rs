//! Managed ML platform surface.
//!
//! Defines the session context, resource handle types, the [`Platform`]
//! trait consumed by the workflow core, and [`VertexClient`], a REST
//! implementation against the Vertex AI v1 API.

pub mod client;
pub mod context;
pub mod platform;
pub mod resources;

pub use client::VertexClient;
pub use context::SessionContext;
pub use platform::Platform;
pub use resources::{DatasetHandle, DeploySpec, Deployment, EndpointHandle, ModelHandle, TrainingSpec};
