//! forge-ci - the score-server delivery pipeline
//!
//! Verifies the Go sources, cross-compiles a static linux/amd64 binary,
//! packages it into a container image, optionally publishes it, and runs it
//! as a local service:
//! - Stages are plain async functions taking an explicit [`ForgeContext`]
//! - External tools sit behind the traits in [`collaborators`]
//! - Operations are dispatched by name through a [`FunctionRegistry`]

pub mod adapters;
pub mod artifact;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod fakes;
pub mod functions;
pub mod process;
pub mod source;
pub mod stages;
pub mod telemetry;

// Re-export key types
pub use artifact::{Binary, BuildOptions, CommitQuery, Image, Platform, PublishPolicy, Secret, Service};
pub use collaborators::{GoToolchain, ImagePackager, RegistryPublisher, ServiceRuntime, VcsReader};
pub use config::ForgeConfig;
pub use context::{ForgeContext, ForgeContextBuilder};
pub use error::{ForgeError, MetadataField, Result};
pub use functions::{ArgValue, FunctionOutput, FunctionRegistry, FunctionSpec, ParamKind, ParamSpec};
pub use source::SourceDir;
