//! ShipFlow image build and publish
//!
//! Builds container images from manifest container definitions, tags them
//! with the deploy id and pushes them to a registry.

pub mod auth;
pub mod builder;
pub mod context;
pub mod error;
pub mod publisher;
pub mod pusher;
pub mod resolver;

pub use auth::{CredentialSource, RegistryAuth, decode_auth};
pub use bollard::auth::DockerCredentials;
pub use builder::{DockerImageBuilder, ImageBuild, LocalImage};
pub use context::ContextBuilder;
pub use error::{BuildError, BuildResult};
pub use publisher::ArtifactPublisher;
pub use pusher::{DockerRegistry, ImageRegistry, validate_tag};
pub use resolver::{BuildResolver, expand_variables};
