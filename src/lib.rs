//! Core library for the skylift provisioning tool.
//!
//! The crate exposes a gateway abstraction over the EC2 API, a launch-spec
//! builder that turns merged configuration into a concrete create request,
//! a two-stage validation battery, and the orchestrator that drives
//! create → tag → associate → bootstrap with bounded retries.

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod ec2;
pub mod gateway;
pub mod launch;
pub mod provision;
#[cfg(test)]
pub mod test_helpers;
pub mod user_data;
pub mod validate;

pub use bootstrap::{
    BootstrapError, BootstrapProtocol, BootstrapTarget, Bootstrapper, CommandOutput,
    CommandRunner, ProcessBootstrapper, ProcessCommandRunner, bootstrap_address,
};
pub use config::{ConfigError, Ec2Config, EffectiveConfig};
pub use ec2::Ec2Gateway;
pub use gateway::{
    AddressScope, AmiMetadata, AmiRootDevice, CloudGateway, ElasticIp, GatewayError,
    GatewayFuture, ProvisionedServer, RootDeviceKind, ServerState,
};
pub use launch::{
    ConnectAttribute, EphemeralDevice, LaunchSpec, NetworkPlacement, Platform, RootVolume,
    StorageSpec, UnknownOptionValue, VolumeType,
};
pub use provision::{ProvisionError, ProvisionOrchestrator, ProvisionSummary};
pub use validate::{ValidationError, ValidationFailure, ValidationKind};
