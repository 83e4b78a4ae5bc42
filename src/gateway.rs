//! Gateway abstraction over the compute provider.
//!
//! The orchestrator only ever talks to [`CloudGateway`]; the EC2-backed
//! implementation lives in [`crate::ec2`] and tests substitute scripted
//! fakes. The trait covers exactly the calls the create flow needs:
//! image lookup, create, describe, tag, elastic-IP listing/association,
//! and termination (used by delete-on-failure).

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::launch::LaunchSpec;

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Errors raised by a cloud gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// The provider cannot see the resource yet. Recoverable during the
    /// tagging window; terminal everywhere else.
    #[error("resource not yet visible: {resource}")]
    NotVisible {
        /// Resource the provider failed to find.
        resource: String,
    },
    /// The provider rejected the call. The message is surfaced verbatim;
    /// a hint is attached when the message matches a known incompatibility.
    #[error("{message}{}", .hint.as_deref().map_or_else(String::new, |h| format!(" (hint: {h})")))]
    Rejected {
        /// Message returned by the provider.
        message: String,
        /// Guidance for known instance-type incompatibilities.
        hint: Option<String>,
    },
    /// A network-level failure before the provider produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Underlying error string.
        message: String,
    },
    /// The provider answered but the response was missing required data.
    #[error("incomplete provider response: {message}")]
    Incomplete {
        /// Description of the missing data.
        message: String,
    },
}

impl GatewayError {
    /// Returns `true` for the transient not-yet-visible class recovered by
    /// the bounded tagging retry.
    #[must_use]
    pub const fn is_not_visible(&self) -> bool {
        matches!(self, Self::NotVisible { .. })
    }
}

/// Lifecycle state reported by the provider for a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ServerState {
    /// Created but not yet running.
    Pending,
    /// Running and addressable.
    Running,
    /// Termination in progress.
    ShuttingDown,
    /// Terminated.
    Terminated,
    /// Stop in progress.
    Stopping,
    /// Stopped.
    Stopped,
    /// Any state this crate does not model explicitly.
    Other(String),
}

impl ServerState {
    /// Canonical provider-side name for the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for ServerState {
    fn from(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// Server snapshot as described by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionedServer {
    /// Provider identifier for the server.
    pub id: String,
    /// Current lifecycle state.
    pub state: ServerState,
    /// Public IPv4 address, when assigned.
    pub public_ip: Option<String>,
    /// Private IPv4 address, when assigned.
    pub private_ip: Option<String>,
    /// Public DNS name, when assigned.
    pub public_dns: Option<String>,
    /// Private DNS name, when assigned.
    pub private_dns: Option<String>,
    /// Root device type reported by the provider.
    pub root_device_type: Option<String>,
    /// Subnet the server was placed in, when VPC-placed.
    pub subnet_id: Option<String>,
}

/// Root device backing of a machine image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RootDeviceKind {
    /// Network-attached EBS root volume.
    Ebs,
    /// Locally attached instance-store root.
    InstanceStore,
    /// Any backing this crate does not model explicitly.
    Other(String),
}

/// Root block device defaults carried by a machine image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AmiRootDevice {
    /// Device name the image boots from.
    pub device_name: String,
    /// Snapshot size in GiB; the minimum size for an override.
    pub volume_size_gib: i32,
    /// IOPS baked into the image mapping, when present.
    pub iops: Option<i32>,
    /// Whether the image defaults to deleting the volume on termination.
    pub delete_on_termination: bool,
}

/// Metadata resolved for a machine image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AmiMetadata {
    /// Image identifier.
    pub image_id: String,
    /// Root device backing.
    pub root_device: RootDeviceKind,
    /// Root block device defaults, for EBS-backed images.
    pub root_volume: Option<AmiRootDevice>,
    /// Whether the image is a Windows image.
    pub windows: bool,
}

/// Scope an elastic IP address was allocated in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressScope {
    /// Allocated for VPC use.
    Vpc,
    /// Allocated for classic networking.
    Standard,
}

/// A pre-allocated elastic IP address as listed by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElasticIp {
    /// The public address itself.
    pub public_ip: String,
    /// Allocation id, present for VPC-scoped addresses.
    pub allocation_id: Option<String>,
    /// Scope the address was allocated in.
    pub scope: AddressScope,
    /// Server the address is currently attached to, if any.
    pub attached_instance: Option<String>,
}

/// Minimal interface implemented by cloud gateways.
///
/// One gateway handle is constructed per command invocation and owned by
/// that command; implementations are not required to be shareable across
/// concurrent provisioning flows.
pub trait CloudGateway {
    /// Resolves image metadata, or `None` when the image does not exist.
    fn describe_image<'a>(&'a self, image_id: &'a str)
    -> GatewayFuture<'a, Option<AmiMetadata>>;

    /// Submits the create call and returns the new server's identifier.
    fn create_server<'a>(&'a self, spec: &'a LaunchSpec) -> GatewayFuture<'a, String>;

    /// Describes a server, or `None` when the provider cannot find it.
    fn describe_server<'a>(
        &'a self,
        server_id: &'a str,
    ) -> GatewayFuture<'a, Option<ProvisionedServer>>;

    /// Applies one tag to the server. Re-tagging an already-tagged server
    /// is a no-op, not an error.
    fn tag_server<'a>(
        &'a self,
        server_id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> GatewayFuture<'a, ()>;

    /// Lists every elastic IP visible to the account.
    fn list_elastic_ips(&self) -> GatewayFuture<'_, Vec<ElasticIp>>;

    /// Associates a pre-allocated elastic IP with the server.
    fn associate_elastic_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a ElasticIp,
    ) -> GatewayFuture<'a, ()>;

    /// Terminates the server. Used when delete-on-failure is configured.
    fn terminate_server<'a>(&'a self, server_id: &'a str) -> GatewayFuture<'a, ()>;
}
