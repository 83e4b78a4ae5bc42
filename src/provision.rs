//! Provisioning orchestration.
//!
//! [`ProvisionOrchestrator`] drives the full create flow against a
//! [`CloudGateway`] and a [`Bootstrapper`]: validate, create, tag with a
//! bounded visibility retry, optionally associate a pre-allocated elastic
//! IP, then hand off to the bootstrap collaborator. Validation runs to
//! completion before the first cloud call so the operator sees every
//! problem in one pass.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::bootstrap::{
    BootstrapError, BootstrapProtocol, BootstrapTarget, Bootstrapper, bootstrap_address,
    effective_protocol,
};
use crate::config::EffectiveConfig;
use crate::gateway::{
    AmiMetadata, CloudGateway, ElasticIp, GatewayError, ProvisionedServer, ServerState,
};
use crate::launch::LaunchSpec;
use crate::validate::{
    ValidationError, ValidationFailure, ValidationKind, post_connection, preflight,
};

/// Errors raised while provisioning a server.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// One or more configuration checks failed before any cloud call.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    /// The image lookup itself failed (distinct from a missing image,
    /// which is a validation failure).
    #[error("image lookup failed: {source}")]
    AmiLookup {
        /// Gateway error from the lookup.
        source: GatewayError,
    },
    /// Listing the account's elastic IPs failed.
    #[error("listing elastic IPs failed: {source}")]
    AddressCatalog {
        /// Gateway error from the listing call.
        source: GatewayError,
    },
    /// The create call was rejected or failed in transit.
    #[error("server creation failed: {source}")]
    Create {
        /// Gateway error from the create call.
        source: GatewayError,
    },
    /// Tagging failed with a terminal error.
    #[error("tagging server {server_id} failed: {source}")]
    Tag {
        /// Server the tags were destined for.
        server_id: String,
        /// Gateway error from the tagging call.
        source: GatewayError,
    },
    /// The server never became visible within the tagging retry budget.
    #[error("server {server_id} not visible for tagging after {attempts} attempts")]
    TagTimeout {
        /// Server the tags were destined for.
        server_id: String,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// The elastic-IP association call failed.
    #[error("associating {address} with {server_id} failed: {source}")]
    Associate {
        /// Server the address was destined for.
        server_id: String,
        /// The requested address.
        address: String,
        /// Gateway error from the association call.
        source: GatewayError,
    },
    /// The association never became observable within the wait bound.
    #[error("association of {address} with {server_id} did not become visible in time")]
    AssociationTimeout {
        /// Server the address was destined for.
        server_id: String,
        /// The requested address.
        address: String,
    },
    /// A describe call failed after the server was created.
    #[error("describing server {server_id} failed: {source}")]
    Describe {
        /// Server being described.
        server_id: String,
        /// Gateway error from the describe call.
        source: GatewayError,
    },
    /// The provider stopped reporting a server it had created.
    #[error("server {server_id} disappeared after creation")]
    Vanished {
        /// Server the provider no longer reports.
        server_id: String,
    },
    /// No address is available to bootstrap over.
    #[error("server {server_id}: no IP address available for bootstrapping")]
    NoBootstrapAddress {
        /// Server without a usable address.
        server_id: String,
    },
    /// The bootstrap hand-off failed. When delete-on-failure is configured
    /// the message carries a note describing the teardown outcome.
    #[error("{message}")]
    Bootstrap {
        /// Failure description, including any teardown note.
        message: String,
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
}

/// Outcome of a successful provisioning run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionSummary {
    /// Provider identifier of the new server.
    pub server_id: String,
    /// Lifecycle state at the final describe.
    pub state: ServerState,
    /// Public IPv4 address, when assigned.
    pub public_ip: Option<String>,
    /// Private IPv4 address, when assigned.
    pub private_ip: Option<String>,
    /// Public DNS name, when assigned.
    pub public_dns: Option<String>,
    /// Address the bootstrap connected to.
    pub bootstrap_address: String,
}

/// Drives the create → tag → associate → bootstrap flow.
///
/// Wait knobs default to the values in [`EffectiveConfig`]; the `with_*`
/// methods override them, which tests use to run the retry loops in
/// milliseconds.
pub struct ProvisionOrchestrator<G, B> {
    gateway: G,
    bootstrapper: B,
    tag_attempts: Option<u32>,
    tag_delay: Option<Duration>,
    association_timeout: Option<Duration>,
    association_poll: Option<Duration>,
}

impl<G: CloudGateway, B: Bootstrapper> ProvisionOrchestrator<G, B> {
    /// Creates an orchestrator over the given collaborators.
    #[must_use]
    pub const fn new(gateway: G, bootstrapper: B) -> Self {
        Self {
            gateway,
            bootstrapper,
            tag_attempts: None,
            tag_delay: None,
            association_timeout: None,
            association_poll: None,
        }
    }

    /// Overrides the tagging attempt budget.
    #[must_use]
    pub const fn with_tag_attempts(mut self, attempts: u32) -> Self {
        self.tag_attempts = Some(attempts);
        self
    }

    /// Overrides the delay between tagging attempts.
    #[must_use]
    pub const fn with_tag_delay(mut self, delay: Duration) -> Self {
        self.tag_delay = Some(delay);
        self
    }

    /// Overrides the association wait bound.
    #[must_use]
    pub const fn with_association_timeout(mut self, timeout: Duration) -> Self {
        self.association_timeout = Some(timeout);
        self
    }

    /// Overrides the association poll interval.
    #[must_use]
    pub const fn with_association_poll(mut self, poll: Duration) -> Self {
        self.association_poll = Some(poll);
        self
    }

    /// Runs the full provisioning flow.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError`] describing the first terminal failure.
    /// Validation failures are batched and reported before any cloud call.
    pub async fn execute(
        &self,
        config: &EffectiveConfig,
    ) -> Result<ProvisionSummary, ProvisionError> {
        fail_on_errors(preflight(config))?;

        let ami = self.lookup_image(config).await?;
        let addresses = self.address_catalog(config).await?;
        fail_on_errors(post_connection(config, ami.as_ref(), &addresses))?;

        // post_connection rejects a missing image, so `ami` is present here.
        let Some(ami) = ami else {
            return Err(ProvisionError::Validation(ValidationFailure::new(vec![
                ValidationError::new(ValidationKind::ImageNotFound, "image metadata unavailable"),
            ])));
        };

        let spec = LaunchSpec::build(config, &ami)?;
        let server_id = self
            .gateway
            .create_server(&spec)
            .await
            .map_err(|source| ProvisionError::Create { source })?;
        info!(server = %server_id, flavor = %spec.flavor, "server created");

        self.apply_tags(config, &spec, &server_id).await?;

        if let Some(requested) = config.associate_eip.as_deref() {
            self.associate_address(config, &server_id, requested, &addresses)
                .await?;
        }

        let server = self.describe(&server_id).await?;
        let address = bootstrap_address(config, &server).ok_or_else(|| {
            ProvisionError::NoBootstrapAddress {
                server_id: server_id.clone(),
            }
        })?;

        let target = bootstrap_target(config, &server, &address)?;
        info!(server = %server_id, address = %address, "starting bootstrap");
        if let Err(source) = self.bootstrapper.bootstrap(&target) {
            return Err(self.bootstrap_failed(config, &server_id, source).await);
        }
        info!(server = %server_id, "bootstrap complete");

        Ok(ProvisionSummary {
            server_id: server.id,
            state: server.state,
            public_ip: server.public_ip,
            private_ip: server.private_ip,
            public_dns: server.public_dns,
            bootstrap_address: address,
        })
    }

    async fn lookup_image(
        &self,
        config: &EffectiveConfig,
    ) -> Result<Option<AmiMetadata>, ProvisionError> {
        let Some(image_id) = config.image.as_deref() else {
            return Ok(None);
        };
        self.gateway
            .describe_image(image_id)
            .await
            .map_err(|source| ProvisionError::AmiLookup { source })
    }

    async fn address_catalog(
        &self,
        config: &EffectiveConfig,
    ) -> Result<Vec<ElasticIp>, ProvisionError> {
        if config.associate_eip.is_none() {
            return Ok(Vec::new());
        }
        self.gateway
            .list_elastic_ips()
            .await
            .map_err(|source| ProvisionError::AddressCatalog { source })
    }

    /// Applies the full tag set, retrying the whole batch while the provider
    /// has not caught up with the create call yet.
    async fn apply_tags(
        &self,
        config: &EffectiveConfig,
        spec: &LaunchSpec,
        server_id: &str,
    ) -> Result<(), ProvisionError> {
        let attempts = self.tag_attempts.unwrap_or(config.visibility_attempts).max(1);
        let delay = self.tag_delay.unwrap_or(config.visibility_delay);
        let pairs = spec.tag_pairs(server_id);

        for attempt in 1..=attempts {
            match self.tag_batch(server_id, &pairs).await {
                Ok(()) => {
                    info!(server = %server_id, tags = pairs.len(), "server tagged");
                    return Ok(());
                }
                Err(err) if err.is_not_visible() && attempt < attempts => {
                    warn!(
                        server = %server_id,
                        attempt,
                        "server not yet visible for tagging, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_not_visible() => {
                    return Err(ProvisionError::TagTimeout {
                        server_id: server_id.to_owned(),
                        attempts,
                    });
                }
                Err(source) => {
                    return Err(ProvisionError::Tag {
                        server_id: server_id.to_owned(),
                        source,
                    });
                }
            }
        }

        Err(ProvisionError::TagTimeout {
            server_id: server_id.to_owned(),
            attempts,
        })
    }

    async fn tag_batch(
        &self,
        server_id: &str,
        pairs: &[(String, String)],
    ) -> Result<(), GatewayError> {
        for (key, value) in pairs {
            self.gateway.tag_server(server_id, key, value).await?;
        }
        Ok(())
    }

    /// Associates the requested elastic IP, then polls until the address
    /// shows up on the server or the wait bound expires.
    async fn associate_address(
        &self,
        config: &EffectiveConfig,
        server_id: &str,
        requested: &str,
        addresses: &[ElasticIp],
    ) -> Result<(), ProvisionError> {
        // post_connection already rejected an address missing from the
        // catalog, so the lookup is a formality.
        let Some(address) = addresses.iter().find(|eip| eip.public_ip == requested) else {
            return Err(ProvisionError::AssociationTimeout {
                server_id: server_id.to_owned(),
                address: requested.to_owned(),
            });
        };

        self.gateway
            .associate_elastic_ip(server_id, address)
            .await
            .map_err(|source| ProvisionError::Associate {
                server_id: server_id.to_owned(),
                address: requested.to_owned(),
                source,
            })?;
        info!(server = %server_id, address = %requested, "elastic IP association requested");

        let timeout = self.association_timeout.unwrap_or(config.association_timeout);
        let poll = self.association_poll.unwrap_or(config.association_poll);
        let deadline = Instant::now() + timeout;
        loop {
            let server = self.describe(server_id).await?;
            if server.public_ip.as_deref() == Some(requested) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ProvisionError::AssociationTimeout {
                    server_id: server_id.to_owned(),
                    address: requested.to_owned(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn describe(&self, server_id: &str) -> Result<ProvisionedServer, ProvisionError> {
        self.gateway
            .describe_server(server_id)
            .await
            .map_err(|source| ProvisionError::Describe {
                server_id: server_id.to_owned(),
                source,
            })?
            .ok_or_else(|| ProvisionError::Vanished {
                server_id: server_id.to_owned(),
            })
    }

    /// Builds the bootstrap-failure error, tearing the server down first
    /// when delete-on-failure is configured and noting the outcome.
    async fn bootstrap_failed(
        &self,
        config: &EffectiveConfig,
        server_id: &str,
        source: BootstrapError,
    ) -> ProvisionError {
        let mut message = format!("bootstrap of {server_id} failed: {source}");
        if config.delete_on_failure {
            match self.gateway.terminate_server(server_id).await {
                Ok(()) => {
                    info!(server = %server_id, "terminated after bootstrap failure");
                    message.push_str("; the server was terminated");
                }
                Err(err) => {
                    warn!(server = %server_id, error = %err, "teardown failed");
                    message.push_str(&format!("; additionally, termination failed: {err}"));
                }
            }
        }
        ProvisionError::Bootstrap { message, source }
    }
}

fn fail_on_errors(errors: Vec<ValidationError>) -> Result<(), ProvisionError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::Validation(ValidationFailure::new(errors)))
    }
}

fn bootstrap_target(
    config: &EffectiveConfig,
    server: &ProvisionedServer,
    address: &str,
) -> Result<BootstrapTarget, ProvisionError> {
    let protocol = effective_protocol(config).map_err(|err| {
        ProvisionError::Validation(ValidationFailure::new(vec![ValidationError::new(
            ValidationKind::UnknownProtocol,
            err.to_string(),
        )]))
    })?;

    let (user, port, identity_file, password) = match protocol {
        BootstrapProtocol::Ssh => (
            config.ssh_user.clone(),
            config.ssh_port,
            config.identity_file.clone(),
            None,
        ),
        BootstrapProtocol::Winrm => (
            config.winrm_user.clone(),
            config.winrm_port,
            None,
            config.winrm_password.clone(),
        ),
    };

    Ok(BootstrapTarget {
        address: address.to_owned(),
        protocol,
        user,
        port,
        identity_file,
        password,
        distro_hint: config.distro.clone(),
        node_name: config.node_name.clone().unwrap_or_else(|| server.id.clone()),
    })
}
