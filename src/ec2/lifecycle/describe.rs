//! Instance description and termination.

use aws_sdk_ec2::types::Instance;
use tracing::info;

use super::super::{Ec2Gateway, error::classify};
use crate::gateway::{GatewayError, ProvisionedServer, ServerState};

impl Ec2Gateway {
    /// Describes one instance, treating a not-found response as `None`.
    pub(in crate::ec2) async fn lookup_instance(
        &self,
        server_id: &str,
    ) -> Result<Option<ProvisionedServer>, GatewayError> {
        let response = match self
            .client
            .describe_instances()
            .instance_ids(server_id)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let classified = classify(err);
                if classified.is_not_visible() {
                    return Ok(None);
                }
                return Err(classified);
            }
        };

        let instance = response
            .reservations()
            .first()
            .and_then(|reservation| reservation.instances().first());
        match instance {
            Some(instance) => server_from_instance(instance).map(Some),
            None => Ok(None),
        }
    }

    pub(in crate::ec2) async fn terminate_instance(
        &self,
        server_id: &str,
    ) -> Result<(), GatewayError> {
        info!(server = %server_id, "terminating instance");
        self.client
            .terminate_instances()
            .instance_ids(server_id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}

/// Maps an SDK instance into the gateway's server snapshot.
fn server_from_instance(instance: &Instance) -> Result<ProvisionedServer, GatewayError> {
    let id = instance
        .instance_id()
        .ok_or_else(|| GatewayError::Incomplete {
            message: String::from("instance response missing an instance id"),
        })?
        .to_owned();

    let state = instance
        .state()
        .and_then(|state| state.name())
        .map_or_else(
            || ServerState::Other(String::from("unknown")),
            |name| ServerState::from(name.as_str()),
        );

    let non_empty = |value: Option<&str>| value.filter(|text| !text.is_empty()).map(str::to_owned);

    Ok(ProvisionedServer {
        id,
        state,
        public_ip: non_empty(instance.public_ip_address()),
        private_ip: non_empty(instance.private_ip_address()),
        public_dns: non_empty(instance.public_dns_name()),
        private_dns: non_empty(instance.private_dns_name()),
        root_device_type: instance
            .root_device_type()
            .map(|device| device.as_str().to_owned()),
        subnet_id: non_empty(instance.subnet_id()),
    })
}

#[cfg(test)]
mod tests {
    use aws_sdk_ec2::types::{DeviceType, InstanceState, InstanceStateName};

    use super::*;

    #[test]
    fn running_instance_maps_addresses_and_state() {
        let instance = Instance::builder()
            .instance_id("i-42")
            .state(
                InstanceState::builder()
                    .name(InstanceStateName::Running)
                    .build(),
            )
            .public_ip_address("203.0.113.9")
            .private_ip_address("10.0.0.9")
            .public_dns_name("ec2-203-0-113-9.compute-1.amazonaws.com")
            .private_dns_name("ip-10-0-0-9.ec2.internal")
            .root_device_type(DeviceType::Ebs)
            .subnet_id("subnet-1")
            .build();

        let server = server_from_instance(&instance).expect("mapping succeeds");

        assert_eq!(server.id, "i-42");
        assert_eq!(server.state, ServerState::Running);
        assert_eq!(server.public_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(server.private_ip.as_deref(), Some("10.0.0.9"));
        assert_eq!(server.root_device_type.as_deref(), Some("ebs"));
        assert_eq!(server.subnet_id.as_deref(), Some("subnet-1"));
    }

    #[test]
    fn empty_dns_names_map_to_none() {
        let instance = Instance::builder()
            .instance_id("i-42")
            .public_dns_name("")
            .build();

        let server = server_from_instance(&instance).expect("mapping succeeds");
        assert_eq!(server.public_dns, None);
        assert_eq!(server.state, ServerState::Other(String::from("unknown")));
    }

    #[test]
    fn missing_instance_id_is_an_incomplete_response() {
        let err = server_from_instance(&Instance::builder().build()).expect_err("mapping fails");
        assert!(matches!(err, GatewayError::Incomplete { .. }));
    }
}
