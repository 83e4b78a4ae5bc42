//! Elastic-IP listing and association.

use aws_sdk_ec2::types::{Address, DomainType};
use tracing::info;

use super::super::{Ec2Gateway, error::classify};
use crate::gateway::{AddressScope, ElasticIp, GatewayError};

impl Ec2Gateway {
    pub(in crate::ec2) async fn describe_addresses(
        &self,
    ) -> Result<Vec<ElasticIp>, GatewayError> {
        let response = self
            .client
            .describe_addresses()
            .send()
            .await
            .map_err(classify)?;

        Ok(response
            .addresses()
            .iter()
            .filter_map(elastic_ip_from_address)
            .collect())
    }

    /// Associates a pre-allocated address. VPC-scoped addresses associate by
    /// allocation id; classic addresses associate by the address itself.
    pub(in crate::ec2) async fn associate_address(
        &self,
        server_id: &str,
        address: &ElasticIp,
    ) -> Result<(), GatewayError> {
        info!(server = %server_id, address = %address.public_ip, "associating elastic IP");

        let mut request = self.client.associate_address().instance_id(server_id);
        match (address.scope, address.allocation_id.as_deref()) {
            (AddressScope::Vpc, Some(allocation_id)) => {
                request = request.allocation_id(allocation_id);
            }
            (AddressScope::Vpc, None) => {
                return Err(GatewayError::Incomplete {
                    message: format!(
                        "VPC address {} carries no allocation id",
                        address.public_ip
                    ),
                });
            }
            (AddressScope::Standard, _) => {
                request = request.public_ip(&address.public_ip);
            }
        }

        request.send().await.map_err(classify)?;
        Ok(())
    }
}

/// Maps an SDK address entry, skipping entries without a public IP.
fn elastic_ip_from_address(address: &Address) -> Option<ElasticIp> {
    let public_ip = address.public_ip()?.to_owned();
    let scope = match address.domain() {
        Some(DomainType::Vpc) => AddressScope::Vpc,
        _ => AddressScope::Standard,
    };
    Some(ElasticIp {
        public_ip,
        allocation_id: address.allocation_id().map(str::to_owned),
        scope,
        attached_instance: address
            .instance_id()
            .filter(|id| !id.is_empty())
            .map(str::to_owned),
    })
}
