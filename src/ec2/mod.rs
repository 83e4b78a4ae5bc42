//! EC2-backed implementation of the cloud gateway.

mod error;
mod lifecycle;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::Client;

use crate::gateway::{
    AmiMetadata, CloudGateway, ElasticIp, GatewayFuture, ProvisionedServer,
};
use crate::launch::LaunchSpec;

/// Gateway that provisions servers through the EC2 API.
#[derive(Clone, Debug)]
pub struct Ec2Gateway {
    client: Client,
    region: String,
}

impl Ec2Gateway {
    /// Constructs a gateway for the given region using the ambient AWS
    /// credential chain.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        Self {
            client: Client::new(&config),
            region: region.to_owned(),
        }
    }
}

impl CloudGateway for Ec2Gateway {
    fn describe_image<'a>(
        &'a self,
        image_id: &'a str,
    ) -> GatewayFuture<'a, Option<AmiMetadata>> {
        Box::pin(async move { self.lookup_image(image_id).await })
    }

    fn create_server<'a>(&'a self, spec: &'a LaunchSpec) -> GatewayFuture<'a, String> {
        Box::pin(async move { self.run_instance(spec).await })
    }

    fn describe_server<'a>(
        &'a self,
        server_id: &'a str,
    ) -> GatewayFuture<'a, Option<ProvisionedServer>> {
        Box::pin(async move { self.lookup_instance(server_id).await })
    }

    fn tag_server<'a>(
        &'a self,
        server_id: &'a str,
        key: &'a str,
        value: &'a str,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move { self.create_tag(server_id, key, value).await })
    }

    fn list_elastic_ips(&self) -> GatewayFuture<'_, Vec<ElasticIp>> {
        Box::pin(async move { self.describe_addresses().await })
    }

    fn associate_elastic_ip<'a>(
        &'a self,
        server_id: &'a str,
        address: &'a ElasticIp,
    ) -> GatewayFuture<'a, ()> {
        Box::pin(async move { self.associate_address(server_id, address).await })
    }

    fn terminate_server<'a>(&'a self, server_id: &'a str) -> GatewayFuture<'a, ()> {
        Box::pin(async move { self.terminate_instance(server_id).await })
    }
}
