//! Tag application.

use aws_sdk_ec2::types::Tag;

use super::super::{Ec2Gateway, error::classify};
use crate::gateway::GatewayError;

impl Ec2Gateway {
    /// Applies one tag. EC2 upserts by key, so repeats are harmless.
    pub(in crate::ec2) async fn create_tag(
        &self,
        server_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), GatewayError> {
        self.client
            .create_tags()
            .resources(server_id)
            .tags(Tag::builder().key(key).value(value).build())
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
