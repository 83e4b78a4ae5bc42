//! Instance creation.

use aws_sdk_ec2::operation::run_instances::builders::RunInstancesFluentBuilder;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, IamInstanceProfileSpecification,
    InstanceNetworkInterfaceSpecification, InstanceType, Placement, Tenancy,
    VolumeType as AwsVolumeType,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use super::super::{Ec2Gateway, error::classify};
use crate::gateway::GatewayError;
use crate::launch::{LaunchSpec, NetworkPlacement, StorageSpec};

impl Ec2Gateway {
    /// Submits the run-instances call assembled from the launch spec and
    /// returns the new instance's identifier.
    pub(in crate::ec2) async fn run_instance(
        &self,
        spec: &LaunchSpec,
    ) -> Result<String, GatewayError> {
        info!(
            region = %self.region,
            image = %spec.image_id,
            flavor = %spec.flavor,
            "requesting instance"
        );

        let mut request = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.flavor.as_str()))
            .min_count(1)
            .max_count(1)
            .ebs_optimized(spec.ebs_optimized);

        if let Some(key_name) = spec.key_name.as_deref() {
            request = request.key_name(key_name);
        }
        if let Some(profile) = spec.iam_profile.as_deref() {
            request = request.iam_instance_profile(
                IamInstanceProfileSpecification::builder().name(profile).build(),
            );
        }
        if let Some(user_data) = spec.user_data.as_deref() {
            request = request.user_data(STANDARD.encode(user_data.as_bytes()));
        }
        if let Some(placement) = placement(spec) {
            request = request.set_placement(Some(placement));
        }
        request = apply_network(request, &spec.placement);
        for mapping in block_device_mappings(&spec.storage) {
            request = request.block_device_mappings(mapping);
        }

        let response = request.send().await.map_err(classify)?;
        let instance_id = response
            .instances()
            .first()
            .and_then(|instance| instance.instance_id())
            .ok_or_else(|| GatewayError::Incomplete {
                message: String::from("create response carried no instance"),
            })?;

        Ok(instance_id.to_owned())
    }
}

/// Placement block covering the availability zone, the placement group, and
/// dedicated tenancy. `None` when no placement detail was requested.
fn placement(spec: &LaunchSpec) -> Option<Placement> {
    let dedicated = matches!(
        spec.placement,
        NetworkPlacement::Vpc {
            dedicated_tenancy: true,
            ..
        }
    );
    if spec.availability_zone.is_none() && spec.placement_group.is_none() && !dedicated {
        return None;
    }

    let mut builder = Placement::builder();
    if let Some(zone) = spec.availability_zone.as_deref() {
        builder = builder.availability_zone(zone);
    }
    if let Some(group) = spec.placement_group.as_deref() {
        builder = builder.group_name(group);
    }
    if dedicated {
        builder = builder.tenancy(Tenancy::Dedicated);
    }
    Some(builder.build())
}

/// Wires the network placement into the request.
///
/// A VPC launch with an explicit public-IP association must carry subnet,
/// groups, and private address on a device-0 network interface; EC2 rejects
/// the association flag alongside the top-level fields.
fn apply_network(
    mut request: RunInstancesFluentBuilder,
    placement: &NetworkPlacement,
) -> RunInstancesFluentBuilder {
    match placement {
        NetworkPlacement::Classic { group_names } => {
            for name in group_names {
                request = request.security_groups(name);
            }
            request
        }
        NetworkPlacement::Vpc {
            subnet_id,
            group_ids,
            private_ip,
            associate_public_ip: Some(associate),
            ..
        } => {
            let mut interface = InstanceNetworkInterfaceSpecification::builder()
                .device_index(0)
                .subnet_id(subnet_id)
                .associate_public_ip_address(*associate);
            for id in group_ids {
                interface = interface.groups(id);
            }
            if let Some(address) = private_ip.as_deref() {
                interface = interface.private_ip_address(address);
            }
            request.network_interfaces(interface.build())
        }
        NetworkPlacement::Vpc {
            subnet_id,
            group_ids,
            private_ip,
            associate_public_ip: None,
            ..
        } => {
            request = request.subnet_id(subnet_id);
            for id in group_ids {
                request = request.security_group_ids(id);
            }
            if let Some(address) = private_ip.as_deref() {
                request = request.private_ip_address(address);
            }
            request
        }
    }
}

fn block_device_mappings(storage: &StorageSpec) -> Vec<BlockDeviceMapping> {
    let mut mappings = Vec::with_capacity(storage.ephemeral.len() + 1);
    if let Some(root) = storage.root.as_ref() {
        let mut ebs = EbsBlockDevice::builder()
            .volume_size(root.size_gib)
            .volume_type(AwsVolumeType::from(root.volume_type.as_str()))
            .delete_on_termination(root.delete_on_termination);
        if let Some(iops) = root.iops {
            ebs = ebs.iops(iops);
        }
        mappings.push(
            BlockDeviceMapping::builder()
                .device_name(&root.device_name)
                .ebs(ebs.build())
                .build(),
        );
    }
    for device in &storage.ephemeral {
        mappings.push(
            BlockDeviceMapping::builder()
                .device_name(&device.device_name)
                .virtual_name(&device.virtual_name)
                .build(),
        );
    }
    mappings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{EphemeralDevice, RootVolume, VolumeType};

    #[test]
    fn root_and_ephemeral_mappings_are_emitted_in_order() {
        let storage = StorageSpec {
            root: Some(RootVolume {
                device_name: String::from("/dev/sda1"),
                size_gib: 50,
                volume_type: VolumeType::Io1,
                iops: Some(1000),
                delete_on_termination: false,
            }),
            ephemeral: vec![
                EphemeralDevice {
                    virtual_name: String::from("ephemeral0"),
                    device_name: String::from("/dev/sdb"),
                },
                EphemeralDevice {
                    virtual_name: String::from("ephemeral1"),
                    device_name: String::from("/dev/sdc"),
                },
            ],
        };

        let mappings = block_device_mappings(&storage);

        assert_eq!(mappings.len(), 3);
        let root = mappings[0].ebs().expect("root ebs block");
        assert_eq!(root.volume_size(), Some(50));
        assert_eq!(root.volume_type(), Some(&AwsVolumeType::Io1));
        assert_eq!(root.iops(), Some(1000));
        assert_eq!(root.delete_on_termination(), Some(false));
        assert_eq!(mappings[1].virtual_name(), Some("ephemeral0"));
        assert_eq!(mappings[1].device_name(), Some("/dev/sdb"));
        assert_eq!(mappings[2].virtual_name(), Some("ephemeral1"));
    }

    #[test]
    fn instance_store_only_storage_emits_no_root_mapping() {
        let storage = StorageSpec {
            root: None,
            ephemeral: vec![EphemeralDevice {
                virtual_name: String::from("ephemeral0"),
                device_name: String::from("/dev/sdb"),
            }],
        };

        let mappings = block_device_mappings(&storage);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].ebs(), None);
    }

    #[test]
    fn dedicated_vpc_placement_requests_dedicated_tenancy() {
        let spec = LaunchSpec {
            image_id: String::from("ami-1"),
            flavor: String::from("m4.large"),
            key_name: None,
            availability_zone: None,
            placement_group: None,
            iam_profile: None,
            ebs_optimized: false,
            placement: NetworkPlacement::Vpc {
                subnet_id: String::from("subnet-1"),
                group_ids: Vec::new(),
                private_ip: None,
                associate_public_ip: None,
                dedicated_tenancy: true,
            },
            storage: StorageSpec::default(),
            user_data: None,
            node_name: None,
            tags: Vec::new(),
            windows: false,
        };

        let placement = placement(&spec).expect("placement block");
        assert_eq!(placement.tenancy(), Some(&Tenancy::Dedicated));
        assert_eq!(placement.availability_zone(), None);
    }

    #[test]
    fn bare_classic_spec_needs_no_placement_block() {
        let spec = LaunchSpec {
            image_id: String::from("ami-1"),
            flavor: String::from("t2.micro"),
            key_name: None,
            availability_zone: None,
            placement_group: None,
            iam_profile: None,
            ebs_optimized: false,
            placement: NetworkPlacement::Classic {
                group_names: vec![String::from("default")],
            },
            storage: StorageSpec::default(),
            user_data: None,
            node_name: None,
            tags: Vec::new(),
            windows: false,
        };

        assert_eq!(placement(&spec), None);
    }
}
