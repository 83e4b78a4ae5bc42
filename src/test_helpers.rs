//! Shared fixtures for unit tests.

use crate::cli::CreateCommand;
use crate::config::{Ec2Config, EffectiveConfig};
use crate::gateway::{AmiMetadata, AmiRootDevice, RootDeviceKind};

/// A persisted configuration carrying only the compiled-in defaults, as if
/// no file or environment values were present.
pub fn file_config() -> Ec2Config {
    Ec2Config {
        region: String::from("us-east-1"),
        node_name: None,
        image: None,
        flavor: String::from("t2.micro"),
        availability_zone: None,
        placement_group: None,
        ssh_key: None,
        security_groups: None,
        security_group_ids: None,
        subnet: None,
        private_ip_address: None,
        associate_public_ip: None,
        dedicated: None,
        ebs_size: None,
        ebs_volume_type: None,
        ebs_provisioned_iops: None,
        ebs_optimized: None,
        ebs_no_delete_on_term: None,
        ephemeral: None,
        iam_profile: None,
        tags: None,
        user_data: None,
        platform: String::from("linux"),
        bootstrap_protocol: None,
        ssh_user: String::from("ubuntu"),
        ssh_port: 22,
        identity_file: None,
        winrm_user: String::from("Administrator"),
        winrm_password: None,
        winrm_port: 5985,
        associate_eip: None,
        connect_attribute: None,
        delete_on_failure: None,
        distro: None,
        bootstrap_command: String::from("sudo cloud-init status --wait"),
        ssh_bin: String::from("ssh"),
        winrs_bin: String::from("winrs"),
        visibility_attempts: 6,
        visibility_delay_secs: 5,
        association_timeout_secs: 120,
        association_poll_secs: 5,
    }
}

/// Resolves an [`EffectiveConfig`] with an image pre-set and the supplied
/// CLI mutations applied.
pub fn effective(mutate: impl FnOnce(&mut CreateCommand)) -> EffectiveConfig {
    let mut cli = CreateCommand {
        image: Some(String::from("ami-1")),
        ..CreateCommand::default()
    };
    mutate(&mut cli);
    EffectiveConfig::resolve(&cli, &file_config())
}

/// An EBS-backed image with the given snapshot size.
pub fn ebs_ami(volume_size_gib: i32) -> AmiMetadata {
    AmiMetadata {
        image_id: String::from("ami-1"),
        root_device: RootDeviceKind::Ebs,
        root_volume: Some(AmiRootDevice {
            device_name: String::from("/dev/sda1"),
            volume_size_gib,
            iops: None,
            delete_on_termination: true,
        }),
        windows: false,
    }
}
