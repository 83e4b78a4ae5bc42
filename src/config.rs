//! Configuration loading and option resolution.
//!
//! Persisted values come from `skylift.toml` (or `.skylift.toml`) and the
//! `SKYLIFT_*` environment, merged by `ortho-config`. The CLI layer is then
//! overlaid explicitly by [`EffectiveConfig::resolve`] so the precedence —
//! flag over persisted value over compiled-in default over absent — is
//! visible in one place and produces a single immutable value per option.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::CreateCommand;

/// Persisted defaults for the `create` flow, layered via `OrthoConfig`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SKYLIFT",
    discovery(
        app_name = "skylift",
        env_var = "SKYLIFT_CONFIG_PATH",
        config_file_name = "skylift.toml",
        dotfile_name = ".skylift.toml",
        project_file_name = "skylift.toml"
    )
)]
pub struct Ec2Config {
    /// AWS region used for every API call.
    #[ortho_config(default = "us-east-1".to_owned())]
    pub region: String,
    /// Default node name for the Name tag and fleet registration.
    pub node_name: Option<String>,
    /// Default machine image identifier.
    pub image: Option<String>,
    /// Default instance type.
    #[ortho_config(default = "t2.micro".to_owned())]
    pub flavor: String,
    /// Default availability zone.
    pub availability_zone: Option<String>,
    /// Default placement group.
    pub placement_group: Option<String>,
    /// Default key pair name.
    pub ssh_key: Option<String>,
    /// Default classic security group names.
    pub security_groups: Option<Vec<String>>,
    /// Default VPC security group ids.
    pub security_group_ids: Option<Vec<String>>,
    /// Default subnet id; presence selects VPC placement.
    pub subnet: Option<String>,
    /// Default fixed private IP address.
    pub private_ip_address: Option<String>,
    /// Default public-IP association behaviour at launch.
    pub associate_public_ip: Option<bool>,
    /// Launch with dedicated tenancy by default.
    pub dedicated: Option<bool>,
    /// Default root EBS volume size in GiB.
    pub ebs_size: Option<i32>,
    /// Default root EBS volume type.
    pub ebs_volume_type: Option<String>,
    /// Default provisioned IOPS rate.
    pub ebs_provisioned_iops: Option<i32>,
    /// Launch EBS-optimized by default.
    pub ebs_optimized: Option<bool>,
    /// Keep the root volume after termination by default.
    pub ebs_no_delete_on_term: Option<bool>,
    /// Default instance-store device paths.
    pub ephemeral: Option<Vec<String>>,
    /// Default IAM instance profile name.
    pub iam_profile: Option<String>,
    /// Default tags as `key=value` entries.
    pub tags: Option<Vec<String>>,
    /// Default user-data file path.
    pub user_data: Option<String>,
    /// Default target platform.
    #[ortho_config(default = "linux".to_owned())]
    pub platform: String,
    /// Default bootstrap protocol override.
    pub bootstrap_protocol: Option<String>,
    /// Default SSH user.
    #[ortho_config(default = "ubuntu".to_owned())]
    pub ssh_user: String,
    /// Default SSH port.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Default identity file for the bootstrap connection.
    pub identity_file: Option<String>,
    /// Default WinRM user.
    #[ortho_config(default = "Administrator".to_owned())]
    pub winrm_user: String,
    /// Default WinRM password.
    pub winrm_password: Option<String>,
    /// Default WinRM port.
    #[ortho_config(default = 5985)]
    pub winrm_port: u16,
    /// Elastic IP to associate after creation.
    pub associate_eip: Option<String>,
    /// Address attribute override for the bootstrap connection.
    pub connect_attribute: Option<String>,
    /// Terminate the instance when bootstrap fails.
    pub delete_on_failure: Option<bool>,
    /// Distribution hint handed to the bootstrap step.
    pub distro: Option<String>,
    /// Remote command executed by the process-backed bootstrapper.
    #[ortho_config(default = "sudo cloud-init status --wait".to_owned())]
    pub bootstrap_command: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `winrs`-compatible executable.
    #[ortho_config(default = "winrs".to_owned())]
    pub winrs_bin: String,
    /// Attempts made while the new instance is not yet visible for tagging.
    #[ortho_config(default = 6)]
    pub visibility_attempts: u32,
    /// Delay in seconds between visibility attempts.
    #[ortho_config(default = 5)]
    pub visibility_delay_secs: u64,
    /// Upper bound in seconds on the elastic-IP association wait.
    #[ortho_config(default = 120)]
    pub association_timeout_secs: u64,
    /// Poll interval in seconds during the association wait.
    #[ortho_config(default = 5)]
    pub association_poll_secs: u64,
}

impl Ec2Config {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables; CLI
    /// flags are overlaid separately by [`EffectiveConfig::resolve`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("skylift")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Errors raised during configuration loading.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

/// One resolved value per option, CLI flag over persisted value.
///
/// Resolution is a pure function of its two inputs: calling
/// [`EffectiveConfig::resolve`] twice with identical arguments yields
/// identical results, and neither input is mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EffectiveConfig {
    /// AWS region used for every API call.
    pub region: String,
    /// Node name used for the Name tag, when configured.
    pub node_name: Option<String>,
    /// Machine image identifier to launch from.
    pub image: Option<String>,
    /// Instance type to request.
    pub flavor: String,
    /// Availability zone for the instance.
    pub availability_zone: Option<String>,
    /// Placement group to launch into.
    pub placement_group: Option<String>,
    /// Key pair name for SSH access.
    pub ssh_key: Option<String>,
    /// Classic security group names.
    pub security_groups: Vec<String>,
    /// VPC security group ids.
    pub security_group_ids: Vec<String>,
    /// Subnet id; presence selects VPC placement.
    pub subnet: Option<String>,
    /// Fixed private IP address.
    pub private_ip_address: Option<String>,
    /// Public-IP association behaviour at launch.
    pub associate_public_ip: Option<bool>,
    /// Dedicated tenancy flag.
    pub dedicated: bool,
    /// Root EBS volume size override in GiB.
    pub ebs_size: Option<i32>,
    /// Root EBS volume type, unparsed.
    pub ebs_volume_type: Option<String>,
    /// Provisioned IOPS rate.
    pub ebs_provisioned_iops: Option<i32>,
    /// EBS-optimized launch flag.
    pub ebs_optimized: bool,
    /// Keep the root volume after termination.
    pub ebs_no_delete_on_term: bool,
    /// Instance-store device paths in mapping order.
    pub ephemeral: Vec<String>,
    /// IAM instance profile name.
    pub iam_profile: Option<String>,
    /// Raw `key=value` tag entries.
    pub tags: Vec<String>,
    /// User-data file path.
    pub user_data: Option<String>,
    /// Target platform, unparsed.
    pub platform: String,
    /// Bootstrap protocol override, unparsed.
    pub bootstrap_protocol: Option<String>,
    /// SSH user for bootstrap.
    pub ssh_user: String,
    /// SSH port on the instance.
    pub ssh_port: u16,
    /// Identity file for the bootstrap connection.
    pub identity_file: Option<String>,
    /// WinRM user for bootstrap.
    pub winrm_user: String,
    /// WinRM password for bootstrap.
    pub winrm_password: Option<String>,
    /// WinRM port on the instance.
    pub winrm_port: u16,
    /// Elastic IP to associate after creation.
    pub associate_eip: Option<String>,
    /// Address attribute override, unparsed.
    pub connect_attribute: Option<String>,
    /// Terminate the instance when bootstrap fails.
    pub delete_on_failure: bool,
    /// Distribution hint handed to the bootstrap step.
    pub distro: Option<String>,
    /// Remote command executed by the process-backed bootstrapper.
    pub bootstrap_command: String,
    /// Path to the `ssh` executable.
    pub ssh_bin: String,
    /// Path to the `winrs`-compatible executable.
    pub winrs_bin: String,
    /// Attempts made while the new instance is not yet visible for tagging.
    pub visibility_attempts: u32,
    /// Delay between visibility attempts.
    pub visibility_delay: Duration,
    /// Upper bound on the elastic-IP association wait.
    pub association_timeout: Duration,
    /// Poll interval during the association wait.
    pub association_poll: Duration,
}

impl EffectiveConfig {
    /// Overlays CLI flags over persisted configuration.
    ///
    /// A supplied flag always wins; an omitted flag falls back to the
    /// persisted value, which itself already carries the compiled-in
    /// defaults from [`Ec2Config`].
    #[must_use]
    pub fn resolve(cli: &CreateCommand, cfg: &Ec2Config) -> Self {
        Self {
            region: cli.region.clone().unwrap_or_else(|| cfg.region.clone()),
            node_name: cli.node_name.clone().or_else(|| cfg.node_name.clone()),
            image: cli.image.clone().or_else(|| cfg.image.clone()),
            flavor: cli.flavor.clone().unwrap_or_else(|| cfg.flavor.clone()),
            availability_zone: cli
                .availability_zone
                .clone()
                .or_else(|| cfg.availability_zone.clone()),
            placement_group: cli
                .placement_group
                .clone()
                .or_else(|| cfg.placement_group.clone()),
            ssh_key: cli.ssh_key.clone().or_else(|| cfg.ssh_key.clone()),
            security_groups: cli
                .security_groups
                .clone()
                .or_else(|| cfg.security_groups.clone())
                .unwrap_or_default(),
            security_group_ids: cli
                .security_group_ids
                .clone()
                .or_else(|| cfg.security_group_ids.clone())
                .unwrap_or_default(),
            subnet: cli.subnet.clone().or_else(|| cfg.subnet.clone()),
            private_ip_address: cli
                .private_ip_address
                .clone()
                .or_else(|| cfg.private_ip_address.clone()),
            associate_public_ip: cli.associate_public_ip.or(cfg.associate_public_ip),
            dedicated: cli.dedicated || cfg.dedicated.unwrap_or(false),
            ebs_size: cli.ebs_size.or(cfg.ebs_size),
            ebs_volume_type: cli
                .ebs_volume_type
                .clone()
                .or_else(|| cfg.ebs_volume_type.clone()),
            ebs_provisioned_iops: cli.ebs_provisioned_iops.or(cfg.ebs_provisioned_iops),
            ebs_optimized: cli.ebs_optimized || cfg.ebs_optimized.unwrap_or(false),
            ebs_no_delete_on_term: cli.ebs_no_delete_on_term
                || cfg.ebs_no_delete_on_term.unwrap_or(false),
            ephemeral: cli
                .ephemeral
                .clone()
                .or_else(|| cfg.ephemeral.clone())
                .unwrap_or_default(),
            iam_profile: cli.iam_profile.clone().or_else(|| cfg.iam_profile.clone()),
            tags: cli
                .tags
                .clone()
                .or_else(|| cfg.tags.clone())
                .unwrap_or_default(),
            user_data: cli.user_data.clone().or_else(|| cfg.user_data.clone()),
            platform: cli.platform.clone().unwrap_or_else(|| cfg.platform.clone()),
            bootstrap_protocol: cli
                .bootstrap_protocol
                .clone()
                .or_else(|| cfg.bootstrap_protocol.clone()),
            ssh_user: cli.ssh_user.clone().unwrap_or_else(|| cfg.ssh_user.clone()),
            ssh_port: cli.ssh_port.unwrap_or(cfg.ssh_port),
            identity_file: cli
                .identity_file
                .clone()
                .or_else(|| cfg.identity_file.clone()),
            winrm_user: cli
                .winrm_user
                .clone()
                .unwrap_or_else(|| cfg.winrm_user.clone()),
            winrm_password: cli
                .winrm_password
                .clone()
                .or_else(|| cfg.winrm_password.clone()),
            winrm_port: cli.winrm_port.unwrap_or(cfg.winrm_port),
            associate_eip: cli
                .associate_eip
                .clone()
                .or_else(|| cfg.associate_eip.clone()),
            connect_attribute: cli
                .connect_attribute
                .clone()
                .or_else(|| cfg.connect_attribute.clone()),
            delete_on_failure: cli.delete_on_failure || cfg.delete_on_failure.unwrap_or(false),
            distro: cli.distro.clone().or_else(|| cfg.distro.clone()),
            bootstrap_command: cfg.bootstrap_command.clone(),
            ssh_bin: cfg.ssh_bin.clone(),
            winrs_bin: cfg.winrs_bin.clone(),
            visibility_attempts: cfg.visibility_attempts,
            visibility_delay: Duration::from_secs(cfg.visibility_delay_secs),
            association_timeout: Duration::from_secs(cfg.association_timeout_secs),
            association_poll: Duration::from_secs(cfg.association_poll_secs),
        }
    }

    /// Returns `true` when a subnet id selects VPC placement.
    #[must_use]
    pub const fn vpc_mode(&self) -> bool {
        self.subnet.is_some()
    }
}
