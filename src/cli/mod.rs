//! Command-line interface definitions for the `skylift` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `skylift` binary.
#[derive(Debug, Parser)]
#[command(
    name = "skylift",
    about = "Provision EC2 instances and bootstrap them into a managed fleet",
    arg_required_else_help = true
)]
pub enum Cli {
    /// Create an instance, wait for it, tag it, and bootstrap it.
    #[command(
        name = "create",
        about = "Create an instance, wait for it, tag it, and bootstrap it"
    )]
    Create(Box<CreateCommand>),
}

/// Arguments for the `skylift create` subcommand.
///
/// Every flag overrides the corresponding value from `skylift.toml` or the
/// `SKYLIFT_*` environment; an omitted flag falls back to the persisted value.
#[derive(Clone, Debug, Default, Parser)]
pub struct CreateCommand {
    /// AWS region to provision in.
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,
    /// Node name used for the Name tag and the fleet registration.
    #[arg(short = 'N', long, value_name = "NAME")]
    pub node_name: Option<String>,
    /// Machine image identifier to launch from.
    #[arg(short = 'I', long, value_name = "IMAGE")]
    pub image: Option<String>,
    /// Instance type (flavor) to request.
    #[arg(short = 'f', long, value_name = "FLAVOR")]
    pub flavor: Option<String>,
    /// Availability zone for the instance.
    #[arg(short = 'Z', long, value_name = "ZONE")]
    pub availability_zone: Option<String>,
    /// Placement group to launch the instance into.
    #[arg(long, value_name = "GROUP")]
    pub placement_group: Option<String>,
    /// Key pair registered with the provider for SSH access.
    #[arg(short = 'S', long, value_name = "KEY")]
    pub ssh_key: Option<String>,
    /// Security group names (classic networking only).
    #[arg(short = 'G', long, value_name = "GROUPS", value_delimiter = ',')]
    pub security_groups: Option<Vec<String>>,
    /// Security group ids (the only selector in VPC mode).
    #[arg(short = 'g', long, value_name = "IDS", value_delimiter = ',')]
    pub security_group_ids: Option<Vec<String>>,
    /// Subnet id; presence selects VPC placement.
    #[arg(short = 's', long, value_name = "SUBNET")]
    pub subnet: Option<String>,
    /// Fixed private IP address (VPC only).
    #[arg(long, value_name = "IP")]
    pub private_ip_address: Option<String>,
    /// Request (or suppress) a public IP at launch (VPC only).
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub associate_public_ip: Option<bool>,
    /// Launch with dedicated tenancy (VPC only).
    #[arg(long)]
    pub dedicated: bool,
    /// Root EBS volume size in GiB.
    #[arg(long, value_name = "GIB")]
    pub ebs_size: Option<i32>,
    /// Root EBS volume type (standard, gp2, gp3, io1).
    #[arg(long, value_name = "TYPE")]
    pub ebs_volume_type: Option<String>,
    /// Provisioned IOPS rate (requires --ebs-volume-type io1).
    #[arg(long, value_name = "IOPS")]
    pub ebs_provisioned_iops: Option<i32>,
    /// Launch the instance as EBS-optimized.
    #[arg(long)]
    pub ebs_optimized: bool,
    /// Keep the root volume after the instance terminates.
    #[arg(long)]
    pub ebs_no_delete_on_term: bool,
    /// Instance-store device paths, mapped to ephemeral0..N in order.
    #[arg(long, value_name = "DEVICES", value_delimiter = ',')]
    pub ephemeral: Option<Vec<String>>,
    /// IAM instance profile name to attach.
    #[arg(long, value_name = "PROFILE")]
    pub iam_profile: Option<String>,
    /// Tags as comma-separated key=value pairs.
    #[arg(short = 'T', long, value_name = "TAGS", value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
    /// File whose contents become the instance user-data.
    #[arg(long, value_name = "PATH")]
    pub user_data: Option<String>,
    /// Target platform: linux or windows.
    #[arg(long, value_name = "PLATFORM")]
    pub platform: Option<String>,
    /// Bootstrap protocol: ssh or winrm (defaults from the platform).
    #[arg(long, value_name = "PROTOCOL")]
    pub bootstrap_protocol: Option<String>,
    /// Remote user for SSH bootstrap.
    #[arg(short = 'x', long, value_name = "USER")]
    pub ssh_user: Option<String>,
    /// SSH port on the instance.
    #[arg(short = 'p', long, value_name = "PORT")]
    pub ssh_port: Option<u16>,
    /// Private key file used to authenticate the bootstrap connection.
    #[arg(short = 'i', long, value_name = "PATH")]
    pub identity_file: Option<String>,
    /// Remote user for WinRM bootstrap.
    #[arg(long, value_name = "USER")]
    pub winrm_user: Option<String>,
    /// Password for WinRM bootstrap.
    #[arg(long, value_name = "PASSWORD")]
    pub winrm_password: Option<String>,
    /// WinRM port on the instance.
    #[arg(long, value_name = "PORT")]
    pub winrm_port: Option<u16>,
    /// Pre-allocated elastic IP to associate after creation.
    #[arg(long, value_name = "IP")]
    pub associate_eip: Option<String>,
    /// Address attribute to bootstrap through
    /// (public_ip, private_ip, public_dns, private_dns).
    #[arg(long, value_name = "ATTRIBUTE")]
    pub connect_attribute: Option<String>,
    /// Terminate the instance when bootstrap fails.
    #[arg(long)]
    pub delete_on_failure: bool,
    /// Distribution hint handed to the bootstrap step.
    #[arg(short = 'd', long, value_name = "DISTRO")]
    pub distro: Option<String>,
}
