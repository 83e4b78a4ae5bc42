//! Launch specification assembly.
//!
//! [`LaunchSpec::build`] is a pure function of the resolved configuration
//! and the target image's metadata. It owns the option interactions that
//! make the create call non-trivial: VPC versus classic placement, EBS
//! root volume derivation, provisioned-IOPS coupling, ordered ephemeral
//! device mappings, and platform-dependent user-data handling.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::EffectiveConfig;
use crate::gateway::{AmiMetadata, RootDeviceKind};
use crate::user_data;
use crate::validate::{ValidationError, ValidationFailure, ValidationKind};

/// Raised when an enumerated option carries a value outside its enumeration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown {option} '{value}'")]
pub struct UnknownOptionValue {
    /// Option the value was supplied for.
    pub option: &'static str,
    /// The rejected value.
    pub value: String,
}

/// Target platform for the new instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Platform {
    /// Any non-Windows target, bootstrapped over SSH.
    Linux,
    /// Windows target, bootstrapped over WinRM.
    Windows,
}

impl FromStr for Platform {
    type Err = UnknownOptionValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            other => Err(UnknownOptionValue {
                option: "platform",
                value: other.to_owned(),
            }),
        }
    }
}

/// EBS volume types accepted for the root volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeType {
    /// Magnetic volumes.
    Standard,
    /// General purpose SSD.
    Gp2,
    /// General purpose SSD, third generation.
    Gp3,
    /// Provisioned-IOPS SSD; the only type that accepts an IOPS rate.
    Io1,
}

impl VolumeType {
    /// Provider-side name for the volume type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Gp2 => "gp2",
            Self::Gp3 => "gp3",
            Self::Io1 => "io1",
        }
    }
}

impl fmt::Display for VolumeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolumeType {
    type Err = UnknownOptionValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "standard" => Ok(Self::Standard),
            "gp2" => Ok(Self::Gp2),
            "gp3" => Ok(Self::Gp3),
            "io1" => Ok(Self::Io1),
            other => Err(UnknownOptionValue {
                option: "volume type",
                value: other.to_owned(),
            }),
        }
    }
}

/// Address attribute the bootstrap connection may be forced through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectAttribute {
    /// The server's public IPv4 address.
    PublicIp,
    /// The server's private IPv4 address.
    PrivateIp,
    /// The server's public DNS name.
    PublicDns,
    /// The server's private DNS name.
    PrivateDns,
}

impl FromStr for ConnectAttribute {
    type Err = UnknownOptionValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "public_ip" => Ok(Self::PublicIp),
            "private_ip" => Ok(Self::PrivateIp),
            "public_dns" => Ok(Self::PublicDns),
            "private_dns" => Ok(Self::PrivateDns),
            other => Err(UnknownOptionValue {
                option: "connect attribute",
                value: other.to_owned(),
            }),
        }
    }
}

/// Network placement for the new instance. VPC and classic placement are
/// mutually exclusive by construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NetworkPlacement {
    /// Classic networking, selected by the absence of a subnet id.
    Classic {
        /// Security group names.
        group_names: Vec<String>,
    },
    /// VPC placement, selected by the presence of a subnet id.
    Vpc {
        /// Subnet to place the instance in.
        subnet_id: String,
        /// Security group ids, the only group selector in VPC mode.
        group_ids: Vec<String>,
        /// Fixed private IP address, when requested.
        private_ip: Option<String>,
        /// Public-IP association behaviour at launch, when requested.
        associate_public_ip: Option<bool>,
        /// Dedicated tenancy flag.
        dedicated_tenancy: bool,
    },
}

/// Root EBS volume request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RootVolume {
    /// Device name the volume is attached at.
    pub device_name: String,
    /// Volume size in GiB.
    pub size_gib: i32,
    /// Volume type.
    pub volume_type: VolumeType,
    /// Provisioned IOPS rate; present only for [`VolumeType::Io1`].
    pub iops: Option<i32>,
    /// Whether the volume is deleted when the instance terminates.
    pub delete_on_termination: bool,
}

/// One instance-store device mapping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EphemeralDevice {
    /// Synthetic virtual name, `ephemeral{index}` in list order.
    pub virtual_name: String,
    /// Device path the store is exposed at.
    pub device_name: String,
}

/// Storage portion of a launch spec.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StorageSpec {
    /// Root EBS volume, for EBS-backed images.
    pub root: Option<RootVolume>,
    /// Instance-store mappings in list order.
    pub ephemeral: Vec<EphemeralDevice>,
}

/// Provider-ready description of the instance to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchSpec {
    /// Image identifier to launch from.
    pub image_id: String,
    /// Instance type to request.
    pub flavor: String,
    /// Key pair name, when configured.
    pub key_name: Option<String>,
    /// Availability zone, when pinned.
    pub availability_zone: Option<String>,
    /// Placement group, when requested.
    pub placement_group: Option<String>,
    /// IAM instance profile name, when requested.
    pub iam_profile: Option<String>,
    /// EBS-optimized launch flag.
    pub ebs_optimized: bool,
    /// Network placement.
    pub placement: NetworkPlacement,
    /// Storage request.
    pub storage: StorageSpec,
    /// User-data payload, already platform-wrapped.
    pub user_data: Option<String>,
    /// Node name for the Name tag; the instance id is used when absent.
    pub node_name: Option<String>,
    /// User-supplied tag pairs in input order.
    pub tags: Vec<(String, String)>,
    /// Whether the target is a Windows instance.
    pub windows: bool,
}

impl LaunchSpec {
    /// Assembles a launch spec from resolved configuration and image
    /// metadata. Pure apart from reading the configured user-data file.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationFailure`] carrying every malformed option found
    /// (tags, platform, volume type) rather than stopping at the first.
    pub fn build(
        config: &EffectiveConfig,
        ami: &AmiMetadata,
    ) -> Result<Self, ValidationFailure> {
        let mut errors = Vec::new();

        let tags = match parse_tag_pairs(&config.tags) {
            Ok(pairs) => pairs,
            Err(err) => {
                errors.push(ValidationError::new(
                    ValidationKind::MalformedTags,
                    err.to_string(),
                ));
                Vec::new()
            }
        };

        let platform = match Platform::from_str(&config.platform) {
            Ok(platform) => platform,
            Err(err) => {
                errors.push(ValidationError::new(
                    ValidationKind::UnknownPlatform,
                    err.to_string(),
                ));
                Platform::Linux
            }
        };

        let storage = match storage_spec(config, ami) {
            Ok(storage) => storage,
            Err(err) => {
                errors.push(err);
                StorageSpec::default()
            }
        };

        if !errors.is_empty() {
            return Err(ValidationFailure::new(errors));
        }

        let windows = platform == Platform::Windows || ami.windows;
        let user_data = user_data::resolve(config.user_data.as_deref(), windows);

        Ok(Self {
            image_id: ami.image_id.clone(),
            flavor: config.flavor.clone(),
            key_name: config.ssh_key.clone(),
            availability_zone: config.availability_zone.clone(),
            placement_group: config.placement_group.clone(),
            iam_profile: config.iam_profile.clone(),
            ebs_optimized: config.ebs_optimized,
            placement: network_placement(config),
            storage,
            user_data,
            node_name: config.node_name.clone(),
            tags,
            windows,
        })
    }

    /// Returns the complete tag set for the server: the Name tag first,
    /// using `fallback_name` when no node name was configured, followed by
    /// the user-supplied pairs in input order.
    #[must_use]
    pub fn tag_pairs(&self, fallback_name: &str) -> Vec<(String, String)> {
        let name = self
            .node_name
            .clone()
            .unwrap_or_else(|| fallback_name.to_owned());
        let mut pairs = Vec::with_capacity(self.tags.len() + 1);
        pairs.push((String::from("Name"), name));
        pairs.extend(self.tags.iter().cloned());
        pairs
    }

    /// Returns `true` when the spec places the instance in a VPC.
    #[must_use]
    pub const fn vpc_mode(&self) -> bool {
        matches!(self.placement, NetworkPlacement::Vpc { .. })
    }
}

fn network_placement(config: &EffectiveConfig) -> NetworkPlacement {
    config.subnet.as_ref().map_or_else(
        || NetworkPlacement::Classic {
            group_names: config.security_groups.clone(),
        },
        |subnet| NetworkPlacement::Vpc {
            subnet_id: subnet.clone(),
            group_ids: config.security_group_ids.clone(),
            private_ip: config.private_ip_address.clone(),
            associate_public_ip: config.associate_public_ip,
            dedicated_tenancy: config.dedicated,
        },
    )
}

fn storage_spec(
    config: &EffectiveConfig,
    ami: &AmiMetadata,
) -> Result<StorageSpec, ValidationError> {
    let root = if ami.root_device == RootDeviceKind::Ebs {
        let volume_type = match config.ebs_volume_type.as_deref() {
            Some(raw) => VolumeType::from_str(raw).map_err(|err| {
                ValidationError::new(ValidationKind::UnknownVolumeType, err.to_string())
            })?,
            None => VolumeType::Gp2,
        };
        let defaults = ami.root_volume.as_ref();
        let size_gib = config
            .ebs_size
            .or_else(|| defaults.map(|root| root.volume_size_gib))
            .unwrap_or(8);
        Some(RootVolume {
            device_name: defaults
                .map_or_else(|| String::from("/dev/sda1"), |root| root.device_name.clone()),
            size_gib,
            volume_type,
            iops: config.ebs_provisioned_iops,
            delete_on_termination: !config.ebs_no_delete_on_term,
        })
    } else {
        None
    };

    let ephemeral = config
        .ephemeral
        .iter()
        .enumerate()
        .map(|(index, device)| EphemeralDevice {
            virtual_name: format!("ephemeral{index}"),
            device_name: device.clone(),
        })
        .collect();

    Ok(StorageSpec { root, ephemeral })
}

/// Raised when the tag option does not split cleanly into `key=value` pairs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("tags '{raw}' are not well-formed key=value pairs")]
pub struct TagParseError {
    /// The raw tag input as supplied.
    pub raw: String,
}

/// Splits tag entries strictly on `=`.
///
/// The total number of `=` characters must equal the number of entries and
/// every entry must yield a non-empty key and value.
///
/// # Errors
///
/// Returns [`TagParseError`] naming the raw input when the split fails.
pub fn parse_tag_pairs(entries: &[String]) -> Result<Vec<(String, String)>, TagParseError> {
    let malformed = || TagParseError {
        raw: entries.join(","),
    };

    let equals_count: usize = entries.iter().map(|entry| entry.matches('=').count()).sum();
    if equals_count != entries.len() {
        return Err(malformed());
    }

    let mut pairs = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            return Err(malformed());
        };
        if key.is_empty() || value.is_empty() {
            return Err(malformed());
        }
        pairs.push((key.to_owned(), value.to_owned()));
    }
    Ok(pairs)
}
