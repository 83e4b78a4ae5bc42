//! Pre-flight and post-connection validation batteries.
//!
//! Every check in a battery runs regardless of earlier failures so the
//! user sees all violations together, once, before any cloud resource is
//! created. The pre-flight battery needs nothing but the resolved
//! configuration; the post-connection battery additionally needs the AMI
//! lookup result and the elastic-IP catalog.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::bootstrap::{BootstrapProtocol, effective_protocol};
use crate::config::EffectiveConfig;
use crate::gateway::{AddressScope, AmiMetadata, ElasticIp};
use crate::launch::{ConnectAttribute, Platform, VolumeType, parse_tag_pairs};

/// Classification of a validation violation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ValidationKind {
    /// SSH bootstrap with an identity file needs a key pair name.
    KeyPairRequired,
    /// The platform option is outside its enumeration.
    UnknownPlatform,
    /// Classic security group names are forbidden in VPC mode.
    ClassicGroupsInVpc,
    /// A fixed private IP needs VPC placement.
    PrivateIpRequiresVpc,
    /// Dedicated tenancy needs VPC placement.
    TenancyRequiresVpc,
    /// Public-IP association needs a subnet.
    PublicIpRequiresSubnet,
    /// Provisioned IOPS and the io1 volume type are mutually required.
    IopsCoupling,
    /// The volume type option is outside its enumeration.
    UnknownVolumeType,
    /// No image identifier was configured.
    MissingImage,
    /// The tag option does not split into key=value pairs.
    MalformedTags,
    /// The bootstrap protocol option is outside its enumeration.
    UnknownProtocol,
    /// The connect-attribute option is outside its enumeration.
    UnknownConnectAttribute,
    /// The configured image does not resolve to any provider image.
    ImageNotFound,
    /// The requested elastic IP is not in the account's catalog.
    ElasticIpUnknown,
    /// The requested elastic IP lives in the wrong scope.
    ElasticIpScope,
    /// The requested elastic IP is already attached.
    ElasticIpInUse,
    /// The explicit EBS size is smaller than the image snapshot.
    EbsSizeTooSmall,
}

/// One validation violation: a kind plus a human-readable message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationError {
    kind: ValidationKind,
    message: String,
}

impl ValidationError {
    /// Creates a validation error.
    #[must_use]
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classification of the violation.
    #[must_use]
    pub const fn kind(&self) -> ValidationKind {
        self.kind
    }

    /// Human-readable description of the violation.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The accumulated outcome of a validation battery: every violation found,
/// reported together.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{}", render_batch(.0))]
pub struct ValidationFailure(Vec<ValidationError>);

impl ValidationFailure {
    /// Wraps a non-empty batch of violations.
    #[must_use]
    pub const fn new(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }

    /// The violations in evaluation order.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }
}

fn render_batch(errors: &[ValidationError]) -> String {
    let mut rendered = String::from("validation failed:");
    for error in errors {
        rendered.push_str("\n  - ");
        rendered.push_str(error.message());
    }
    rendered
}

/// Runs every pre-flight check against the resolved configuration.
///
/// No cloud calls are made; all checks are evaluated independently so the
/// returned batch carries every violation, not just the first.
#[must_use]
pub fn preflight(config: &EffectiveConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.identity_file.is_some()
        && matches!(effective_protocol(config), Ok(BootstrapProtocol::Ssh))
        && config.ssh_key.is_none()
    {
        errors.push(ValidationError::new(
            ValidationKind::KeyPairRequired,
            "an SSH identity file requires a key pair name; supply --ssh-key",
        ));
    }

    if let Err(err) = Platform::from_str(&config.platform) {
        errors.push(ValidationError::new(
            ValidationKind::UnknownPlatform,
            format!("{err}; expected linux or windows"),
        ));
    }

    if config.vpc_mode() && !config.security_groups.is_empty() {
        errors.push(ValidationError::new(
            ValidationKind::ClassicGroupsInVpc,
            "security group names cannot be used with a subnet; use --security-group-ids",
        ));
    }

    if config.private_ip_address.is_some() && !config.vpc_mode() {
        errors.push(ValidationError::new(
            ValidationKind::PrivateIpRequiresVpc,
            "a fixed private IP address requires a subnet",
        ));
    }

    if config.dedicated && !config.vpc_mode() {
        errors.push(ValidationError::new(
            ValidationKind::TenancyRequiresVpc,
            "dedicated tenancy requires a subnet",
        ));
    }

    if config.associate_public_ip.is_some() && !config.vpc_mode() {
        errors.push(ValidationError::new(
            ValidationKind::PublicIpRequiresSubnet,
            "public-IP association requires a subnet",
        ));
    }

    errors.extend(iops_coupling(config));

    if let Some(raw) = config.ebs_volume_type.as_deref() {
        if let Err(err) = VolumeType::from_str(raw) {
            errors.push(ValidationError::new(
                ValidationKind::UnknownVolumeType,
                format!("{err}; expected standard, gp2, gp3, or io1"),
            ));
        }
    }

    if config.image.is_none() {
        errors.push(ValidationError::new(
            ValidationKind::MissingImage,
            "no image identifier configured; supply --image",
        ));
    }

    if let Err(err) = parse_tag_pairs(&config.tags) {
        errors.push(ValidationError::new(
            ValidationKind::MalformedTags,
            err.to_string(),
        ));
    }

    if let Some(raw) = config.bootstrap_protocol.as_deref() {
        if BootstrapProtocol::from_str(raw).is_err() {
            errors.push(ValidationError::new(
                ValidationKind::UnknownProtocol,
                format!("unknown bootstrap protocol '{raw}'; expected ssh or winrm"),
            ));
        }
    }

    if let Some(raw) = config.connect_attribute.as_deref() {
        if ConnectAttribute::from_str(raw).is_err() {
            errors.push(ValidationError::new(
                ValidationKind::UnknownConnectAttribute,
                format!(
                    "unknown connect attribute '{raw}'; expected public_ip, private_ip, \
                     public_dns, or private_dns"
                ),
            ));
        }
    }

    errors
}

fn iops_coupling(config: &EffectiveConfig) -> Vec<ValidationError> {
    let io1 = matches!(
        config.ebs_volume_type.as_deref().map(VolumeType::from_str),
        Some(Ok(VolumeType::Io1))
    );
    let mut errors = Vec::new();

    if config.ebs_provisioned_iops.is_some() && !io1 {
        errors.push(ValidationError::new(
            ValidationKind::IopsCoupling,
            "provisioned IOPS require --ebs-volume-type io1",
        ));
    }
    if io1 && config.ebs_provisioned_iops.is_none() {
        errors.push(ValidationError::new(
            ValidationKind::IopsCoupling,
            "volume type io1 requires --ebs-provisioned-iops",
        ));
    }
    errors
}

/// Runs every post-connection check. Requires the AMI lookup result and,
/// when an elastic IP was requested, the account's address catalog.
#[must_use]
pub fn post_connection(
    config: &EffectiveConfig,
    ami: Option<&AmiMetadata>,
    addresses: &[ElasticIp],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if ami.is_none() {
        let image = config.image.as_deref().unwrap_or("<unset>");
        errors.push(ValidationError::new(
            ValidationKind::ImageNotFound,
            format!("image '{image}' does not resolve to any machine image"),
        ));
    }

    if let Some(requested) = config.associate_eip.as_deref() {
        errors.extend(check_elastic_ip(config, requested, addresses));
    }

    if let (Some(size), Some(root)) = (
        config.ebs_size,
        ami.and_then(|metadata| metadata.root_volume.as_ref()),
    ) {
        if size < root.volume_size_gib {
            errors.push(ValidationError::new(
                ValidationKind::EbsSizeTooSmall,
                format!(
                    "EBS volume size {size} GiB is smaller than the image snapshot size {} GiB",
                    root.volume_size_gib
                ),
            ));
        }
    }

    errors
}

fn check_elastic_ip(
    config: &EffectiveConfig,
    requested: &str,
    addresses: &[ElasticIp],
) -> Vec<ValidationError> {
    let Some(address) = addresses
        .iter()
        .find(|candidate| candidate.public_ip == requested)
    else {
        return vec![ValidationError::new(
            ValidationKind::ElasticIpUnknown,
            format!("elastic IP {requested} is not allocated to this account"),
        )];
    };

    let mut errors = Vec::new();
    let expected_scope = if config.vpc_mode() {
        AddressScope::Vpc
    } else {
        AddressScope::Standard
    };
    if address.scope != expected_scope {
        let scope_name = match expected_scope {
            AddressScope::Vpc => "VPC",
            AddressScope::Standard => "classic",
        };
        errors.push(ValidationError::new(
            ValidationKind::ElasticIpScope,
            format!("elastic IP {requested} is not allocated for {scope_name} use"),
        ));
    }
    if let Some(holder) = address.attached_instance.as_deref() {
        errors.push(ValidationError::new(
            ValidationKind::ElasticIpInUse,
            format!("elastic IP {requested} is already attached to {holder}"),
        ));
    }
    errors
}
