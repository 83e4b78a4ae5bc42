//! Machine-image lookup.

use aws_sdk_ec2::types::{DeviceType, Image, PlatformValues};
use tracing::debug;

use super::super::{Ec2Gateway, error::classify};
use crate::gateway::{AmiMetadata, AmiRootDevice, GatewayError, RootDeviceKind};

impl Ec2Gateway {
    /// Resolves image metadata, treating a not-found response as `None`.
    pub(in crate::ec2) async fn lookup_image(
        &self,
        image_id: &str,
    ) -> Result<Option<AmiMetadata>, GatewayError> {
        let response = match self
            .client
            .describe_images()
            .image_ids(image_id)
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

        let Some(image) = response.images().first() else {
            return Ok(None);
        };
        debug!(image = %image_id, "image metadata resolved");
        ami_from_image(image).map(Some)
    }
}

/// Maps an SDK image into the gateway's metadata shape.
fn ami_from_image(image: &Image) -> Result<AmiMetadata, GatewayError> {
    let image_id = image
        .image_id()
        .ok_or_else(|| GatewayError::Incomplete {
            message: String::from("image response missing an image id"),
        })?
        .to_owned();

    let root_device = match image.root_device_type() {
        Some(DeviceType::Ebs) => RootDeviceKind::Ebs,
        Some(DeviceType::InstanceStore) => RootDeviceKind::InstanceStore,
        Some(other) => RootDeviceKind::Other(other.as_str().to_owned()),
        None => RootDeviceKind::Other(String::from("unknown")),
    };

    let root_volume = image.root_device_name().and_then(|root_name| {
        image
            .block_device_mappings()
            .iter()
            .find(|mapping| mapping.device_name() == Some(root_name))
            .and_then(|mapping| mapping.ebs())
            .map(|ebs| AmiRootDevice {
                device_name: root_name.to_owned(),
                volume_size_gib: ebs.volume_size().unwrap_or(0),
                iops: ebs.iops(),
                delete_on_termination: ebs.delete_on_termination().unwrap_or(true),
            })
    });

    Ok(AmiMetadata {
        image_id,
        root_device,
        root_volume,
        windows: image.platform() == Some(&PlatformValues::Windows),
    })
}

#[cfg(test)]
mod tests {
    use aws_sdk_ec2::types::{BlockDeviceMapping, EbsBlockDevice};

    use super::*;

    fn ebs_image() -> Image {
        Image::builder()
            .image_id("ami-1234")
            .root_device_type(DeviceType::Ebs)
            .root_device_name("/dev/sda1")
            .block_device_mappings(
                BlockDeviceMapping::builder()
                    .device_name("/dev/sda1")
                    .ebs(
                        EbsBlockDevice::builder()
                            .volume_size(20)
                            .delete_on_termination(true)
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    #[test]
    fn ebs_image_maps_root_volume_defaults() {
        let ami = ami_from_image(&ebs_image()).expect("mapping succeeds");

        assert_eq!(ami.image_id, "ami-1234");
        assert_eq!(ami.root_device, RootDeviceKind::Ebs);
        assert!(!ami.windows);
        let root = ami.root_volume.expect("ebs root mapping");
        assert_eq!(root.device_name, "/dev/sda1");
        assert_eq!(root.volume_size_gib, 20);
        assert!(root.delete_on_termination);
    }

    #[test]
    fn instance_store_image_has_no_root_volume() {
        let image = Image::builder()
            .image_id("ami-5678")
            .root_device_type(DeviceType::InstanceStore)
            .build();

        let ami = ami_from_image(&image).expect("mapping succeeds");
        assert_eq!(ami.root_device, RootDeviceKind::InstanceStore);
        assert_eq!(ami.root_volume, None);
    }

    #[test]
    fn windows_platform_is_detected() {
        let image = Image::builder()
            .image_id("ami-win")
            .root_device_type(DeviceType::Ebs)
            .platform(PlatformValues::Windows)
            .build();

        let ami = ami_from_image(&image).expect("mapping succeeds");
        assert!(ami.windows);
    }

    #[test]
    fn missing_image_id_is_an_incomplete_response() {
        let err = ami_from_image(&Image::builder().build()).expect_err("mapping fails");
        assert!(matches!(err, GatewayError::Incomplete { .. }));
    }
}
