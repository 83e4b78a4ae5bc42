//! Mapping from SDK failures to gateway errors.

use std::error::Error as StdError;

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};

use crate::gateway::GatewayError;

/// Classifies an SDK failure into the gateway taxonomy.
///
/// Service errors whose code carries `NotFound` become the retryable
/// [`GatewayError::NotVisible`]; other service errors become
/// [`GatewayError::Rejected`] with a hint attached when the message matches
/// a known instance-type incompatibility. Everything else (timeouts,
/// connection resets, response construction) is a transport failure.
pub(in crate::ec2) fn classify<E>(err: SdkError<E>) -> GatewayError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    if let SdkError::ServiceError(context) = &err {
        let code = context.err().code().unwrap_or_default().to_owned();
        let message = context.err().message().map_or_else(
            || DisplayErrorContext(&err).to_string(),
            str::to_owned,
        );
        if code.contains("NotFound") {
            return GatewayError::NotVisible { resource: message };
        }
        let hint = hint_for(&message);
        return GatewayError::Rejected { message, hint };
    }

    GatewayError::Transport {
        message: DisplayErrorContext(&err).to_string(),
    }
}

/// Attaches guidance for rejection messages caused by options the requested
/// instance type does not support.
pub(in crate::ec2) fn hint_for(message: &str) -> Option<String> {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("ebs-optimized") || lowered.contains("ebsoptimized") {
        return Some(String::from(
            "the instance type may not support EBS-optimized launches; retry without --ebs-optimized",
        ));
    }
    if lowered.contains("placement group") || lowered.contains("placementgroup") {
        return Some(String::from(
            "the instance type may not support placement groups; retry without --placement-group",
        ));
    }
    None
}
