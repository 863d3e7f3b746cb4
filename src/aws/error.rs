//! AWS error classification
//!
//! Maps EC2 SDK failures to typed categories using the `.code()` method
//! instead of string matching on Debug format, so callers can distinguish
//! missing resources from transient throttling and surface actionable hints
//! for the most common failure codes.

use thiserror::Error;

/// AWS error categories
#[derive(Debug, Error)]
pub enum AwsError {
    /// Resource was not found (safe to skip when resolving correlated resources)
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: &'static str,
        resource_id: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    Throttled,

    /// Resource is mid-transition and cannot accept the request yet
    #[error("Resource is not in the required state")]
    IncorrectState,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            AwsError::Throttled => Some(
                "AWS API rate limit hit. Wait briefly and rerun the command.".to_string(),
            ),
            AwsError::IncorrectState => Some(
                "The resource is mid-transition. Wait for it to settle and rerun the command."
                    .to_string(),
            ),
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidVolume.NotFound",
    "InvalidSnapshot.NotFound",
    "InvalidAttachment.NotFound",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "SnapshotCreationPerVolumeRateExceeded",
    "ConcurrentSnapshotLimitExceeded",
];

/// Known AWS error codes for resources caught mid-transition
const INCORRECT_STATE_CODES: &[&str] = &[
    "IncorrectState",
    "IncorrectInstanceState",
    "VolumeInUse",
    "InvalidSnapshot.InUse",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_type: "resource",
            resource_id: message.clone(),
        },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if INCORRECT_STATE_CODES.contains(&c) => AwsError::IncorrectState,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an error from an anyhow::Error by extracting the AWS error code.
///
/// Walks the error chain using `ProvideErrorMetadata` to extract `.code()` and
/// `.message()` from any AWS SDK error. Falls back to string matching on the
/// Debug representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_ec2::error::ProvideErrorMetadata;

    // Walk the error chain looking for any type that implements
    // ProvideErrorMetadata. EC2 operation errors implement it directly.
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::describe_instances::DescribeInstancesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::stop_instances::StopInstancesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::start_instances::StartInstancesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::describe_snapshots::DescribeSnapshotsError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::create_snapshot::CreateSnapshotError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::delete_snapshot::DeleteSnapshotError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::describe_volumes::DescribeVolumesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::create_volume::CreateVolumeError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::delete_volume::DeleteVolumeError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::attach_volume::AttachVolumeError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_ec2::error::SdkError<
            aws_sdk_ec2::operation::detach_volume::DetachVolumeError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
    }

    // Fallback: extract error code from debug string representation
    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// All known AWS error codes for extraction from debug strings (flat list)
const ALL_KNOWN_CODES: &[&str] = &[
    // Not found
    "InvalidInstanceID.NotFound",
    "InvalidVolume.NotFound",
    "InvalidSnapshot.NotFound",
    "InvalidAttachment.NotFound",
    // Throttling
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "SnapshotCreationPerVolumeRateExceeded",
    "ConcurrentSnapshotLimitExceeded",
    // Mid-transition
    "IncorrectState",
    "IncorrectInstanceState",
    "VolumeInUse",
    "InvalidSnapshot.InUse",
    // Limits
    "SnapshotLimitExceeded",
    "PendingSnapshotLimitExceeded",
    "VolumeLimitExceeded",
    // Placement and permissions
    "InvalidVolume.ZoneMismatch",
    "UnauthorizedOperation",
];

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in ALL_KNOWN_CODES {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

/// Error code to user-friendly suggestion mapping, for codes that classify
/// as generic SDK errors
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "SnapshotLimitExceeded",
        "Prune old backup sets or request a limit increase via AWS Service Quotas console.",
    ),
    (
        "PendingSnapshotLimitExceeded",
        "Too many snapshots are in progress. Wait for some to complete and rerun the command.",
    ),
    (
        "VolumeLimitExceeded",
        "Delete unused volumes or request a limit increase via AWS Service Quotas console.",
    ),
    (
        "InvalidVolume.ZoneMismatch",
        "Volumes can only attach to instances in the same availability zone.",
    ),
    (
        "UnauthorizedOperation",
        "Check that your IAM credentials allow the EC2 actions this tool performs.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<String> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| (*s).to_string())
}
