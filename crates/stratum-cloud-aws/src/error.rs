//! AWS provider error types

use stratum_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("RDS request failed: {0}")]
    Rds(String),

    #[error("S3 request failed: {0}")]
    S3(String),

    #[error("IAM request failed: {0}")]
    Iam(String),

    #[error("SES SMTP is not available in region '{0}'")]
    UnsupportedSmtpRegion(String),

    #[error("Failed to derive SMTP password: {0}")]
    SmtpPassword(String),

    #[error("AWS request timed out: {0}")]
    Timeout(String),

    #[error("AWS endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Snapshot name missing for {0}")]
    MissingSnapshotName(String),

    #[error("Primary instance missing for snapshot {0}")]
    MissingPrimary(String),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::Timeout(msg) | AwsError::Unreachable(msg) => CloudError::Timeout(msg),
            AwsError::Cloud(e) => e,
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_failures_stay_transient() {
        let err: CloudError = AwsError::Unreachable("dns".into()).into();
        assert!(err.is_transient());

        let err: CloudError = AwsError::Rds("InvalidParameterValue".into()).into();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("InvalidParameterValue"));
    }
}
