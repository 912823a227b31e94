use stratum_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error(
        "Cannot connect to Docker: {0}\n\nHint:\n  • Check that the Docker daemon is running\n  • Check DOCKER_HOST if you use a remote daemon"
    )]
    DockerConnectionFailed(String),

    #[error("Container '{container}' not found")]
    ContainerNotFound { container: String },

    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("Container '{container}' is missing {variable} in its environment")]
    MissingCredential { container: String, variable: String },

    #[error("Docker API error: {0}")]
    DockerApiError(String),
}

impl From<bollard::errors::Error> for LocalError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError { .. } => {
                LocalError::DockerApiError(err.to_string())
            }
            _ => {
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    LocalError::DockerConnectionFailed(err_str)
                } else {
                    LocalError::DockerApiError(err_str)
                }
            }
        }
    }
}

impl From<LocalError> for CloudError {
    fn from(err: LocalError) -> Self {
        match err {
            // The daemon may come back; retry without changing phase
            LocalError::DockerConnectionFailed(msg) => CloudError::Timeout(msg),
            LocalError::ContainerNotFound { container } => CloudError::ResourceNotFound(container),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LocalError>;
