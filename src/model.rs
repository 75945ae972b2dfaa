/// All errors possible to occur while synthesizing configuration or rolling out a deployment
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kubernetes reported error: {source}")]
    KubeError {
        #[from]
        source: kube::Error,
    },

    /// Missing or malformed deployment input. Raised before any I/O takes place.
    #[error("Invalid deployment configuration: {0}")]
    ConfigurationError(String),

    /// A file or directory required by the current mode does not exist
    #[error("Required resource not found: {0}")]
    NotFoundError(String),

    /// A remote fetch failed
    #[error("Request to {url} failed: {message}")]
    NetworkError { url: String, message: String },

    /// A pod reached a state it cannot recover from without intervention
    #[error("Pod {pod} failed: {reason}")]
    DeploymentFailure {
        pod: String,
        container: Option<String>,
        reason: String,
        logs: Option<String>,
    },

    /// A bounded wait ran out of time
    #[error("Timed out: {0}")]
    TimeoutError(String),

    /// An external process exited unsuccessfully or could not be spawned
    #[error("Command execution failed: {0}")]
    CommandError(String),

    /// The workload never became ready after a deploy or restart
    #[error("Deployment in namespace {namespace} is not ready: {source}")]
    NotReady {
        namespace: String,
        #[source]
        source: Box<Error>,
    },

    #[error("YAML Parsing error: {0}")]
    ParserError(
        #[from]
        serde_yaml::Error,
    ),

    #[error("JSON Parsing error: {0}")]
    JsonError(
        #[from]
        serde_json::Error,
    ),

    #[error("I/O error: {0}")]
    IoError(
        #[from]
        std::io::Error,
    ),
}

impl Error {
    /// Returns the innermost error, looking through `NotReady` wrappers
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::NotReady { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Error::TimeoutError(_))
    }

    pub fn is_deployment_failure(&self) -> bool {
        matches!(self.root_cause(), Error::DeploymentFailure { .. })
    }
}

/// HTTP status code carried by a Kubernetes API error, if any
pub fn api_status_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_not_ready() {
        let error = Error::NotReady {
            namespace: "showcase".to_owned(),
            source: Box::new(Error::TimeoutError("pods".to_owned())),
        };
        assert!(error.is_timeout());
        assert!(!error.is_deployment_failure());
        assert!(error.to_string().contains("showcase"));
    }

    #[test]
    fn test_api_status_code() {
        let error = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_owned(),
            message: "not found".to_owned(),
            reason: "NotFound".to_owned(),
            code: 404,
        });
        assert_eq!(api_status_code(&error), Some(404));
    }
}
