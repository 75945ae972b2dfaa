pub mod rhdh_chart;
pub mod rhdh_config;
pub mod rhdh_deployment;
pub mod rhdh_helm;
pub mod rhdh_operator;

pub use rhdh_config::{AuthProvider, DeploymentConfig, DeploymentMethod, DeploymentOptions, MethodConfig};
pub use rhdh_deployment::{DeploymentPhase, RhdhDeployment};
