pub mod cluster;
pub mod command;
pub mod config_synthesizer;
pub mod constants;
pub mod context_data;
pub mod http;
pub mod keycloak;
pub mod merge_yaml;
pub mod model;
pub mod plugin;
pub mod readiness;
pub mod rhdh;
pub mod settings;
pub mod utils;
