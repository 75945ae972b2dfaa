pub mod plugin_metadata;
pub mod plugin_reference;

pub use plugin_metadata::{DescriptorMap, DynamicPluginsConfig, PluginDescriptor, PluginEntry, PluginMetadataResolver, PluginMetadataSettings};
pub use plugin_reference::{display_name, extract_plugin_name, PackageReference};
