use std::fmt::{Display, Formatter};

const OCI_SCHEME: &str = "oci://";

/// The shapes a dynamic plugin package reference can take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageReference {
    /// Filesystem path or npm-style package spec, e.g. `./dynamic-plugins/dist/plugin-name`
    Local { path: String },
    /// `oci://registry/image@sha256:...!alias`
    OciWithDigestAlias { image: String, digest: String, alias: Option<String> },
    /// `oci://registry/image:tag`, optionally followed by `!alias`
    OciWithTag { image: String, tag: Option<String>, alias: Option<String> },
}

impl PackageReference {
    pub fn parse(reference: &str) -> Self {
        let (body, alias) = match reference.split_once('!') {
            Some((body, alias)) if !alias.is_empty() => (body, Some(alias.to_owned())),
            Some((body, _)) => (body, None),
            None => (reference, None),
        };

        let Some(location) = body.strip_prefix(OCI_SCHEME) else {
            return PackageReference::Local { path: body.to_owned() };
        };

        // Registry ports may contain ':' so only the last path segment carries the tag or digest
        let segment_start = location.rfind('/').map(|index| index + 1).unwrap_or(0);
        let segment = &location[segment_start..];
        if let Some((name, digest)) = segment.split_once('@') {
            return PackageReference::OciWithDigestAlias {
                image: format!("{OCI_SCHEME}{}{}", &location[..segment_start], name),
                digest: digest.to_owned(),
                alias,
            };
        }
        match segment.split_once(':') {
            Some((name, tag)) => PackageReference::OciWithTag {
                image: format!("{OCI_SCHEME}{}{}", &location[..segment_start], name),
                tag: Some(tag.to_owned()),
                alias,
            },
            None => PackageReference::OciWithTag {
                image: body.to_owned(),
                tag: None,
                alias,
            },
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            PackageReference::Local { .. } => None,
            PackageReference::OciWithDigestAlias { alias, .. } | PackageReference::OciWithTag { alias, .. } => alias.as_deref(),
        }
    }

    /// Canonical plugin name. The `!alias` wins when present, otherwise the last
    /// path segment with any `:tag` or `@digest` trailer removed.
    pub fn plugin_name(&self) -> Option<String> {
        if let Some(alias) = self.alias() {
            return Some(alias.to_owned());
        }
        let location = match self {
            PackageReference::Local { path } => path.as_str(),
            PackageReference::OciWithDigestAlias { image, .. } | PackageReference::OciWithTag { image, .. } => image.as_str(),
        };
        let (_, segment) = location.rsplit_once('/')?;
        let name = segment.split([':', '@']).next().unwrap_or_default();
        if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        }
    }
}

impl Display for PackageReference {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            PackageReference::Local { path } => write!(f, "{path}"),
            PackageReference::OciWithDigestAlias { image, digest, alias } => {
                write!(f, "{image}@{digest}")?;
                match alias {
                    Some(alias) => write!(f, "!{alias}"),
                    None => Ok(()),
                }
            }
            PackageReference::OciWithTag { image, tag, alias } => {
                write!(f, "{image}")?;
                if let Some(tag) = tag {
                    write!(f, ":{tag}")?;
                }
                match alias {
                    Some(alias) => write!(f, "!{alias}"),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Extracts the plugin name from a package reference. Falls back to the raw input.
pub fn extract_plugin_name(reference: &str) -> String {
    PackageReference::parse(reference)
        .plugin_name()
        .unwrap_or_else(|| reference.to_owned())
}

/// `@backstage-community/plugin-tech-radar` -> `backstage-community-plugin-tech-radar`
pub fn display_name(package_name: &str) -> String {
    package_name.strip_prefix('@').unwrap_or(package_name).replace('/', "-")
}
