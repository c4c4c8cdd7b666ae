//! Package metadata.
//!
//! Metadata comes from a JSON deployment descriptor stored next to the
//! package (`app.zpk` -> `app.json`) or given explicitly with `--descriptor`.

use crate::error::{DeployError, DeployResult};
use crate::model::{PackageMeta, PackageType};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub(crate) trait PackageInspector {
    /// Read the metadata of `package` without validating it.
    fn meta(&self, package: &Path) -> DeployResult<PackageMeta>;

    /// Fail if `package` cannot be installed as described.
    fn validate(&self, package: &Path) -> DeployResult<()>;
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    package_type: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

pub(crate) struct DescriptorInspector {
    descriptor: Option<PathBuf>,
}

impl DescriptorInspector {
    pub(crate) fn new(descriptor: Option<PathBuf>) -> Self {
        Self { descriptor }
    }

    fn descriptor_path(&self, package: &Path) -> PathBuf {
        self.descriptor
            .clone()
            .unwrap_or_else(|| package.with_extension("json"))
    }

    fn load(&self, package: &Path) -> DeployResult<(PathBuf, Descriptor)> {
        let path = self.descriptor_path(package);
        let raw = std::fs::read_to_string(&path).map_err(|source| DeployError::DescriptorRead {
            path: path.clone(),
            source,
        })?;
        let descriptor = serde_json::from_str(&raw).map_err(|e| DeployError::Metadata {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok((path, descriptor))
    }
}

impl PackageInspector for DescriptorInspector {
    fn meta(&self, package: &Path) -> DeployResult<PackageMeta> {
        let (_, d) = self.load(package)?;
        let package_type = match d.package_type.as_deref() {
            Some("library") => PackageType::Library,
            _ => PackageType::Application,
        };
        Ok(PackageMeta {
            name: d.name.filter(|n| !n.trim().is_empty()),
            package_type,
            version: d.version,
        })
    }

    fn validate(&self, package: &Path) -> DeployResult<()> {
        if !package.is_file() {
            return Err(DeployError::PackageRead {
                path: package.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "package file not found"),
            });
        }
        let (path, d) = self.load(package)?;
        let invalid = |message: &str| DeployError::Metadata {
            path: path.clone(),
            message: message.to_string(),
        };
        if d.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(invalid("missing package name"));
        }
        if d.version.as_deref().map_or(true, |v| v.trim().is_empty()) {
            return Err(invalid("missing package version"));
        }
        match d.package_type.as_deref() {
            None | Some("application") | Some("library") => Ok(()),
            Some(other) => Err(invalid(&format!("unknown package type '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_package(dir: &Path, descriptor: &str) -> PathBuf {
        let package = dir.join("blog.zpk");
        fs::write(&package, b"PK\x03\x04").unwrap();
        fs::write(dir.join("blog.json"), descriptor).unwrap();
        package
    }

    #[test]
    fn test_meta_reads_sibling_descriptor() {
        let dir = tempdir().unwrap();
        let package = write_package(
            dir.path(),
            r#"{"name": "blog", "type": "application", "version": "1.2.0"}"#,
        );
        let meta = DescriptorInspector::new(None).meta(&package).unwrap();
        assert_eq!(meta.name.as_deref(), Some("blog"));
        assert_eq!(meta.package_type, PackageType::Application);
        assert_eq!(meta.version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn test_meta_library_type_and_blank_name() {
        let dir = tempdir().unwrap();
        let package = write_package(dir.path(), r#"{"name": "  ", "type": "library"}"#);
        let meta = DescriptorInspector::new(None).meta(&package).unwrap();
        assert_eq!(meta.package_type, PackageType::Library);
        assert!(meta.name.is_none());
    }

    #[test]
    fn test_explicit_descriptor_path() {
        let dir = tempdir().unwrap();
        let package = dir.path().join("blog.zpk");
        fs::write(&package, b"PK").unwrap();
        let descriptor = dir.path().join("deployment.json");
        fs::write(&descriptor, r#"{"name": "blog", "version": "1"}"#).unwrap();

        let inspector = DescriptorInspector::new(Some(descriptor));
        assert!(inspector.validate(&package).is_ok());
    }

    #[test]
    fn test_missing_descriptor_is_read_error() {
        let dir = tempdir().unwrap();
        let err = DescriptorInspector::new(None)
            .meta(&dir.path().join("nothing.zpk"))
            .unwrap_err();
        assert!(matches!(err, DeployError::DescriptorRead { .. }));
    }

    #[test]
    fn test_validate_rejects_incomplete_descriptors() {
        let dir = tempdir().unwrap();
        let inspector = DescriptorInspector::new(None);

        let package = write_package(dir.path(), r#"{"version": "1.0"}"#);
        let err = inspector.validate(&package).unwrap_err();
        assert!(err.to_string().contains("missing package name"));

        let package = write_package(dir.path(), r#"{"name": "blog"}"#);
        let err = inspector.validate(&package).unwrap_err();
        assert!(err.to_string().contains("missing package version"));

        let package = write_package(dir.path(), r#"{"name": "blog", "version": "1", "type": "plugin"}"#);
        let err = inspector.validate(&package).unwrap_err();
        assert!(err.to_string().contains("unknown package type 'plugin'"));

        let package = write_package(dir.path(), "not json");
        assert!(matches!(
            inspector.validate(&package).unwrap_err(),
            DeployError::Metadata { .. }
        ));
    }

    #[test]
    fn test_validate_requires_package_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("gone.json"), r#"{"name": "gone", "version": "1"}"#).unwrap();
        let err = DescriptorInspector::new(None)
            .validate(&dir.path().join("gone.zpk"))
            .unwrap_err();
        assert!(matches!(err, DeployError::PackageRead { .. }));
        assert!(err.to_string().starts_with("cannot read package "));
    }
}
