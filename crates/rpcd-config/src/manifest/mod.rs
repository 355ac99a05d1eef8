//! Hierarchical service manifest.
//!
//! The manifest groups module directories into services and carries the
//! configuration fragments bound at each level:
//!
//! ```toml
//! default_service = "main"
//!
//! [env]
//! SITE = "lab"
//!
//! [services.main]
//! default_directory = "system"
//!
//! [services.main.directories.system]
//! path = "/usr/lib/rpcd/system"
//!
//! [services.main.directories.system.modules.echo]
//! firewall = [{ name = "msg", required = true, type = "string" }]
//! ```
//!
//! Fragments are kept as [`rpcd_types::Map`] so the registry can read them
//! without knowing they came from TOML.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use rpcd_types::{Map, Value};
use serde::Deserialize;
use thiserror::Error;

use crate::defaults::DEFAULT_SERVICE_NAME;

/// Configuration fragment bound to a service, directory or module.
pub type Fragment = Map;

/// Root of the manifest file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceManifest {
    /// Service used when a request names none.
    #[serde(default)]
    pub default_service: Option<String>,
    /// Environment template exported to every shell module.
    #[serde(default)]
    pub env: IndexMap<String, Value>,
    /// Services keyed by name.
    #[serde(default)]
    pub services: IndexMap<String, ServiceSpec>,
}

/// One service: a named group of module directories.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Directory consulted first when a method is not qualified.
    #[serde(default)]
    pub default_directory: Option<String>,
    /// Service-wide fragment.
    #[serde(default)]
    pub config: Fragment,
    /// Directories keyed by basename.
    #[serde(default)]
    pub directories: IndexMap<String, DirectorySpec>,
}

/// One scanned module directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectorySpec {
    /// Filesystem location to scan.
    pub path: Utf8PathBuf,
    /// Directory-wide fragment.
    #[serde(default)]
    pub config: Fragment,
    /// Fail the load when no module registers.
    #[serde(default)]
    pub require_handler: bool,
    /// Per-module fragments keyed by module name.
    #[serde(default)]
    pub modules: IndexMap<String, Fragment>,
}

impl DirectorySpec {
    /// Builds a directory entry with empty fragments.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: Fragment::new(),
            require_handler: false,
            modules: IndexMap::new(),
        }
    }
}

impl ServiceManifest {
    /// Reads and validates a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the file cannot be read, is not valid
    /// TOML, or names a default service or directory that does not exist.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Parses and validates manifest text. `origin` is used in errors.
    ///
    /// # Errors
    ///
    /// See [`ServiceManifest::load`].
    pub fn from_toml_str(text: &str, origin: &Utf8Path) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(text).map_err(|source| ManifestError::Parse {
            path: origin.to_path_buf(),
            source: Box::new(source),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks that default references resolve.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownDefaultService`] or
    /// [`ManifestError::UnknownDefaultDirectory`].
    pub fn validate(&self) -> Result<(), ManifestError> {
        if let Some(name) = &self.default_service
            && !self.services.contains_key(name)
        {
            return Err(ManifestError::UnknownDefaultService { name: name.clone() });
        }
        for (service, spec) in &self.services {
            if let Some(directory) = &spec.default_directory
                && !spec.directories.contains_key(directory)
            {
                return Err(ManifestError::UnknownDefaultDirectory {
                    service: service.clone(),
                    directory: directory.clone(),
                });
            }
        }
        Ok(())
    }

    /// Name of the service used for unqualified requests.
    ///
    /// Falls back to the first declared service.
    #[must_use]
    pub fn default_service_name(&self) -> Option<&str> {
        self.default_service
            .as_deref()
            .or_else(|| self.services.keys().next().map(String::as_str))
    }

    /// Adds an ad-hoc directory to the default service, creating that
    /// service when the manifest is empty.
    ///
    /// The directory is keyed by its basename; clashing names gain a numeric
    /// suffix. Returns the key used.
    pub fn add_module_dir(&mut self, path: &Utf8Path) -> String {
        let service_name = self
            .default_service_name()
            .unwrap_or(DEFAULT_SERVICE_NAME)
            .to_owned();
        let service = self.services.entry(service_name).or_default();
        let base = directory_key(path);
        let mut key = base.clone();
        let mut suffix = 1_u32;
        while service.directories.contains_key(&key) {
            suffix += 1;
            key = format!("{base}-{suffix}");
        }
        service
            .directories
            .insert(key.clone(), DirectorySpec::new(path));
        key
    }

    /// Returns `true` when no directory is declared anywhere.
    #[must_use]
    pub fn has_no_directories(&self) -> bool {
        self.services
            .values()
            .all(|service| service.directories.is_empty())
    }
}

fn directory_key(path: &Utf8Path) -> String {
    match path.file_name() {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => path.as_str().to_owned(),
    }
}

/// Errors raised while loading the service manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read service manifest '{path}': {source}")]
    Read {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The manifest is not valid TOML or has unknown keys.
    #[error("failed to parse service manifest '{path}': {source}")]
    Parse {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// `default_service` names no declared service.
    #[error("default service '{name}' is not declared")]
    UnknownDefaultService {
        /// Missing service name.
        name: String,
    },
    /// A service's `default_directory` names no declared directory.
    #[error("service '{service}' has no directory named '{directory}'")]
    UnknownDefaultDirectory {
        /// Service declaring the default.
        service: String,
        /// Missing directory name.
        directory: String,
    },
}

#[cfg(test)]
mod tests;
