//! Directory scanning.
//!
//! [`ModuleLoader`] turns the entries of one module directory into
//! [`Module`]s. Common-module candidates are tried first, shell and native
//! candidates ahead of script stubs; the first that loads becomes the
//! directory's common module and the rest are recorded as skipped.

use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rpcd_types::Map;
use tracing::{debug, warn};

use super::{Directory, SkipReason};
use crate::error::{LoadError, RegistryError};
use crate::firewall::FIREWALL_KEY;
use crate::module::{API_TAG, Module, ModuleInfo, ModuleKind, RpcModule};
use crate::native::{NativeCatalog, ScriptModule};
use crate::shell::{CommandRunner, ProcessRunner, ShellModule, ShellSettings};

const LOADER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// File stem that marks a directory's common module.
pub const COMMON_STEM: &str = "common";

/// Builds modules from directory entries.
#[derive(Clone)]
pub struct ModuleLoader {
    catalog: NativeCatalog,
    shell: Arc<ShellSettings>,
    runner: Arc<dyn CommandRunner>,
}

impl ModuleLoader {
    /// Creates a loader resolving native modules through `catalog` and
    /// running shell modules through `runner`.
    #[must_use]
    pub fn new(catalog: NativeCatalog, shell: ShellSettings, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            catalog,
            shell: Arc::new(shell),
            runner,
        }
    }

    /// A loader with the built-in native modules and real subprocesses.
    #[must_use]
    pub fn with_settings(shell: ShellSettings) -> Self {
        Self::new(NativeCatalog::builtin(), shell, Arc::new(ProcessRunner))
    }

    /// Settings shared by every shell module this loader creates.
    #[must_use]
    pub fn shell_settings(&self) -> &ShellSettings {
        &self.shell
    }

    /// Scans `path`, binding `config` to every module found.
    ///
    /// Entries are visited in sorted order. Unrecognised files are ignored;
    /// entries that look like modules but cannot be loaded are recorded in
    /// [`Directory::skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when `path` is missing, is not a directory
    /// or cannot be listed, or when `require_handler` is set and no module
    /// loaded.
    pub fn scan_directory(
        &self,
        path: &Utf8Path,
        config: Map,
        require_handler: bool,
    ) -> Result<Directory, RegistryError> {
        let metadata = fs::metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => RegistryError::MissingDirectory {
                path: path.to_path_buf(),
            },
            _ => RegistryError::ReadDirectory {
                path: path.to_path_buf(),
                source: Arc::new(source),
            },
        })?;
        if !metadata.is_dir() {
            return Err(RegistryError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let entries = list_entries(path)?;
        let inherited = inheritable(&config);
        let mut directory = Directory::new(path, config);

        let (mut commons, others): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.file_stem() == Some(COMMON_STEM));
        commons.sort_by_key(|entry| common_priority(entry));

        for entry in commons {
            if directory.common.is_some() {
                directory.skip(entry, SkipReason::ExtraCommon);
                continue;
            }
            match self.load_entry(&entry, &inherited) {
                Ok(Some(module)) => {
                    if module.info().kind() == ModuleKind::Script {
                        warn!(
                            target: LOADER_TARGET,
                            path = %entry,
                            "script stub became the common module; every call in this directory will fail"
                        );
                    }
                    directory.common = Some(module);
                }
                Ok(None) => {}
                Err(error) => directory.skip(entry, SkipReason::Invalid(error)),
            }
        }

        for entry in others {
            match self.load_entry(&entry, &inherited) {
                Ok(Some(module)) if directory.modules.contains_key(module.name()) => {
                    directory.skip(entry, SkipReason::DuplicateName);
                }
                Ok(Some(module)) => {
                    directory.modules.insert(module.name().to_owned(), module);
                }
                Ok(None) => {}
                Err(error) => directory.skip(entry, SkipReason::Invalid(error)),
            }
        }

        for skipped in &directory.skipped {
            warn!(
                target: LOADER_TARGET,
                path = %skipped.path,
                reason = %skipped.reason,
                "module skipped"
            );
        }
        debug!(
            target: LOADER_TARGET,
            path = %path,
            modules = directory.modules.len(),
            common = directory.common.is_some(),
            "directory scanned"
        );

        if require_handler && directory.modules.is_empty() {
            return Err(RegistryError::NoHandlers {
                path: path.to_path_buf(),
            });
        }
        Ok(directory)
    }

    /// Loads one entry, returning `None` for files that are not modules.
    fn load_entry(&self, path: &Utf8Path, config: &Map) -> Result<Option<Module>, LoadError> {
        let metadata = fs::metadata(path).map_err(|source| LoadError::Metadata {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let Some(kind) = ModuleKind::classify(path, is_executable(&metadata)) else {
            return Ok(None);
        };
        let Some(stem) = path.file_stem() else {
            return Ok(None);
        };

        let handler = self.handler_for(kind, stem)?;
        let info = ModuleInfo::new(stem, path, kind).with_config(config.clone());
        Ok(Some(Module::new(info, handler)))
    }

    fn handler_for(&self, kind: ModuleKind, stem: &str) -> Result<Box<dyn RpcModule>, LoadError> {
        match kind {
            ModuleKind::Shell => Ok(Box::new(ShellModule::new(
                Arc::clone(&self.shell),
                Arc::clone(&self.runner),
            ))),
            ModuleKind::Script => Ok(Box::new(ScriptModule)),
            ModuleKind::Native => {
                let handler = self
                    .catalog
                    .instantiate(stem)
                    .ok_or_else(|| LoadError::UnknownNative {
                        stem: stem.to_owned(),
                    })?;
                let found = handler.api_tag();
                if found != API_TAG {
                    return Err(LoadError::ApiTagMismatch {
                        stem: stem.to_owned(),
                        found,
                        expected: API_TAG,
                    });
                }
                Ok(handler)
            }
        }
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("catalog", &self.catalog)
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}

/// Callable kinds are tried before script stubs, which always load.
fn common_priority(path: &Utf8Path) -> u8 {
    match path.extension() {
        Some("sh") => 0,
        Some("so") => 1,
        Some("js") => 3,
        _ => 2,
    }
}

fn list_entries(path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, RegistryError> {
    let read_error = |source| RegistryError::ReadDirectory {
        path: path.to_path_buf(),
        source: Arc::new(source),
    };
    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(path).map_err(read_error)? {
        match Utf8PathBuf::from_path_buf(dir_entry.map_err(read_error)?.path()) {
            Ok(entry) => entries.push(entry),
            Err(other) => debug!(
                target: LOADER_TARGET,
                path = %other.display(),
                "ignoring entry with a non UTF-8 name"
            ),
        }
    }
    entries.sort();
    Ok(entries)
}

/// Copies a directory or service fragment without its firewall rules, which
/// only apply at the level that declares them.
pub(super) fn inheritable(config: &Map) -> Map {
    config
        .iter()
        .filter(|(key, _)| *key != FIREWALL_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
const fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}
