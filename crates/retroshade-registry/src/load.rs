use std::path::{Path, PathBuf};

use crate::{CompilerDescriptor, DriverDescriptor, RegistryError, Result};

/// Compiler and driver lists, filtered to modules that exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    pub compilers: Vec<CompilerDescriptor>,
    pub drivers: Vec<DriverDescriptor>,
}

impl Registry {
    /// Load `compilers.json` (modules under `compiler_root`) and `drivers.json` (modules under
    /// `driver_root`).
    pub fn load(
        compilers_json: &Path,
        compiler_root: &Path,
        drivers_json: &Path,
        driver_root: &Path,
    ) -> Result<Self> {
        Ok(Self {
            compilers: load_compilers(compilers_json, compiler_root)?,
            drivers: load_drivers(drivers_json, driver_root)?,
        })
    }
}

pub fn load_compilers(path: &Path, module_root: &Path) -> Result<Vec<CompilerDescriptor>> {
    let json = read(path)?;
    parse_compilers(&json, path, module_root)
}

pub fn load_drivers(path: &Path, module_root: &Path) -> Result<Vec<DriverDescriptor>> {
    let json = read(path)?;
    parse_drivers(&json, path, module_root)
}

/// Parse a compiler list. `origin` is only used in error messages.
pub fn parse_compilers(
    json: &str,
    origin: &Path,
    module_root: &Path,
) -> Result<Vec<CompilerDescriptor>> {
    let all: Vec<CompilerDescriptor> =
        serde_json::from_str(json).map_err(|source| RegistryError::Json {
            path: origin.to_path_buf(),
            source,
        })?;

    let total = all.len();
    let kept: Vec<_> = all
        .into_iter()
        .filter(|c| {
            let exists = module_root.join(&c.path).is_file();
            if !exists {
                tracing::debug!(
                    compiler = %c.name,
                    module = %c.path.display(),
                    "skipping compiler: module not found"
                );
            }
            exists
        })
        .collect();

    tracing::debug!(total, kept = kept.len(), "compiler registry loaded");
    Ok(kept)
}

/// Parse a driver list. `origin` is only used in error messages.
pub fn parse_drivers(
    json: &str,
    origin: &Path,
    module_root: &Path,
) -> Result<Vec<DriverDescriptor>> {
    let all: Vec<DriverDescriptor> =
        serde_json::from_str(json).map_err(|source| RegistryError::Json {
            path: origin.to_path_buf(),
            source,
        })?;

    let total = all.len();
    let mut kept = Vec::with_capacity(total);
    for (index, mut driver) in all.into_iter().enumerate() {
        let Some(module) = driver.module() else {
            tracing::warn!(
                index,
                fields = driver.fields.len(),
                "skipping driver: needs a label and a module filename"
            );
            continue;
        };
        if !module_root.join(module).is_file() {
            tracing::debug!(
                driver = driver.label(),
                module,
                "skipping driver: module not found"
            );
            continue;
        }

        let variants = driver.machines.len();
        driver.machines.retain(|m| !m.fields.is_empty());
        if driver.machines.len() != variants {
            tracing::warn!(
                driver = driver.label(),
                dropped = variants - driver.machines.len(),
                "dropping machine variants with no fields"
            );
        }
        kept.push(driver);
    }

    tracing::debug!(total, kept = kept.len(), "driver registry loaded");
    Ok(kept)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: PathBuf::from(path),
        source,
    })
}
