use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A shader compiler module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDescriptor {
    pub name: String,
    /// Module path relative to the compiler root.
    pub path: PathBuf,
}

/// One machine a driver can translate for.
///
/// Serialized as a plain list of strings: display name first, then flags/parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineVariant {
    pub fields: Vec<String>,
}

impl MachineVariant {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    pub fn params(&self) -> &[String] {
        self.fields.get(1..).unwrap_or_default()
    }
}

/// A vendor driver module and the machines it supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDescriptor {
    /// Display fields: label first, module filename second; any further fields are informational.
    pub fields: Vec<String>,
    #[serde(default)]
    pub machines: Vec<MachineVariant>,
}

impl DriverDescriptor {
    pub fn label(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Module filename, relative to the driver root.
    pub fn module(&self) -> Option<&str> {
        self.fields.get(1).map(String::as_str)
    }

    pub fn machine(&self, index: usize) -> Option<&MachineVariant> {
        self.machines.get(index)
    }
}
