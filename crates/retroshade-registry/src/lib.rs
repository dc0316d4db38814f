//! Compiler and driver registries.
//!
//! Both registries are JSON lists describing native modules. Entries whose module file is missing
//! under the configured root are dropped at load time, so everything handed to the pipeline
//! refers to a module that existed when the registry was read.

#![forbid(unsafe_code)]

mod descriptor;
mod error;
mod load;

pub use descriptor::{CompilerDescriptor, DriverDescriptor, MachineVariant};
pub use error::{RegistryError, Result};
pub use load::{load_compilers, load_drivers, parse_compilers, parse_drivers, Registry};
