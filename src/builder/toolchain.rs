//! Toolchain selection for host and cross builds.
//!
//! A rule names an ABI (or nothing, meaning the host). The resolver maps
//! the ABI to concrete tool names and default flag sets: cross tools are
//! prefixed `<abi>-`, host tools are unprefixed. The host ABI is probed at
//! most once per process from the compiler driver's `-dumpmachine` output;
//! the driver is `gcc` unless overridden with the `CC` environment
//! variable.

use std::collections::HashMap;
use std::sync::OnceLock;

use thiserror::Error;

use crate::util::process::ProcessBuilder;

/// Host ABI probing failed while a rule needed the host toolchain.
#[derive(Debug, Clone, Error)]
#[error("failed to identify machine type for toolchain `{driver}`: {message}")]
pub struct ToolchainDiscoveryError {
    pub driver: String,
    pub message: String,
}

/// Concrete tool names and default flags for one ABI.
///
/// Resolved per rule at execution time; not owned by the rule.
#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub abi: String,
    pub is_host: bool,
    /// Compiler driver (also used as the linker driver).
    pub cc: String,
    /// Archiver.
    pub ar: String,
    pub default_cflags: Vec<String>,
    pub default_ldflags: Vec<String>,
}

impl ToolchainConfig {
    /// Name a generic tool for this ABI (`objcopy` -> `avr-objcopy`).
    pub fn tool(&self, generic: &str) -> String {
        if self.is_host {
            generic.to_string()
        } else {
            format!("{}-{}", self.abi.trim_end_matches('-'), generic)
        }
    }
}

/// Per-ABI default flag sets.
#[derive(Debug, Clone, Default)]
pub struct AbiFlags {
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

/// Base compile flags for the `avr` ABI.
pub const AVR_DEFAULT_CFLAGS: &[&str] = &[
    "-Os",
    "-g",
    "-std=gnu99",
    "-Wall",
    "-funsigned-char",
    "-funsigned-bitfields",
    "-fpack-struct",
    "-fshort-enums",
    "-ffunction-sections",
    "-fdata-sections",
];

/// Base link flags for the `avr` ABI.
pub const AVR_DEFAULT_LDFLAGS: &[&str] = &["-Wl,--gc-sections"];

fn builtin_abi_flags() -> HashMap<String, AbiFlags> {
    let mut flags = HashMap::new();
    flags.insert(
        "avr".to_string(),
        AbiFlags {
            cflags: AVR_DEFAULT_CFLAGS.iter().map(|f| f.to_string()).collect(),
            ldflags: AVR_DEFAULT_LDFLAGS.iter().map(|f| f.to_string()).collect(),
        },
    );
    flags
}

/// Maps ABI identifiers to toolchain configurations.
///
/// One resolver is constructed per build invocation and owns the host-ABI
/// probe result; there is no process-global state.
pub struct ToolchainResolver {
    driver: String,
    host_abi: OnceLock<Result<String, String>>,
    abi_flags: HashMap<String, AbiFlags>,
}

impl ToolchainResolver {
    /// Create a resolver using `CC` (or `gcc`) as the host compiler driver.
    pub fn new() -> Self {
        let driver = std::env::var("CC").unwrap_or_else(|_| "gcc".to_string());
        Self::with_driver(driver)
    }

    /// Create a resolver with an explicit compiler driver.
    pub fn with_driver(driver: impl Into<String>) -> Self {
        ToolchainResolver {
            driver: driver.into(),
            host_abi: OnceLock::new(),
            abi_flags: builtin_abi_flags(),
        }
    }

    /// Create a resolver with a known host ABI, skipping the probe.
    pub fn with_host_abi(abi: impl Into<String>) -> Self {
        let resolver = Self::with_driver("gcc");
        let _ = resolver.host_abi.set(Ok(abi.into()));
        resolver
    }

    /// The compiler driver used for host builds and ABI discovery.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Register (or replace) default flags for an ABI.
    pub fn register_abi_flags(&mut self, abi: impl Into<String>, flags: AbiFlags) {
        self.abi_flags.insert(abi.into(), flags);
    }

    /// The host ABI identifier, probing the compiler driver on first use.
    pub fn host_abi(&self) -> Result<&str, ToolchainDiscoveryError> {
        match self.probe() {
            Ok(abi) => Ok(abi),
            Err(message) => Err(ToolchainDiscoveryError {
                driver: self.driver.clone(),
                message: message.to_string(),
            }),
        }
    }

    fn probe(&self) -> Result<&str, &str> {
        match self.host_abi.get_or_init(|| probe_host_abi(&self.driver)) {
            Ok(abi) => Ok(abi.as_str()),
            Err(message) => Err(message.as_str()),
        }
    }

    /// Resolve an ABI (or the host, when unset) to a toolchain.
    pub fn resolve(&self, abi: Option<&str>) -> Result<ToolchainConfig, ToolchainDiscoveryError> {
        let (abi, is_host) = match abi {
            None => (self.host_abi()?.to_string(), true),
            Some(explicit) => {
                // An explicit ABI only needs the probe to decide host vs.
                // cross; cross builds stay usable on machines where the
                // host driver is missing.
                let is_host = match self.probe() {
                    Ok(host) => explicit == host,
                    Err(_) => false,
                };
                (explicit.to_string(), is_host)
            }
        };

        let flags = self
            .abi_flags
            .get(abi.trim_end_matches('-'))
            .cloned()
            .unwrap_or_default();

        let mut config = ToolchainConfig {
            abi,
            is_host,
            cc: String::new(),
            ar: String::new(),
            default_cflags: flags.cflags,
            default_ldflags: flags.ldflags,
        };
        config.cc = if is_host {
            self.driver.clone()
        } else {
            config.tool("gcc")
        };
        config.ar = config.tool("ar");
        Ok(config)
    }
}

impl Default for ToolchainResolver {
    fn default() -> Self {
        ToolchainResolver::new()
    }
}

fn probe_host_abi(driver: &str) -> Result<String, String> {
    if which::which(driver).is_err() {
        return Err(format!("`{}` not found in PATH", driver));
    }

    let output = ProcessBuilder::new(driver)
        .arg("-dumpmachine")
        .exec()
        .map_err(|e| format!("{:#}", e))?;

    if !output.status.success() {
        return Err(format!(
            "`{} -dumpmachine` exited with {:?}",
            driver,
            output.status.code()
        ));
    }

    let abi = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if abi.is_empty() {
        return Err(format!("`{} -dumpmachine` produced no output", driver));
    }

    tracing::debug!("host ABI: {}", abi);
    Ok(abi)
}
