//! AVR cross-target rule constructors.
//!
//! `avr_library` and `avr_binary` are the builtin `library`/`binary` kinds
//! configured for the AVR ABI: forced static compilation, `-mmcu`/`-DF_CPU`
//! flags, an `.elf` link target, and firmware-image post-link steps. The
//! base AVR flag set lives in the toolchain resolver's per-ABI defaults.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::binary::{BinaryConfig, BinaryRule, PostLinkStep};
use super::library::{LibraryConfig, LibraryRule};
use super::Rule;

/// ABI identifier for AVR cross builds.
pub const AVR_ABI: &str = "avr";

/// Default microcontroller when a rule does not name one.
pub const DEFAULT_MCU: &str = "atmega8";

/// Default clock frequency in Hz.
pub const DEFAULT_FREQ: u32 = 8_000_000;

fn default_mcu() -> String {
    DEFAULT_MCU.to_string()
}

fn default_freq() -> u32 {
    DEFAULT_FREQ
}

/// Descriptor kwargs for an `avr_library` rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvrLibraryConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_mcu")]
    pub mcu: String,
    #[serde(default = "default_freq")]
    pub freq: u32,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
}

/// Descriptor kwargs for an `avr_binary` rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvrBinaryConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_mcu")]
    pub mcu: String,
    #[serde(default = "default_freq")]
    pub freq: u32,
    #[serde(default)]
    pub cflags: Vec<String>,
    #[serde(default)]
    pub ldflags: Vec<String>,
    #[serde(default)]
    pub deps: Vec<String>,
}

fn mcu_cflags(mcu: &str, freq: u32, extra: Vec<String>) -> Vec<String> {
    let mut cflags = vec![format!("-mmcu={}", mcu), format!("-DF_CPU={}", freq)];
    cflags.extend(extra);
    cflags
}

/// Registry constructor for the `avr_library` kind.
pub fn construct_library(module_path: &str, kwargs: toml::Value) -> Result<Arc<dyn Rule>> {
    let config: AvrLibraryConfig = kwargs
        .try_into()
        .with_context(|| format!("invalid avr_library rule in module {}", module_path))?;

    let library = LibraryConfig {
        name: config.name,
        sources: config.sources,
        is_static: true,
        cflags: mcu_cflags(&config.mcu, config.freq, config.cflags),
        deps: config.deps,
        abi: Some(AVR_ABI.to_string()),
    };

    Ok(Arc::new(LibraryRule::from_config(module_path, library)))
}

/// Registry constructor for the `avr_binary` kind.
pub fn construct_binary(module_path: &str, kwargs: toml::Value) -> Result<Arc<dyn Rule>> {
    let config: AvrBinaryConfig = kwargs
        .try_into()
        .with_context(|| format!("invalid avr_binary rule in module {}", module_path))?;

    let mut ldflags = vec![format!("-mmcu={}", config.mcu)];
    ldflags.extend(config.ldflags);

    let binary = BinaryConfig {
        name: config.name,
        sources: config.sources,
        is_static: true,
        cflags: mcu_cflags(&config.mcu, config.freq, config.cflags),
        ldflags,
        deps: config.deps,
        abi: Some(AVR_ABI.to_string()),
    };

    let rule = BinaryRule::from_config(module_path, binary)
        .with_link_extension("elf")
        .with_link_map()
        // Flashable firmware image.
        .with_post_link_step(PostLinkStep {
            tool: "objcopy".to_string(),
            args: args(&["-j", ".text", "-j", ".data", "-O", "ihex", "{input}", "{output}"]),
            output_extension: Some("hex".to_string()),
        })
        // EEPROM image.
        .with_post_link_step(PostLinkStep {
            tool: "objcopy".to_string(),
            args: args(&[
                "-j",
                ".eeprom",
                "--change-section-lma",
                ".eeprom=0",
                "-O",
                "ihex",
                "{input}",
                "{output}",
            ]),
            output_extension: Some("eeprom".to_string()),
        })
        // Section size report.
        .with_post_link_step(PostLinkStep {
            tool: "size".to_string(),
            args: vec![
                "-C".to_string(),
                format!("--mcu={}", config.mcu),
                "{input}".to_string(),
            ],
            output_extension: None,
        });

    Ok(Arc::new(rule))
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use crate::builder::command::RecordingRunner;
    use crate::test_support::{evaluate_tree, BuildTree};

    #[test]
    fn test_avr_binary_build_commands() {
        let tree = BuildTree::new();
        tree.module(
            "/fw",
            r#"
            [[avr_binary]]
            name = "blink"
            sources = ["blink.c"]
            mcu = "atmega328p"
            freq = 16000000
            "#,
        );

        let runner = RecordingRunner::new();
        let rules = evaluate_tree(&tree, &["/fw:blink"], &[], &runner).unwrap();

        let commands = runner.commands();

        let compile = commands
            .iter()
            .find(|c| c.args.iter().any(|a| a == "-c"))
            .unwrap();
        assert_eq!(compile.program, "avr-gcc");
        assert!(compile.args.contains(&"-mmcu=atmega328p".to_string()));
        assert!(compile.args.contains(&"-DF_CPU=16000000".to_string()));
        // Base AVR flag set comes from the toolchain defaults.
        assert!(compile.args.contains(&"-Os".to_string()));
        // AVR rules compile statically, so no -fpic.
        assert!(!compile.args.contains(&"-fpic".to_string()));

        let link = commands
            .iter()
            .find(|c| c.args.iter().any(|a| a == "-o") && !c.args.iter().any(|a| a == "-c"))
            .unwrap();
        assert_eq!(link.program, "avr-gcc");
        assert!(link.args.contains(&"-Wl,--gc-sections".to_string()));
        assert!(link.args.iter().any(|a| a.starts_with("-Wl,-Map,")));
        assert!(link.args.iter().any(|a| a.ends_with("blink.elf")));

        let objcopies: Vec<_> = commands
            .iter()
            .filter(|c| c.program == "avr-objcopy")
            .collect();
        assert_eq!(objcopies.len(), 2);
        assert!(objcopies[0].args.iter().any(|a| a.ends_with("blink.hex")));
        assert!(objcopies[1]
            .args
            .iter()
            .any(|a| a.ends_with("blink.eeprom")));

        let size = commands.iter().find(|c| c.program == "avr-size").unwrap();
        assert!(size.args.contains(&"--mcu=atmega328p".to_string()));
        assert!(size.args.iter().any(|a| a.ends_with("blink.elf")));

        let outputs = rules[0].outputs();
        let names: Vec<String> = outputs
            .iter()
            .filter_map(|o| o.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["blink.elf", "blink.hex", "blink.eeprom"]);
    }

    #[test]
    fn test_avr_library_defaults() {
        let tree = BuildTree::new();
        tree.module(
            "/fw",
            r#"
            [[avr_library]]
            name = "drivers"
            sources = ["uart.c"]
            "#,
        );

        let runner = RecordingRunner::new();
        let rules = evaluate_tree(&tree, &["/fw:drivers"], &[], &runner).unwrap();

        let commands = runner.commands();
        let compile = commands
            .iter()
            .find(|c| c.args.iter().any(|a| a == "-c"))
            .unwrap();
        assert_eq!(compile.program, "avr-gcc");
        assert!(compile.args.contains(&"-mmcu=atmega8".to_string()));
        assert!(compile.args.contains(&"-DF_CPU=8000000".to_string()));

        let archive = commands.iter().find(|c| c.program == "avr-ar").unwrap();
        assert!(archive.args.iter().any(|a| a.ends_with("drivers.a")));

        assert_eq!(rules[0].kind(), "library");
    }

    #[test]
    fn test_avr_binary_links_avr_library() {
        let tree = BuildTree::new();
        tree.module(
            "/fw",
            r#"
            [[avr_library]]
            name = "drivers"
            sources = ["uart.c"]

            [[avr_binary]]
            name = "blink"
            sources = ["blink.c"]
            deps = [":drivers"]
            "#,
        );

        let runner = RecordingRunner::new();
        evaluate_tree(&tree, &["/fw:blink"], &[], &runner).unwrap();

        let commands = runner.commands();
        let link = commands
            .iter()
            .find(|c| c.args.iter().any(|a| a.ends_with("blink.elf")) && c.args.iter().any(|a| a == "-o"))
            .unwrap();
        assert!(link.args.iter().any(|a| a.ends_with("drivers.a")));
    }
}
