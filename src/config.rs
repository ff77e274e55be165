//! Process-wide generation parameters.
//!
//! A [`Config`] picks the target architecture, the reference layout and the collector
//! whose barriers the access protocol emits. It is read once, before the first method is
//! generated, from defaults overlaid with `LIRGEN_*` environment variables; the binary
//! applies its command line flags on top.

use crate::arch::{Architecture, Arm64, Ppc32, X64};
use crate::core::error::{CompileError, CompileResult};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArchKind {
    #[default]
    X64,
    Arm64,
    Ppc32,
}

impl ArchKind {
    pub fn name(self) -> &'static str {
        match self {
            ArchKind::X64 => "x64",
            ArchKind::Arm64 => "arm64",
            ArchKind::Ppc32 => "ppc32",
        }
    }

    /// Name the architecture's register tables report.
    pub fn target_name(self) -> &'static str {
        match self {
            ArchKind::X64 => X64::NAME,
            ArchKind::Arm64 => Arm64::NAME,
            ArchKind::Ppc32 => Ppc32::NAME,
        }
    }
}

impl FromStr for ArchKind {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(ArchKind::X64),
            "arm64" | "aarch64" => Ok(ArchKind::Arm64),
            "ppc32" | "ppc" => Ok(ArchKind::Ppc32),
            other => Err(CompileError::invariant(format!("unknown architecture '{}'", other))),
        }
    }
}

impl fmt::Display for ArchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which collector's barriers to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectorKind {
    None,
    #[default]
    CardTable,
    Satb,
}

impl CollectorKind {
    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::None => "none",
            CollectorKind::CardTable => "card-table",
            CollectorKind::Satb => "satb",
        }
    }
}

impl FromStr for CollectorKind {
    type Err = CompileError;

    fn from_str(s: &str) -> CompileResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "epsilon" => Ok(CollectorKind::None),
            "card-table" | "cardtable" | "serial" | "parallel" => Ok(CollectorKind::CardTable),
            "satb" | "g1" => Ok(CollectorKind::Satb),
            other => Err(CompileError::invariant(format!("unknown collector '{}'", other))),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub arch: ArchKind,
    /// Store heap references as 32-bit values. Ignored on 32-bit targets.
    pub compressed_oops: bool,
    /// Load the card before dirtying it.
    pub cond_card_mark: bool,
    pub collector: CollectorKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arch: ArchKind::X64,
            compressed_oops: true,
            cond_card_mark: false,
            collector: CollectorKind::CardTable,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> CompileResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CompileError::invariant(format!("{}: expected a boolean, got '{}'", key, other))),
    }
}

impl Config {
    /// Defaults overlaid with the `LIRGEN_*` environment variables.
    pub fn from_env() -> CompileResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CompileResult<Self> {
        let mut config = Self::default();
        if let Some(arch) = lookup("LIRGEN_ARCH") {
            config.arch = arch.parse()?;
        }
        if let Some(v) = lookup("LIRGEN_COMPRESSED_OOPS") {
            config.compressed_oops = parse_bool("LIRGEN_COMPRESSED_OOPS", &v)?;
        }
        if let Some(v) = lookup("LIRGEN_COND_CARD_MARK") {
            config.cond_card_mark = parse_bool("LIRGEN_COND_CARD_MARK", &v)?;
        }
        if let Some(gc) = lookup("LIRGEN_GC") {
            config.collector = gc.parse()?;
        }
        log::debug!(
            "config: arch={} compressed_oops={} cond_card_mark={} collector={}",
            config.arch,
            config.compressed_oops,
            config.cond_card_mark,
            config.collector
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.arch, ArchKind::X64);
        assert!(config.compressed_oops);
        assert_eq!(config.collector, CollectorKind::CardTable);
    }

    #[test]
    fn test_environment_overlay() {
        let config = Config::from_lookup(|key| match key {
            "LIRGEN_ARCH" => Some("aarch64".to_string()),
            "LIRGEN_GC" => Some("satb".to_string()),
            "LIRGEN_COND_CARD_MARK" => Some("on".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.arch, ArchKind::Arm64);
        assert_eq!(config.collector, CollectorKind::Satb);
        assert!(config.cond_card_mark);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!("mips".parse::<ArchKind>().is_err());
        assert!(Config::from_lookup(|k| (k == "LIRGEN_COMPRESSED_OOPS").then(|| "maybe".to_string())).is_err());
    }
}
