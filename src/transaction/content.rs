// src/transaction/content.rs

//! Payload processing and package content rules for publication

use std::collections::BTreeSet;

use goblin::elf::Elf;
use goblin::elf::header::{
    EM_386, EM_NONE, EM_PPC, EM_PPC64, EM_SPARC, EM_SPARC32PLUS, EM_SPARCV9, EM_X86_64,
};
use goblin::elf::section_header::SHT_PROGBITS;

use super::OperationReason;
use crate::actions::{Action, ActionKind};
use crate::hash::Hasher;
use crate::hash::HashAlgorithm;

/// ELF magic number
pub const ELF_MAGIC: &[u8] = b"\x7fELF";

/// Sections whose contents make up `elfhash`
const HASHED_SECTIONS: [&str; 5] = [".text", ".data", ".data1", ".rodata", ".rodata1"];

/// Metadata recorded on ELF payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub bits: u8,
    pub arch: &'static str,
    /// SHA-1 of the loadable text and data; only for dynamic objects
    pub elfhash: Option<String>,
}

impl ElfInfo {
    /// Parse ELF metadata out of a payload
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        let elf = Elf::parse(data).map_err(|e| e.to_string())?;

        let arch = match elf.header.e_machine {
            EM_NONE => "none",
            EM_SPARC | EM_SPARC32PLUS | EM_SPARCV9 => "sparc",
            EM_386 | EM_X86_64 => "x86",
            EM_PPC | EM_PPC64 => "ppc",
            _ => "other",
        };

        let elfhash = elf.dynamic.is_some().then(|| {
            let mut hasher = Hasher::new(HashAlgorithm::Sha1);
            for sh in &elf.section_headers {
                if sh.sh_type != SHT_PROGBITS {
                    continue;
                }
                let Some(name) = elf.shdr_strtab.get_at(sh.sh_name) else {
                    continue;
                };
                if !HASHED_SECTIONS.contains(&name) {
                    continue;
                }
                let start = sh.sh_offset as usize;
                let end = start.saturating_add(sh.sh_size as usize);
                if let Some(bytes) = data.get(start..end) {
                    hasher.update(bytes);
                }
            }
            hasher.finalize().value
        });

        Ok(Self {
            bits: if elf.is_64 { 64 } else { 32 },
            arch,
            elfhash,
        })
    }

    /// Record this metadata on `action`
    pub fn apply(&self, action: &mut Action) {
        if let Some(hash) = &self.elfhash {
            action.set_attr("elfhash", hash.as_str());
        }
        action.set_attr("elfbits", self.bits.to_string());
        action.set_attr("elfarch", self.arch);
    }
}

/// Obsolete and renamed package bookkeeping
///
/// An obsolete package carries only `set` and `signature` actions. A renamed
/// package carries only `depend`, `set` and `signature` actions and needs at
/// least one `require` dependency. No package is both.
#[derive(Debug, Clone, Default)]
pub struct PackageRules {
    pub obsolete: bool,
    pub renamed: bool,
    pub has_reqdeps: bool,
    pub types_found: BTreeSet<ActionKind>,
}

const OBSOLETE_KINDS: [ActionKind; 2] = [ActionKind::Set, ActionKind::Signature];
const RENAMED_KINDS: [ActionKind; 3] = [ActionKind::Depend, ActionKind::Set, ActionKind::Signature];

impl PackageRules {
    /// Rebuild the bookkeeping from actions already in a manifest
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a Action>, obsolete: bool, renamed: bool) -> Self {
        let mut rules = Self {
            obsolete,
            renamed,
            ..Self::default()
        };
        for action in actions {
            rules.types_found.insert(action.kind);
            if is_require_dep(action) {
                rules.has_reqdeps = true;
            }
        }
        rules
    }

    /// Check `action` against the rules and record it
    ///
    /// A rejected action leaves the bookkeeping as it was.
    pub fn admit(&mut self, action: &Action) -> Result<(), OperationReason> {
        let marks = |name: &str| {
            action.kind == ActionKind::Set
                && action.attr_str("name") == Some(name)
                && action.attr_str("value") == Some("true")
        };
        let marks_obsolete = marks("pkg.obsolete");
        let marks_renamed = marks("pkg.renamed");

        if marks_obsolete {
            if self.renamed {
                return Err(OperationReason::ObsoleteAndRenamed);
            }
            if self.types_found.iter().any(|k| !OBSOLETE_KINDS.contains(k)) {
                return Err(OperationReason::ObsoleteContent(None));
            }
        } else if marks_renamed {
            if self.obsolete {
                return Err(OperationReason::ObsoleteAndRenamed);
            }
            if self.types_found.iter().any(|k| !RENAMED_KINDS.contains(k)) {
                return Err(OperationReason::RenamedContent(None));
            }
        } else if self.obsolete && !OBSOLETE_KINDS.contains(&action.kind) {
            return Err(OperationReason::ObsoleteContent(Some(action.to_string())));
        } else if self.renamed && !RENAMED_KINDS.contains(&action.kind) {
            return Err(OperationReason::RenamedContent(Some(action.to_string())));
        }

        self.obsolete |= marks_obsolete;
        self.renamed |= marks_renamed;
        if is_require_dep(action) {
            self.has_reqdeps = true;
        }
        self.types_found.insert(action.kind);
        Ok(())
    }

    /// Final check before a package is published
    pub fn check_complete(&self) -> Result<(), OperationReason> {
        if self.renamed && !self.has_reqdeps {
            return Err(OperationReason::RenamedWithoutDependency);
        }
        Ok(())
    }
}

fn is_require_dep(action: &Action) -> bool {
    action.kind == ActionKind::Depend && action.attr_str("type") == Some("require")
}

/// Number of chain certificates a signature action announces
pub fn chain_certificate_count(action: &Action) -> usize {
    action
        .get("chain.sizes")
        .map(|v| v.as_slice().iter().flat_map(|s| s.split_whitespace()).count())
        .unwrap_or(0)
}
