use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

bitflags! {
    /// Registry flags that matter for composite scheduling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SymbolFlags: u32 {
        const POSTFILTER = 1 << 0;
        const CLASSIFIER = 1 << 1;
        const NOSTAT = 1 << 2;
    }
}

impl SymbolFlags {
    /// Symbols with any of these flags only have results after the normal
    /// first pass has finished.
    pub fn needs_second_pass(self) -> bool {
        self.intersects(SymbolFlags::POSTFILTER | SymbolFlags::CLASSIFIER | SymbolFlags::NOSTAT)
    }
}

/// Flag names as they are spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolFlag {
    Postfilter,
    Classifier,
    Nostat,
}

impl From<SymbolFlag> for SymbolFlags {
    fn from(flag: SymbolFlag) -> Self {
        match flag {
            SymbolFlag::Postfilter => SymbolFlags::POSTFILTER,
            SymbolFlag::Classifier => SymbolFlags::CLASSIFIER,
            SymbolFlag::Nostat => SymbolFlags::NOSTAT,
        }
    }
}

/// Symbol and score registry that composites are registered into.
pub trait SymbolRegistry {
    fn register(
        &mut self,
        name: &str,
        score: f64,
        description: &str,
        group: &str,
        priority: i32,
        nshots: u32,
    );

    fn add_group(&mut self, name: &str, group: &str);

    /// Empty for names the registry does not know.
    fn flags(&self, name: &str) -> SymbolFlags;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub score: f64,
    pub description: String,
    pub groups: Vec<String>,
    pub priority: i32,
    pub nshots: u32,
    pub flags: SymbolFlags,
}

/// In-memory registry of symbol scores and flags.
#[derive(Debug, Default)]
pub struct Metric {
    symbols: HashMap<String, SymbolEntry>,
}

impl Metric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a primitive symbol, typically one produced by a detection module.
    pub fn declare(&mut self, name: &str, score: f64, flags: SymbolFlags) {
        let entry = self
            .symbols
            .entry(name.to_string())
            .or_insert_with(|| SymbolEntry {
                score,
                description: String::new(),
                groups: Vec::new(),
                priority: 0,
                nshots: 1,
                flags,
            });
        entry.score = score;
        entry.flags = flags;
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolRegistry for Metric {
    fn register(
        &mut self,
        name: &str,
        score: f64,
        description: &str,
        group: &str,
        priority: i32,
        nshots: u32,
    ) {
        if let Some(existing) = self.symbols.get_mut(name) {
            if existing.priority > priority {
                log::debug!(
                    "symbol {name} is already registered with priority {}, ignoring priority {priority}",
                    existing.priority
                );
                return;
            }

            existing.score = score;
            existing.description = description.to_string();
            existing.groups = vec![group.to_string()];
            existing.priority = priority;
            existing.nshots = nshots;
            return;
        }

        self.symbols.insert(
            name.to_string(),
            SymbolEntry {
                score,
                description: description.to_string(),
                groups: vec![group.to_string()],
                priority,
                nshots,
                flags: SymbolFlags::empty(),
            },
        );
    }

    fn add_group(&mut self, name: &str, group: &str) {
        match self.symbols.get_mut(name) {
            Some(entry) => {
                if !entry.groups.iter().any(|g| g == group) {
                    entry.groups.push(group.to_string());
                }
            }
            None => log::warn!("cannot add group {group} to unknown symbol {name}"),
        }
    }

    fn flags(&self, name: &str) -> SymbolFlags {
        self.symbols
            .get(name)
            .map(|entry| entry.flags)
            .unwrap_or_default()
    }
}
