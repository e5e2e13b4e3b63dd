/// Resource cache
///
/// The core only consumes three operations: load, unload and lock. Loaded
/// resources are handed out as shared immutable byte buffers and kept in
/// most-recently-used order; a byte budget evicts the least recently used
/// unlocked entries.
use crate::error::{VmError, VmResult};
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceType {
    View = 0,
    Pic = 1,
    Script = 2,
    Text = 3,
    Sound = 4,
    Memory = 5,
    Vocab = 6,
    Font = 7,
    Cursor = 8,
    Patch = 9,
}

impl ResourceType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value & 0x7F {
            0 => ResourceType::View,
            1 => ResourceType::Pic,
            2 => ResourceType::Script,
            3 => ResourceType::Text,
            4 => ResourceType::Sound,
            5 => ResourceType::Memory,
            6 => ResourceType::Vocab,
            7 => ResourceType::Font,
            8 => ResourceType::Cursor,
            9 => ResourceType::Patch,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::View => "view",
            ResourceType::Pic => "pic",
            ResourceType::Script => "script",
            ResourceType::Text => "text",
            ResourceType::Sound => "sound",
            ResourceType::Memory => "memory",
            ResourceType::Vocab => "vocab",
            ResourceType::Font => "font",
            ResourceType::Cursor => "cursor",
            ResourceType::Patch => "patch",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceType,
    pub number: u16,
}

impl ResourceId {
    pub fn new(kind: ResourceType, number: u16) -> Self {
        ResourceId { kind, number }
    }
}

/// Opaque handle to resident resource bytes
pub type ResourceHandle = Rc<[u8]>;

/// The contract the interpreter relies on
pub trait ResourceCache {
    /// Load (or find resident) a resource; moves it to most-recently-used.
    fn load(&mut self, kind: ResourceType, number: u16) -> VmResult<ResourceHandle>;
    /// Drop one resource, or every resource of the type when `number` is None.
    /// Locked resources stay resident.
    fn unload(&mut self, kind: ResourceType, number: Option<u16>);
    fn lock(&mut self, kind: ResourceType, number: u16, locked: bool);
}

/// Where raw resource bytes come from
pub trait ResourceSource {
    fn read(&self, id: ResourceId) -> VmResult<Vec<u8>>;
}

/// Reads SCI-style patch files (`script.003`, `vocab.996`) from a directory.
pub struct PatchDirectory {
    root: PathBuf,
}

impl PatchDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PatchDirectory { root: root.into() }
    }

    pub fn file_name(id: ResourceId) -> String {
        format!("{}.{:03}", id.kind, id.number)
    }
}

impl ResourceSource for PatchDirectory {
    fn read(&self, id: ResourceId) -> VmResult<Vec<u8>> {
        let path = self.root.join(Self::file_name(id));
        let mut bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VmError::ResourceNotFound {
                    kind: id.kind,
                    number: id.number,
                })
            }
            Err(e) => return Err(VmError::Io(format!("{}: {e}", path.display()))),
        };
        // Patch files may start with a two byte header: 0x80|type, 0
        if bytes.len() >= 2 && bytes[0] == 0x80 | id.kind as u8 && bytes[1] == 0 {
            bytes.drain(..2);
        }
        debug!("read {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }
}

/// Resources held in memory, for embedding and tests
#[derive(Default)]
pub struct MemorySource {
    resources: HashMap<ResourceId, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ResourceType, number: u16, bytes: Vec<u8>) {
        self.resources.insert(ResourceId::new(kind, number), bytes);
    }
}

impl ResourceSource for MemorySource {
    fn read(&self, id: ResourceId) -> VmResult<Vec<u8>> {
        self.resources
            .get(&id)
            .cloned()
            .ok_or(VmError::ResourceNotFound {
                kind: id.kind,
                number: id.number,
            })
    }
}

struct CacheEntry {
    data: ResourceHandle,
    locked: bool,
}

pub struct ResourceManager {
    source: Box<dyn ResourceSource>,
    /// Least recently used first
    entries: IndexMap<ResourceId, CacheEntry>,
    budget: usize,
    /// Number of reads from the source, i.e. cache misses
    pub reads: usize,
}

impl ResourceManager {
    pub fn new(source: Box<dyn ResourceSource>, budget: usize) -> Self {
        ResourceManager {
            source,
            entries: IndexMap::new(),
            budget,
            reads: 0,
        }
    }

    pub fn is_resident(&self, kind: ResourceType, number: u16) -> bool {
        self.entries.contains_key(&ResourceId::new(kind, number))
    }

    pub fn resident_bytes(&self) -> usize {
        self.entries.values().map(|e| e.data.len()).sum()
    }

    /// Resident resources, least recently used first
    pub fn resident(&self) -> Vec<ResourceId> {
        self.entries.keys().copied().collect()
    }

    fn evict(&mut self) {
        while self.resident_bytes() > self.budget {
            let victim = self
                .entries
                .iter()
                .position(|(_, e)| !e.locked && Rc::strong_count(&e.data) == 1);
            match victim {
                Some(index) => {
                    if let Some((id, _)) = self.entries.shift_remove_index(index) {
                        trace!("evicted {}.{:03}", id.kind, id.number);
                    }
                }
                None => break,
            }
        }
    }
}

impl ResourceCache for ResourceManager {
    fn load(&mut self, kind: ResourceType, number: u16) -> VmResult<ResourceHandle> {
        let id = ResourceId::new(kind, number);
        if let Some(entry) = self.entries.shift_remove(&id) {
            let data = entry.data.clone();
            self.entries.insert(id, entry);
            return Ok(data);
        }

        let bytes = self.source.read(id)?;
        self.reads += 1;
        let data: ResourceHandle = Rc::from(bytes);
        self.entries.insert(
            id,
            CacheEntry {
                data: data.clone(),
                locked: false,
            },
        );
        self.evict();
        Ok(data)
    }

    fn unload(&mut self, kind: ResourceType, number: Option<u16>) {
        self.entries
            .retain(|id, e| e.locked || id.kind != kind || number.is_some_and(|n| n != id.number));
    }

    fn lock(&mut self, kind: ResourceType, number: u16, locked: bool) {
        if let Some(entry) = self.entries.get_mut(&ResourceId::new(kind, number)) {
            entry.locked = locked;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(budget: usize) -> ResourceManager {
        let mut source = MemorySource::new();
        source.insert(ResourceType::Script, 0, vec![0; 10]);
        source.insert(ResourceType::Script, 1, vec![1; 10]);
        source.insert(ResourceType::Vocab, 996, vec![2; 10]);
        ResourceManager::new(Box::new(source), budget)
    }

    #[test]
    fn second_load_is_a_hit_and_moves_to_mru() {
        let mut rm = manager(1000);
        let a = rm.load(ResourceType::Script, 0).unwrap();
        rm.load(ResourceType::Script, 1).unwrap();
        let again = rm.load(ResourceType::Script, 0).unwrap();
        assert!(Rc::ptr_eq(&a, &again));
        assert_eq!(rm.reads, 2);
        assert_eq!(
            rm.resident(),
            vec![
                ResourceId::new(ResourceType::Script, 1),
                ResourceId::new(ResourceType::Script, 0)
            ]
        );
    }

    #[test]
    fn missing_resource_is_recoverable() {
        let mut rm = manager(1000);
        let err = rm.load(ResourceType::Script, 9).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn unload_all_keeps_locked_and_other_types() {
        let mut rm = manager(1000);
        rm.load(ResourceType::Script, 0).unwrap();
        rm.load(ResourceType::Script, 1).unwrap();
        rm.load(ResourceType::Vocab, 996).unwrap();
        rm.lock(ResourceType::Script, 1, true);
        rm.unload(ResourceType::Script, None);
        assert!(!rm.is_resident(ResourceType::Script, 0));
        assert!(rm.is_resident(ResourceType::Script, 1));
        assert!(rm.is_resident(ResourceType::Vocab, 996));
        rm.lock(ResourceType::Script, 1, false);
        rm.unload(ResourceType::Script, Some(1));
        assert!(!rm.is_resident(ResourceType::Script, 1));
    }

    #[test]
    fn budget_evicts_least_recently_used() {
        let mut rm = manager(20);
        drop(rm.load(ResourceType::Script, 0).unwrap());
        drop(rm.load(ResourceType::Script, 1).unwrap());
        drop(rm.load(ResourceType::Vocab, 996).unwrap());
        assert!(!rm.is_resident(ResourceType::Script, 0));
        assert!(rm.is_resident(ResourceType::Vocab, 996));
        assert_eq!(rm.resident_bytes(), 20);
    }
}
