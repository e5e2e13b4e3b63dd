/// The global class table
///
/// Maps a class id to the script that defines it and, while that script is
/// resident, to the class object on the heap. Entries are filled in lazily:
/// asking for a class whose script is not loaded loads it (see `VM::get_class`).
use crate::error::{VmError, VmResult};
use log::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassEntry {
    /// Heap address of the class object, 0 while the script is not resident
    pub obj: u16,
    pub script: u16,
}

#[derive(Debug, Default, Clone)]
pub struct ClassTable {
    entries: Vec<ClassEntry>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scripts(scripts: &[u16]) -> Self {
        ClassTable {
            entries: scripts
                .iter()
                .map(|&script| ClassEntry { obj: 0, script })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u16) -> VmResult<ClassEntry> {
        self.entries
            .get(id as usize)
            .copied()
            .ok_or(VmError::BadClass(id))
    }

    /// Bind a freshly loaded class object. An id already bound by another
    /// resident script keeps its first binding; returns whether `obj` was bound.
    pub fn register(&mut self, id: u16, obj: u16, script: u16) -> bool {
        let index = id as usize;
        if index >= self.entries.len() {
            self.entries.resize(index + 1, ClassEntry::default());
        }
        let entry = self.entries[index];
        if entry.obj != 0 && entry.obj != obj {
            warn!(
                "class {id} from script {script} ignored, already bound to {:04x} by script {}",
                entry.obj, entry.script
            );
            return false;
        }
        self.entries[index] = ClassEntry { obj, script };
        true
    }

    /// Forget every class object of a script that is going away
    pub fn unbind_script(&mut self, script: u16) {
        for entry in self.entries.iter_mut().filter(|e| e.script == script) {
            entry.obj = 0;
        }
    }

    /// Class id whose object is `obj`
    pub fn id_of(&self, obj: u16) -> Option<u16> {
        if obj == 0 {
            return None;
        }
        self.entries
            .iter()
            .position(|e| e.obj == obj)
            .map(|i| i as u16)
    }

    /// Forget every binding, keeping the id to script mapping
    pub fn reset(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.obj = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unbind() {
        let mut table = ClassTable::from_scripts(&[0, 0, 12]);
        assert_eq!(table.get(2).unwrap(), ClassEntry { obj: 0, script: 12 });
        table.register(2, 0x400, 12);
        table.register(5, 0x500, 20);
        assert_eq!(table.len(), 6);
        assert_eq!(table.id_of(0x400), Some(2));
        table.unbind_script(12);
        assert_eq!(table.get(2).unwrap().obj, 0);
        assert_eq!(table.get(5).unwrap().obj, 0x500);
        assert_eq!(table.get(9), Err(VmError::BadClass(9)));
    }

    #[test]
    fn first_resident_binding_wins() {
        let mut table = ClassTable::new();
        assert!(table.register(3, 0x400, 12));
        assert!(!table.register(3, 0x600, 30));
        assert_eq!(table.get(3).unwrap(), ClassEntry { obj: 0x400, script: 12 });

        table.unbind_script(12);
        assert!(table.register(3, 0x600, 30));
        assert_eq!(table.get(3).unwrap(), ClassEntry { obj: 0x600, script: 30 });
    }
}
