/// Object model
///
/// Objects live in the heap as a 12-byte hidden header followed by the
/// property array. The object pointer addresses property 0:
///
/// - -12: magic 0x1234
/// - -10: owning script
/// - -8: method table offset (in the owning script's resource)
/// - -6: property selector table offset (classes only, else 0)
/// - -4: script of the species class
/// - -2: property count
///
/// Properties 0..=3 are species, super, info and name. Property slots are
/// named by the selector list of the species class; methods are found by
/// walking the super chain.
use crate::error::{VmError, VmResult};
use crate::vm::VM;
use log::{debug, warn};

pub const OBJ_MAGIC: u16 = 0x1234;
pub const HEADER_SIZE: u16 = 12;

pub const HDR_MAGIC: u16 = 12;
pub const HDR_SCRIPT: u16 = 10;
pub const HDR_METHODS: u16 = 8;
pub const HDR_PROP_DICT: u16 = 6;
pub const HDR_CLASS_SCRIPT: u16 = 4;
pub const HDR_SIZE: u16 = 2;

pub const PROP_SPECIES: u16 = 0;
pub const PROP_SUPER: u16 = 1;
pub const PROP_INFO: u16 = 2;
pub const PROP_NAME: u16 = 3;

pub const INFO_CLASS: u16 = 0x8000;
pub const INFO_CLONE: u16 = 0x0001;
pub const INFO_NODISPOSE: u16 = 0x0002;
pub const INFO_NODISPLAY: u16 = 0x0004;

/// Class id meaning "no superclass"
pub const NO_CLASS: u16 = 0xFFFF;

/// Guard against cycles in a corrupted super chain
const MAX_CHAIN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub script: u16,
    pub methods: u16,
    pub prop_dict: u16,
    pub class_script: u16,
    pub prop_count: u16,
}

/// A method found by dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRef {
    /// Script whose code holds the method
    pub script: u16,
    /// Code offset in that script
    pub offset: u16,
    /// Object or class whose method table matched
    pub owner: u16,
}

pub trait ObjectModel {
    fn is_object(&self, obj: u16) -> bool;
    fn object_header(&self, obj: u16) -> VmResult<ObjectHeader>;
    fn info(&self, obj: u16) -> VmResult<u16>;
    fn prop_index(&self, obj: u16, selector: u16) -> VmResult<Option<u16>>;
    fn get_property(&self, obj: u16, selector: u16) -> VmResult<u16>;
    fn set_property(&mut self, obj: u16, selector: u16, value: u16) -> VmResult<()>;
    fn find_method(&self, start: u16, selector: u16) -> VmResult<Option<MethodRef>>;
    fn responds_to(&self, obj: u16, selector: u16) -> VmResult<bool>;
    fn clone_object(&mut self, obj: u16) -> VmResult<u16>;
    fn dispose_clone(&mut self, obj: u16) -> VmResult<bool>;
    fn object_name(&self, obj: u16) -> String;
}

impl VM {
    /// Word from the resource of a resident script
    fn script_word(&self, script: u16, offset: u16) -> VmResult<u16> {
        self.scripts
            .get(&script)
            .ok_or_else(|| {
                VmError::LoaderMismatch(format!("object refers to unloaded script {script}"))
            })?
            .word(offset)
    }

    /// A live object whose whole property array lies inside the heap
    fn checked(&self, obj: u16) -> VmResult<()> {
        if !self.is_object(obj) {
            return Err(VmError::NotAnObject(obj));
        }
        let prop_count = self.heap.read_word(obj - HDR_SIZE) as usize;
        if !self
            .heap
            .contains(obj - HEADER_SIZE, HEADER_SIZE as usize + prop_count * 2)
        {
            return Err(VmError::NotAnObject(obj));
        }
        Ok(())
    }
}

impl ObjectModel for VM {
    fn is_object(&self, obj: u16) -> bool {
        obj >= HEADER_SIZE
            && obj % 2 == 0
            && self.heap.contains(obj - HEADER_SIZE, HEADER_SIZE as usize)
            && self.heap.read_word(obj - HDR_MAGIC) == OBJ_MAGIC
    }

    fn object_header(&self, obj: u16) -> VmResult<ObjectHeader> {
        self.checked(obj)?;
        Ok(ObjectHeader {
            script: self.heap.read_word(obj - HDR_SCRIPT),
            methods: self.heap.read_word(obj - HDR_METHODS),
            prop_dict: self.heap.read_word(obj - HDR_PROP_DICT),
            class_script: self.heap.read_word(obj - HDR_CLASS_SCRIPT),
            prop_count: self.heap.read_word(obj - HDR_SIZE),
        })
    }

    fn info(&self, obj: u16) -> VmResult<u16> {
        self.checked(obj)?;
        Ok(self.heap.read_word(obj + PROP_INFO * 2))
    }

    fn prop_index(&self, obj: u16, selector: u16) -> VmResult<Option<u16>> {
        let header = self.object_header(obj)?;
        let species = self.heap.read_word(obj + PROP_SPECIES * 2);
        let dict_obj = if self.is_object(species) { species } else { obj };
        let dict = self.object_header(dict_obj)?;
        if dict.prop_dict == 0 {
            return Ok(None);
        }
        let count = header.prop_count.min(dict.prop_count);
        for index in 0..count {
            if self.script_word(dict.script, dict.prop_dict + index * 2)? == selector {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn get_property(&self, obj: u16, selector: u16) -> VmResult<u16> {
        match self.prop_index(obj, selector)? {
            Some(index) => Ok(self.heap.read_word(obj + index * 2)),
            None => Err(VmError::BadSelector {
                object: obj,
                selector,
            }),
        }
    }

    fn set_property(&mut self, obj: u16, selector: u16, value: u16) -> VmResult<()> {
        match self.prop_index(obj, selector)? {
            Some(index) => {
                self.heap.write_word(obj + index * 2, value);
                Ok(())
            }
            None => Err(VmError::BadSelector {
                object: obj,
                selector,
            }),
        }
    }

    fn find_method(&self, start: u16, selector: u16) -> VmResult<Option<MethodRef>> {
        let mut current = start;
        for _ in 0..MAX_CHAIN {
            if current == 0 {
                return Ok(None);
            }
            let header = self.object_header(current)?;
            let count = self.script_word(header.script, header.methods)?;
            for i in 0..count {
                if self.script_word(header.script, header.methods + 2 + i * 2)? == selector {
                    let offset =
                        self.script_word(header.script, header.methods + 2 + (count + i) * 2)?;
                    return Ok(Some(MethodRef {
                        script: header.script,
                        offset,
                        owner: current,
                    }));
                }
            }
            current = self.heap.read_word(current + PROP_SUPER * 2);
        }
        Err(VmError::BadClass(start))
    }

    fn responds_to(&self, obj: u16, selector: u16) -> VmResult<bool> {
        Ok(self.prop_index(obj, selector)?.is_some()
            || self.find_method(obj, selector)?.is_some())
    }

    fn clone_object(&mut self, obj: u16) -> VmResult<u16> {
        let header = self.object_header(obj)?;
        let total = HEADER_SIZE as usize + header.prop_count as usize * 2;
        let block = self.heap.alloc(total)?;
        self.heap.copy_within(obj - HEADER_SIZE, block, total);
        let clone = block + HEADER_SIZE;

        let info = self.heap.read_word(clone + PROP_INFO * 2);
        if info & INFO_CLASS != 0 {
            self.heap.write_word(clone + PROP_SUPER * 2, obj);
        }
        self.heap
            .write_word(clone + PROP_INFO * 2, (info & !INFO_CLASS) | INFO_CLONE);

        if let Some(script) = self.scripts.get_mut(&header.script) {
            script.clones += 1;
        }
        debug!("cloned {} ({obj:04x}) to {clone:04x}", self.object_name(obj));
        Ok(clone)
    }

    fn dispose_clone(&mut self, obj: u16) -> VmResult<bool> {
        let header = self.object_header(obj)?;
        let info = self.heap.read_word(obj + PROP_INFO * 2);
        if info & INFO_CLONE == 0 || info & INFO_NODISPOSE != 0 {
            warn!(
                "refusing to dispose {} ({obj:04x}), info {info:#06x}",
                self.object_name(obj)
            );
            return Ok(false);
        }
        // Only a block the allocator handed out can be a clone
        if self.heap.block_size(obj - HEADER_SIZE).is_none() {
            return Err(VmError::NotAnObject(obj));
        }
        self.heap.free(obj - HEADER_SIZE)?;
        self.heap.write_word(obj - HDR_MAGIC, 0);
        if let Some(script) = self.scripts.get_mut(&header.script) {
            script.clones = script.clones.saturating_sub(1);
        }
        Ok(true)
    }

    fn object_name(&self, obj: u16) -> String {
        match self.object_header(obj) {
            Ok(header) if header.prop_count > PROP_NAME => {
                let name = self.heap.read_word(obj + PROP_NAME * 2);
                if name != 0 {
                    self.heap.read_string(name)
                } else {
                    format!("obj_{obj:04x}")
                }
            }
            _ => format!("obj_{obj:04x}"),
        }
    }
}
