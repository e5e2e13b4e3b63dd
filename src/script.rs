/// Script resources: segment layout and the per-script loaded state
///
/// A script resource is a run of segments, each starting with a type word and
/// a length word (the length counts the 4 header bytes). A type of 0 ends the
/// run. Object, class, locals and string segments are copied into the heap at
/// load time; everything else is used in place from the resource bytes.
use crate::error::{VmError, VmResult};
use crate::resource::ResourceHandle;
use bitvec::prelude::*;
use std::fmt;

pub const SEGMENT_HEADER: usize = 4;

/// Offset of the property values inside an object or class segment body
pub const OBJECT_VALUES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Object = 1,
    Code = 2,
    Synonyms = 3,
    SaidSpecs = 4,
    Strings = 5,
    Class = 6,
    Exports = 7,
    Relocation = 8,
    PreloadText = 9,
    Locals = 10,
}

impl SegmentType {
    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => SegmentType::Object,
            2 => SegmentType::Code,
            3 => SegmentType::Synonyms,
            4 => SegmentType::SaidSpecs,
            5 => SegmentType::Strings,
            6 => SegmentType::Class,
            7 => SegmentType::Exports,
            8 => SegmentType::Relocation,
            9 => SegmentType::PreloadText,
            10 => SegmentType::Locals,
            _ => return None,
        })
    }

}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentType::Object => "object",
            SegmentType::Code => "code",
            SegmentType::Synonyms => "synonyms",
            SegmentType::SaidSpecs => "said",
            SegmentType::Strings => "strings",
            SegmentType::Class => "class",
            SegmentType::Exports => "exports",
            SegmentType::Relocation => "relocation",
            SegmentType::PreloadText => "preload-text",
            SegmentType::Locals => "locals",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentType,
    /// Resource offset of the body (just past the segment header)
    pub start: usize,
    /// Body length in bytes
    pub len: usize,
}

impl Segment {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

pub fn word(data: &[u8], offset: usize) -> VmResult<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| VmError::LoaderMismatch(format!("read past end of script at {offset:#x}")))
}

/// Walk the segment headers of a script resource.
pub fn scan_segments(data: &[u8]) -> VmResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut offset = 0;
    // A resource that ends exactly on a segment boundary needs no terminator
    while offset + 2 <= data.len() {
        let kind = word(data, offset)?;
        if kind == 0 {
            break;
        }
        let kind = SegmentType::from_u16(kind).ok_or_else(|| {
            VmError::LoaderMismatch(format!("unknown segment type {kind} at {offset:#x}"))
        })?;
        let size = word(data, offset + 2)? as usize;
        if size < SEGMENT_HEADER || offset + size > data.len() {
            return Err(VmError::LoaderMismatch(format!(
                "{kind} segment at {offset:#x} has bad size {size}"
            )));
        }
        segments.push(Segment {
            kind,
            start: offset + SEGMENT_HEADER,
            len: size - SEGMENT_HEADER,
        });
        offset += size;
    }
    Ok(segments)
}

/// Layout of one object or class segment, before it is copied to the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTemplate {
    pub is_class: bool,
    /// Resource offset of the method table
    pub methods: u16,
    pub prop_count: u16,
    /// Resource offset of the first property value
    pub values: usize,
    /// Resource offset of the property selector list (classes only)
    pub selectors: u16,
}

impl ObjectTemplate {
    pub fn parse(data: &[u8], segment: &Segment) -> VmResult<Self> {
        let magic = word(data, segment.start)?;
        if magic != crate::object::OBJ_MAGIC {
            return Err(VmError::LoaderMismatch(format!(
                "object at {:#x} has magic {magic:#06x}",
                segment.start
            )));
        }
        let method_offset = word(data, segment.start + 4)? as usize;
        let prop_count = word(data, segment.start + 6)?;
        let values = segment.start + OBJECT_VALUES;
        let is_class = segment.kind == SegmentType::Class;
        let needed = OBJECT_VALUES + prop_count as usize * if is_class { 4 } else { 2 };
        if needed > segment.len {
            return Err(VmError::LoaderMismatch(format!(
                "{} segment at {:#x} too short for {prop_count} properties",
                segment.kind, segment.start
            )));
        }
        let methods = segment.start + method_offset;
        if method_offset < needed || methods + 2 > segment.end() {
            return Err(VmError::LoaderMismatch(format!(
                "method table of object at {:#x} lies outside its segment",
                segment.start
            )));
        }
        let method_count = word(data, methods)? as usize;
        if methods + 2 + method_count * 4 > segment.end() {
            return Err(VmError::LoaderMismatch(format!(
                "method table of object at {:#x} runs past its segment",
                segment.start
            )));
        }
        Ok(ObjectTemplate {
            is_class,
            methods: methods as u16,
            prop_count,
            values,
            selectors: if is_class {
                (values + prop_count as usize * 2) as u16
            } else {
                0
            },
        })
    }

    /// Bytes the object occupies in the heap, header included
    pub fn heap_size(&self) -> usize {
        crate::object::HEADER_SIZE as usize + self.prop_count as usize * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Export {
    /// Raw table entry, not yet relocated
    Unresolved { offset: u16, segment: u16 },
    /// Offset into the script's code
    Code(u16),
    /// Address of a copied object or datum
    Heap(u16),
}

impl Export {
    /// The value a script sees for this export (ScriptID, `calle` targets)
    pub fn value(&self) -> u16 {
        match *self {
            Export::Unresolved { offset, .. } | Export::Code(offset) | Export::Heap(offset) => {
                offset
            }
        }
    }
}

pub fn parse_exports(data: &[u8], segment: &Segment) -> VmResult<Vec<Export>> {
    let count = word(data, segment.start)? as usize;
    if 2 + count * 4 > segment.len {
        return Err(VmError::LoaderMismatch(format!(
            "export table claims {count} entries"
        )));
    }
    (0..count)
        .map(|i| {
            let entry = segment.start + 2 + i * 4;
            Ok(Export::Unresolved {
                offset: word(data, entry)?,
                segment: word(data, entry + 2)?,
            })
        })
        .collect()
}

pub fn parse_relocations(data: &[u8], segment: &Segment) -> VmResult<Vec<u16>> {
    let count = word(data, segment.start)? as usize;
    if 4 + count * 2 > segment.len {
        return Err(VmError::LoaderMismatch(format!(
            "relocation table claims {count} entries"
        )));
    }
    (0..count)
        .map(|i| word(data, segment.start + 4 + i * 2))
        .collect()
}

/// One piece of the resource that was copied into the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRange {
    pub source: usize,
    pub len: usize,
    pub heap: u16,
}

/// A resident script
pub struct Script {
    pub number: u16,
    pub resource: ResourceHandle,
    /// Heap block holding every copied segment, 0 when nothing was copied
    pub heap_block: u16,
    pub copies: Vec<CopyRange>,
    pub exports: Vec<Export>,
    pub relocations: Vec<u16>,
    pub fixed_relocations: BitVec,
    pub fixed_exports: BitVec,
    pub locals: u16,
    pub num_locals: u16,
    /// Heap addresses of the script's objects and classes, in load order
    pub objects: Vec<u16>,
    pub clones: u16,
}

impl Script {
    pub fn new(number: u16, resource: ResourceHandle) -> Self {
        Script {
            number,
            resource,
            heap_block: 0,
            copies: Vec::new(),
            exports: Vec::new(),
            relocations: Vec::new(),
            fixed_relocations: BitVec::new(),
            fixed_exports: BitVec::new(),
            locals: 0,
            num_locals: 0,
            objects: Vec::new(),
            clones: 0,
        }
    }

    /// Heap address a resource offset was copied to, if it was copied
    pub fn to_heap(&self, offset: u16) -> Option<u16> {
        let offset = offset as usize;
        self.copies
            .iter()
            .find(|c| offset >= c.source && offset < c.source + c.len)
            .map(|c| c.heap + (offset - c.source) as u16)
    }

    pub fn word(&self, offset: u16) -> VmResult<u16> {
        word(&self.resource, offset as usize)
    }

    pub fn export(&self, index: u16) -> VmResult<Export> {
        self.exports
            .get(index as usize)
            .copied()
            .ok_or(VmError::BadExport {
                script: self.number,
                index,
            })
    }

    /// Address of the code for an export entry
    pub fn export_code(&self, index: u16) -> VmResult<u16> {
        match self.export(index)? {
            Export::Code(offset) => Ok(offset),
            _ => Err(VmError::BadExport {
                script: self.number,
                index,
            }),
        }
    }
}
