/// Script loader and relocator
///
/// Loading copies a script's objects, classes, locals and strings into one
/// heap block, registers its classes, links every object to its species and
/// superclass and then relocates. Everything else in the resource (code,
/// exports, relocation table, said specs, synonyms) is used in place.
use crate::error::{VmError, VmResult};
use crate::object::{
    ObjectModel, HDR_CLASS_SCRIPT, HDR_MAGIC, HDR_METHODS, HDR_PROP_DICT, HDR_SCRIPT, HDR_SIZE,
    HEADER_SIZE, INFO_CLASS, NO_CLASS, OBJ_MAGIC, PROP_INFO, PROP_SPECIES, PROP_SUPER,
};
use crate::resource::ResourceType;
use crate::script::{
    parse_exports, parse_relocations, scan_segments, CopyRange, Export, ObjectTemplate, Script,
    SegmentType,
};
use crate::vm::VM;
use bitvec::prelude::*;
use log::{debug, info, trace, warn};

impl VM {
    /// Make sure a script is resident, loading it on first use
    pub fn script_ptr(&mut self, number: u16) -> VmResult<&Script> {
        if !self.scripts.contains_key(&number) {
            self.load_script(number)?;
        }
        self.script(number)
    }

    fn load_script(&mut self, number: u16) -> VmResult<()> {
        let resource = self.resources.load(ResourceType::Script, number)?;
        let mut script = Script::new(number, resource);
        if let Err(e) = self.copy_segments(&mut script) {
            warn!("script {number} failed to load: {e}");
            if script.heap_block != 0 {
                if let Err(e) = self.heap.free(script.heap_block) {
                    warn!("script {number}: {e}");
                }
            }
            self.resources.unload(ResourceType::Script, Some(number));
            return Err(e);
        }

        let classes: Vec<u16> = script
            .objects
            .iter()
            .copied()
            .filter(|&obj| self.heap.read_word(obj + PROP_INFO * 2) & INFO_CLASS != 0)
            .collect();
        for class in classes {
            let id = self.heap.read_word(class + PROP_SPECIES * 2);
            self.classes.register(id, class, number);
        }
        if number == 0 {
            self.globals = script.locals;
            self.num_globals = script.num_locals;
        }
        let objects = script.objects.clone();
        info!(
            "loaded script {number}: {} objects, {} locals, {} exports",
            objects.len(),
            script.num_locals,
            script.exports.len()
        );
        self.scripts.insert(number, script);

        let linked = self.relocate(number).and_then(|_| self.link_objects(number, &objects));
        if let Err(e) = linked {
            warn!("script {number} failed to link: {e}");
            self.discard_script(number);
            return Err(e);
        }
        Ok(())
    }

    /// Validate the segments, then copy objects, classes, locals and strings
    /// into a fresh heap block. On error `script.heap_block` is whatever was
    /// allocated so far.
    fn copy_segments(&mut self, script: &mut Script) -> VmResult<()> {
        let number = script.number;
        let resource = script.resource.clone();
        let segments = scan_segments(&resource)?;

        // Size the heap block and read the in-place tables
        let mut size = 0usize;
        let mut templates = Vec::new();
        let mut has_locals = false;
        for segment in &segments {
            match segment.kind {
                SegmentType::Object | SegmentType::Class => {
                    let template = ObjectTemplate::parse(&resource, segment)?;
                    size += template.heap_size();
                    templates.push(template);
                }
                SegmentType::Locals | SegmentType::Strings => {
                    if segment.kind == SegmentType::Locals {
                        if has_locals {
                            return Err(VmError::LoaderMismatch(format!(
                                "script {number} has more than one locals segment"
                            )));
                        }
                        has_locals = true;
                    }
                    size += (segment.len + 1) & !1;
                }
                SegmentType::Exports => {
                    if !script.exports.is_empty() {
                        return Err(VmError::LoaderMismatch(format!(
                            "script {number} has more than one export table"
                        )));
                    }
                    script.exports = parse_exports(&resource, segment)?;
                }
                SegmentType::Relocation => script
                    .relocations
                    .extend(parse_relocations(&resource, segment)?),
                _ => {}
            }
        }
        script.fixed_exports = bitvec![0; script.exports.len()];
        script.fixed_relocations = bitvec![0; script.relocations.len()];

        if size > 0 {
            script.heap_block = self.heap.alloc(size)?;
        }

        let mut cursor = script.heap_block;
        let mut templates = templates.into_iter();
        for segment in &segments {
            match segment.kind {
                SegmentType::Object | SegmentType::Class => {
                    let Some(template) = templates.next() else {
                        break;
                    };
                    let obj = cursor + HEADER_SIZE;
                    let values = &resource
                        [template.values..template.values + template.prop_count as usize * 2];
                    self.heap.write_word(obj - HDR_MAGIC, OBJ_MAGIC);
                    self.heap.write_word(obj - HDR_SCRIPT, number);
                    self.heap.write_word(obj - HDR_METHODS, template.methods);
                    self.heap.write_word(obj - HDR_PROP_DICT, template.selectors);
                    self.heap.write_word(obj - HDR_CLASS_SCRIPT, number);
                    self.heap.write_word(obj - HDR_SIZE, template.prop_count);
                    self.heap.copy_in(obj, values);
                    script.copies.push(CopyRange {
                        source: template.values,
                        len: values.len(),
                        heap: obj,
                    });
                    if template.is_class {
                        let info = self.heap.read_word(obj + PROP_INFO * 2);
                        self.heap.write_word(obj + PROP_INFO * 2, info | INFO_CLASS);
                    }
                    script.objects.push(obj);
                    cursor += template.heap_size() as u16;
                }
                SegmentType::Locals | SegmentType::Strings => {
                    let body = &resource[segment.start..segment.end()];
                    self.heap.copy_in(cursor, body);
                    script.copies.push(CopyRange {
                        source: segment.start,
                        len: segment.len,
                        heap: cursor,
                    });
                    if segment.kind == SegmentType::Locals {
                        script.locals = cursor;
                        script.num_locals = (segment.len / 2) as u16;
                    }
                    cursor += ((segment.len + 1) & !1) as u16;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Replace species and super class ids with class pointers
    fn link_objects(&mut self, number: u16, objects: &[u16]) -> VmResult<()> {
        for &obj in objects {
            let is_class = self.heap.read_word(obj + PROP_INFO * 2) & INFO_CLASS != 0;
            let species_id = self.heap.read_word(obj + PROP_SPECIES * 2);
            let super_id = self.heap.read_word(obj + PROP_SUPER * 2);

            let species = if is_class {
                obj
            } else {
                self.get_class(species_id)?
            };
            let superclass = if super_id == NO_CLASS {
                0
            } else {
                self.get_class(super_id)?
            };
            let species_script = self.heap.read_word(species - HDR_SCRIPT);

            self.heap.write_word(obj + PROP_SPECIES * 2, species);
            self.heap.write_word(obj + PROP_SUPER * 2, superclass);
            self.heap.write_word(obj - HDR_CLASS_SCRIPT, species_script);
            trace!(
                "script {number}: {} at {obj:04x} species {species:04x} super {superclass:04x}",
                self.object_name(obj)
            );
        }
        Ok(())
    }

    /// Class object for a class id, loading its script when needed
    pub fn get_class(&mut self, id: u16) -> VmResult<u16> {
        let entry = self.classes.get(id)?;
        if entry.obj != 0 {
            return Ok(entry.obj);
        }
        if self.scripts.contains_key(&entry.script) {
            return Err(VmError::BadClass(id));
        }
        self.script_ptr(entry.script)?;
        match self.classes.get(id)?.obj {
            0 => Err(VmError::BadClass(id)),
            obj => Ok(obj),
        }
    }

    /// Patch relocation and export entries that point into copied data.
    /// Every entry is fixed at most once, so calling this again is a no-op.
    /// Returns the number of entries patched by this call.
    pub fn relocate(&mut self, number: u16) -> VmResult<usize> {
        let heap = &mut self.heap;
        let script = self.scripts.get_mut(&number).ok_or_else(|| {
            VmError::Relocation(format!("relocating script {number} which is not loaded"))
        })?;

        let mut patched = 0;
        for i in 0..script.relocations.len() {
            if script.fixed_relocations[i] {
                continue;
            }
            let location = script.relocations[i];
            match script.to_heap(location) {
                Some(addr) => {
                    let value = heap.read_word(addr);
                    match script.to_heap(value) {
                        Some(target) => heap.write_word(addr, target),
                        None => trace!(
                            "script {number}: relocation at {location:#x} points at {value:#x}, left alone"
                        ),
                    }
                    patched += 1;
                }
                None => trace!("script {number}: relocation at {location:#x} is not in a copied segment"),
            }
            script.fixed_relocations.set(i, true);
        }

        for i in 0..script.exports.len() {
            if script.fixed_exports[i] {
                continue;
            }
            script.exports[i] = match script.exports[i] {
                Export::Unresolved { offset, .. } => match script.to_heap(offset) {
                    Some(addr) => Export::Heap(addr),
                    None => Export::Code(offset),
                },
                resolved => resolved,
            };
            script.fixed_exports.set(i, true);
            patched += 1;
        }
        debug!("script {number}: {patched} entries relocated");
        Ok(patched)
    }

    /// Unload a script. Clones of its objects must be gone first.
    pub fn dispose_script(&mut self, number: u16) -> VmResult<()> {
        let Some(script) = self.scripts.get(&number) else {
            debug!("dispose of script {number} which is not loaded");
            return Ok(());
        };
        if script.clones > 0 {
            return Err(VmError::LeftClone {
                script: number,
                clones: script.clones,
            });
        }
        self.discard_script(number);
        info!("disposed script {number}");
        Ok(())
    }

    fn discard_script(&mut self, number: u16) {
        let Some(script) = self.scripts.remove(&number) else {
            return;
        };
        self.classes.unbind_script(number);
        for &obj in &script.objects {
            self.heap.write_word(obj - HDR_MAGIC, 0);
        }
        if script.heap_block != 0 {
            if let Err(e) = self.heap.free(script.heap_block) {
                warn!("script {number}: {e}");
            }
        }
        if number == 0 {
            self.globals = 0;
            self.num_globals = 0;
        }
        drop(script);
        self.resources.unload(ResourceType::Script, Some(number));
    }
}
