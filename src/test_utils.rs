// Test utilities: a script resource builder, a tiny assembler and
// interpreter setup over in-memory resources
use crate::config::VmConfig;
use crate::interpreter::Interpreter;
use crate::object::{INFO_CLASS, NO_CLASS, OBJ_MAGIC};
use crate::opcode_tables::{AccessOp, Op, OperandFormat, VarAccess, VarSpace};
use crate::resource::{MemorySource, ResourceManager, ResourceType};
use crate::script::SegmentType;

pub const SEL_SPECIES: u16 = 0;
pub const SEL_SUPER: u16 = 1;
pub const SEL_INFO: u16 = 2;
pub const SEL_NAME: u16 = 3;

/// Builds a script resource one segment at a time. Every call appends a
/// segment, so offsets returned are final. Exports and the relocation table
/// are written by `build`.
#[derive(Default)]
pub struct ScriptBuilder {
    data: Vec<u8>,
    exports: Vec<u16>,
    relocations: Vec<u16>,
}

fn words(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment, returning the offset of its body
    pub fn segment(&mut self, kind: SegmentType, body: &[u8]) -> u16 {
        let mut body = body.to_vec();
        if body.len() % 2 == 1 {
            body.push(0);
        }
        self.data.extend(words(&[kind as u16, body.len() as u16 + 4]));
        let start = self.data.len() as u16;
        self.data.extend(body);
        start
    }

    /// Body offset the next segment will get
    pub fn next_offset(&self) -> u16 {
        self.data.len() as u16 + 4
    }

    pub fn code(&mut self, bytes: &[u8]) -> u16 {
        self.segment(SegmentType::Code, bytes)
    }

    /// Object or class segment; returns the object's script address (body+8)
    pub fn object_raw(
        &mut self,
        kind: SegmentType,
        values: &[u16],
        selectors: &[u16],
        methods: &[(u16, u16)],
    ) -> u16 {
        let mut tail = values.to_vec();
        if kind == SegmentType::Class {
            tail.extend_from_slice(selectors);
        }
        let method_offset = 8 + tail.len() as u16 * 2;
        let mut body = vec![OBJ_MAGIC, 0, method_offset, values.len() as u16];
        body.extend(tail);
        body.push(methods.len() as u16);
        body.extend(methods.iter().map(|m| m.0));
        body.extend(methods.iter().map(|m| m.1));
        self.segment(kind, &words(&body)) + 8
    }

    /// A class: `props` are (selector, value) after species/super/info/name
    pub fn class(
        &mut self,
        id: u16,
        super_id: u16,
        props: &[(u16, u16)],
        methods: &[(u16, u16)],
    ) -> u16 {
        let mut values = vec![id, super_id, INFO_CLASS, 0];
        let mut selectors = vec![SEL_SPECIES, SEL_SUPER, SEL_INFO, SEL_NAME];
        for &(sel, value) in props {
            selectors.push(sel);
            values.push(value);
        }
        self.object_raw(SegmentType::Class, &values, &selectors, methods)
    }

    /// An instance of class `class_id`; `props` are the values after name
    pub fn instance(&mut self, class_id: u16, props: &[u16], methods: &[(u16, u16)]) -> u16 {
        self.instance_with_info(class_id, 0, props, methods)
    }

    pub fn instance_with_info(
        &mut self,
        class_id: u16,
        info: u16,
        props: &[u16],
        methods: &[(u16, u16)],
    ) -> u16 {
        let mut values = vec![class_id, class_id, info, 0];
        values.extend_from_slice(props);
        self.object_raw(SegmentType::Object, &values, &[], methods)
    }

    /// Point an object's name property at a string, with a relocation entry
    pub fn set_name(&mut self, obj: u16, string: u16) {
        let at = obj as usize + 6;
        self.data[at..at + 2].copy_from_slice(&string.to_le_bytes());
        self.pointer(obj + 6);
    }

    pub fn strings(&mut self, strings: &[&str]) -> Vec<u16> {
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        for s in strings {
            offsets.push(body.len() as u16);
            body.extend_from_slice(s.as_bytes());
            body.push(0);
        }
        let start = self.segment(SegmentType::Strings, &body);
        offsets.iter().map(|o| start + o).collect()
    }

    pub fn locals(&mut self, values: &[u16]) -> u16 {
        self.segment(SegmentType::Locals, &words(values))
    }

    /// Record a word at `location` that holds a script address
    pub fn pointer(&mut self, location: u16) {
        self.relocations.push(location);
    }

    /// Add an export entry, returning its index
    pub fn export(&mut self, offset: u16) -> u16 {
        self.exports.push(offset);
        self.exports.len() as u16 - 1
    }

    pub fn build(mut self) -> Vec<u8> {
        if !self.exports.is_empty() {
            let mut body = vec![self.exports.len() as u16];
            for &offset in &self.exports {
                body.extend([offset, 0]);
            }
            self.segment(SegmentType::Exports, &words(&body));
        }
        if !self.relocations.is_empty() {
            let mut body = vec![self.relocations.len() as u16, 0];
            body.extend(self.relocations.iter().copied());
            self.segment(SegmentType::Relocation, &words(&body));
        }
        self.data.extend([0, 0]);
        self.data
    }
}

/// Minimal assembler for test code
#[derive(Default, Clone)]
pub struct Asm {
    pub bytes: Vec<u8>,
}

impl Asm {
    pub fn new() -> Self {
        Self::default()
    }

    fn fits_byte(format: OperandFormat, value: u16) -> bool {
        match format {
            OperandFormat::Byte => true,
            OperandFormat::Var => value <= 0xFF,
            OperandFormat::SVar => (-128..=127).contains(&(value as i16)),
        }
    }

    fn emit(mut self, op: Op, operands: &[u16], byte_form: bool) -> Self {
        self.bytes.push(op.byte(byte_form));
        for (format, &value) in op.operand_formats().iter().zip(operands) {
            if *format == OperandFormat::Byte || byte_form {
                self.bytes.push(value as u8);
            } else {
                self.bytes.extend(value.to_le_bytes());
            }
        }
        self
    }

    /// Emit with the narrowest encoding that holds every operand
    pub fn op(self, op: Op, operands: &[u16]) -> Self {
        let byte_form = op
            .operand_formats()
            .iter()
            .zip(operands)
            .all(|(f, &v)| Self::fits_byte(*f, v));
        self.emit(op, operands, byte_form)
    }

    pub fn op_word(self, op: Op, operands: &[u16]) -> Self {
        self.emit(op, operands, false)
    }

    /// Byte form regardless of value; ldi 0x80 encodes as a byte
    pub fn op_byte(self, op: Op, operands: &[u16]) -> Self {
        self.emit(op, operands, true)
    }

    pub fn access(self, op: AccessOp, space: VarSpace, index: u16, stack: bool, indexed: bool) -> Self {
        let access = VarAccess {
            op,
            indexed,
            stack,
            space,
        };
        self.op(Op::Access(access), &[index])
    }

    pub fn ldi(self, value: u16) -> Self {
        self.op(Op::Ldi, &[value])
    }

    pub fn pushi(self, value: u16) -> Self {
        self.op(Op::Pushi, &[value])
    }

    pub fn push(self) -> Self {
        self.op(Op::Push, &[])
    }

    pub fn ret(self) -> Self {
        self.op(Op::Ret, &[])
    }

    pub fn append(mut self, other: &Asm) -> Self {
        self.bytes.extend_from_slice(&other.bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// vocab.996 for class ids 0..scripts.len()
pub fn class_vocab(scripts: &[u16]) -> Vec<u8> {
    words(&scripts.iter().flat_map(|&s| [0, s]).collect::<Vec<_>>())
}

pub fn selector_vocab(names: &[&str]) -> Vec<u8> {
    let mut offsets = Vec::new();
    let mut strings = Vec::new();
    let table = 2 + names.len() * 2;
    for name in names {
        offsets.push((table + strings.len()) as u16);
        strings.extend((name.len() as u16).to_le_bytes());
        strings.extend(name.as_bytes());
    }
    let mut data = words(&[names.len() as u16]);
    data.extend(words(&offsets));
    data.extend(strings);
    data
}

/// In-memory game: scripts plus an optional class vocabulary
pub struct TestGame {
    pub source: MemorySource,
    pub config: VmConfig,
}

impl TestGame {
    pub fn new() -> Self {
        TestGame {
            source: MemorySource::new(),
            config: VmConfig {
                random_seed: Some(1),
                ..VmConfig::default()
            },
        }
    }

    pub fn script(mut self, number: u16, data: Vec<u8>) -> Self {
        self.source.insert(ResourceType::Script, number, data);
        self
    }

    pub fn classes(mut self, scripts: &[u16]) -> Self {
        self.source
            .insert(ResourceType::Vocab, crate::vocab::CLASS_VOCAB, class_vocab(scripts));
        self
    }

    pub fn selectors(mut self, names: &[&str]) -> Self {
        self.source.insert(
            ResourceType::Vocab,
            crate::vocab::SELECTOR_VOCAB,
            selector_vocab(names),
        );
        self
    }

    pub fn interpreter(self) -> Interpreter {
        let budget = self.config.cache_budget;
        let rm = ResourceManager::new(Box::new(self.source), budget);
        Interpreter::with_resources(self.config, Box::new(rm)).unwrap()
    }
}

/// A script 0 holding one procedure as export 0 and `globals` locals
pub fn procedure_script(code: &[u8], globals: usize) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    let offset = builder.code(code);
    if globals > 0 {
        builder.locals(&vec![0; globals]);
    }
    builder.export(offset);
    builder.build()
}

/// Run `code` as script 0's export 0 and return the accumulator
pub fn run_procedure(code: &[u8], args: &[u16]) -> (Interpreter, crate::error::VmResult<u16>) {
    let mut interp = TestGame::new()
        .script(0, procedure_script(code, 8))
        .interpreter();
    let result = interp.call_export(0, 0, args);
    (interp, result)
}

pub const NO_SUPER: u16 = NO_CLASS;
