use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::kernel::kernel_name;
use crate::object::OBJ_MAGIC;
use crate::opcode_tables::Op;
use crate::script::{parse_exports, scan_segments, word, ObjectTemplate, Segment, SegmentType};
use crate::vocab::SelectorNames;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Lists the code of a script resource with its entry points labelled
pub struct Disassembler<'a> {
    data: &'a [u8],
    segments: Vec<Segment>,
    names: Option<&'a SelectorNames>,
}

impl<'a> Disassembler<'a> {
    pub fn new(data: &'a [u8], names: Option<&'a SelectorNames>) -> VmResult<Self> {
        Ok(Disassembler {
            data,
            segments: scan_segments(data)?,
            names,
        })
    }

    fn selector(&self, selector: u16) -> String {
        match self.names {
            Some(names) => names.describe(selector),
            None => format!("sel_{selector}"),
        }
    }

    /// Code offset -> labels for methods and exported procedures
    pub fn entry_points(&self) -> VmResult<BTreeMap<u16, Vec<String>>> {
        let mut labels: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment.kind {
                SegmentType::Object | SegmentType::Class => {
                    if word(self.data, segment.start)? != OBJ_MAGIC {
                        continue;
                    }
                    let template = ObjectTemplate::parse(self.data, segment)?;
                    let count = word(self.data, template.methods as usize)?;
                    for i in 0..count as usize {
                        let sel = word(self.data, template.methods as usize + 2 + i * 2)?;
                        let offset =
                            word(self.data, template.methods as usize + 2 + (count as usize + i) * 2)?;
                        labels
                            .entry(offset)
                            .or_default()
                            .push(format!("{} #{index}::{}", segment.kind, self.selector(sel)));
                    }
                }
                SegmentType::Exports => {
                    for (i, export) in parse_exports(self.data, segment)?.iter().enumerate() {
                        let offset = export.value();
                        if self.in_code(offset) {
                            labels.entry(offset).or_default().push(format!("export {i}"));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(labels)
    }

    fn in_code(&self, offset: u16) -> bool {
        let offset = offset as usize;
        self.segments
            .iter()
            .any(|s| s.kind == SegmentType::Code && offset >= s.start && offset < s.end())
    }

    /// Disassemble every code segment
    pub fn disassemble(&self) -> VmResult<String> {
        let labels = self.entry_points()?;
        let mut output = String::new();
        for segment in self.segments.iter().filter(|s| s.kind == SegmentType::Code) {
            let _ = writeln!(
                output,
                "; code segment {:#06x}..{:#06x}",
                segment.start,
                segment.end()
            );
            let code = &self.data[..segment.end()];
            let mut pc = segment.start;
            while pc < segment.end() {
                if let Some(names) = labels.get(&(pc as u16)) {
                    for name in names {
                        let _ = writeln!(output, "\n{name}:");
                    }
                }
                match Instruction::decode(code, pc, 0) {
                    Ok(inst) => {
                        let _ = writeln!(output, "{}", self.format_instruction(&inst, pc));
                        pc += inst.size;
                    }
                    Err(_) => {
                        let _ = writeln!(output, "{pc:04x}: {:02x}             db", self.data[pc]);
                        pc += 1;
                    }
                }
            }
        }
        Ok(output)
    }

    pub fn format_instruction(&self, inst: &Instruction, pc: usize) -> String {
        let bytes: Vec<String> = self.data[pc..pc + inst.size]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let mut line = format!("{pc:04x}: {:<15} {inst}", bytes.join(" "));
        match inst.op {
            Op::Bt | Op::Bnt | Op::Jmp | Op::Call | Op::Lofsa | Op::Lofss => {
                let _ = write!(line, "  ; -> {:04x}", inst.relative_target(pc as u16));
            }
            Op::Callk => {
                if let Some(name) = kernel_name(inst.operand(0)) {
                    let _ = write!(line, "  ; {name}");
                }
            }
            Op::Pushi if self.names.is_some() => {
                if let Some(name) = self.names.and_then(|n| n.name(inst.operand(0))) {
                    let _ = write!(line, "  ; #{name}");
                }
            }
            _ => {}
        }
        line
    }
}
