use crate::error::{VmError, VmResult};
use crate::opcode_tables::{Op, OperandFormat};
use std::fmt::{Display, Error, Formatter};

/// A decoded script instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The raw opcode byte
    pub opcode: u8,
    pub op: Op,
    /// Size bit: variable-size operands are one byte wide
    pub byte_form: bool,
    /// Operands, widened to 16 bits (signed ones sign-extended)
    pub operands: Vec<u16>,
    /// Total size in bytes, opcode included
    pub size: usize,
}

impl Instruction {
    /// Decode the instruction at `pc` of a script's code. `script` is only
    /// used for error reporting.
    pub fn decode(code: &[u8], pc: usize, script: u16) -> VmResult<Self> {
        let bad = |opcode: u8| VmError::BadOpcode {
            opcode,
            script,
            pc: pc as u16,
        };
        let opcode = *code.get(pc).ok_or(bad(0))?;
        let op = Op::from_byte(opcode).ok_or(bad(opcode))?;
        let byte_form = opcode & 1 == 1;

        let mut offset = pc + 1;
        let mut operands = Vec::with_capacity(op.operand_formats().len());
        for format in op.operand_formats() {
            let wide = match format {
                OperandFormat::Byte => false,
                _ => !byte_form,
            };
            let value = if wide {
                let bytes = code.get(offset..offset + 2).ok_or(bad(opcode))?;
                offset += 2;
                u16::from_le_bytes([bytes[0], bytes[1]])
            } else {
                let byte = *code.get(offset).ok_or(bad(opcode))?;
                offset += 1;
                match format {
                    OperandFormat::SVar => byte as i8 as i16 as u16,
                    _ => byte as u16,
                }
            };
            operands.push(value);
        }

        Ok(Instruction {
            opcode,
            op,
            byte_form,
            operands,
            size: offset - pc,
        })
    }

    pub fn operand(&self, index: usize) -> u16 {
        self.operands.get(index).copied().unwrap_or(0)
    }

    pub fn name(&self) -> String {
        self.op.name()
    }

    /// Target of a relative jump or `lofsa`-style offset for an instruction at `pc`
    pub fn relative_target(&self, pc: u16) -> u16 {
        pc.wrapping_add(self.size as u16)
            .wrapping_add(self.operand(0))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.name())?;
        for (i, op) in self.operands.iter().enumerate() {
            if i == 0 {
                write!(f, " ")?;
            } else {
                write!(f, ", ")?;
            }
            match self.op.operand_formats()[i] {
                OperandFormat::SVar => write!(f, "{}", *op as i16)?,
                _ => write!(f, "${:x}", op)?,
            }
        }
        Ok(())
    }
}
