/// Arithmetic, bitwise and comparison opcodes
///
/// Binary operators take their left operand from the stack and their right
/// operand from the accumulator: `acc = pop() OP acc`. Arithmetic is signed
/// 16-bit and wraps. Comparisons save the old accumulator in `prev` first so
/// `pprev` can chain range tests.
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::opcode_tables::Op;

impl Interpreter {
    pub fn is_math_opcode(op: Op) -> bool {
        matches!(
            op,
            Op::Bnot
                | Op::Add
                | Op::Sub
                | Op::Mul
                | Op::Div
                | Op::Mod
                | Op::Shr
                | Op::Shl
                | Op::Xor
                | Op::And
                | Op::Or
                | Op::Neg
                | Op::Not
        ) || Self::is_comparison_opcode(op)
    }

    pub fn is_comparison_opcode(op: Op) -> bool {
        matches!(
            op,
            Op::Eq
                | Op::Ne
                | Op::Gt
                | Op::Ge
                | Op::Lt
                | Op::Le
                | Op::Ugt
                | Op::Uge
                | Op::Ult
                | Op::Ule
        )
    }

    /// `prior_imm` is the byte immediate of an `ldi` executed just before
    pub fn execute_math_op(
        &mut self,
        inst: &Instruction,
        prior_imm: Option<u8>,
    ) -> VmResult<ExecutionResult> {
        let acc = self.vm.regs.acc;
        match inst.op {
            Op::Bnot => self.vm.regs.acc = !acc,
            Op::Neg => self.vm.regs.acc = (acc as i16).wrapping_neg() as u16,
            Op::Not => self.vm.regs.acc = (acc == 0) as u16,
            op if Self::is_comparison_opcode(op) => {
                let left = self.vm.pop()?;
                self.vm.regs.prev = acc;
                self.vm.regs.acc = compare(op, left, acc, prior_imm) as u16;
            }
            op => {
                let left = self.vm.pop()?;
                self.vm.regs.acc = arithmetic(op, left, acc)?;
            }
        }
        Ok(ExecutionResult::Continue)
    }
}

fn arithmetic(op: Op, a: u16, b: u16) -> VmResult<u16> {
    let (sa, sb) = (a as i16, b as i16);
    Ok(match op {
        Op::Add => sa.wrapping_add(sb) as u16,
        Op::Sub => sa.wrapping_sub(sb) as u16,
        Op::Mul => sa.wrapping_mul(sb) as u16,
        Op::Div => {
            if sb == 0 {
                return Err(VmError::ZeroDivide);
            }
            sa.wrapping_div(sb) as u16
        }
        Op::Mod => {
            if sb == 0 {
                return Err(VmError::ZeroModulo);
            }
            sa.wrapping_rem(sb) as u16
        }
        // logical shifts; counts of 16 or more clear the value
        Op::Shr => a.checked_shr(b as u32).unwrap_or(0),
        Op::Shl => a.checked_shl(b as u32).unwrap_or(0),
        Op::Xor => a ^ b,
        Op::And => a & b,
        Op::Or => a | b,
        _ => unreachable!("{} is not arithmetic", op.name()),
    })
}

/// Compare `left` (from the stack) with the accumulator.
///
/// Compiled code loads small flag constants with a byte `ldi`, which sign
/// extends anything from 0x80 up. For an unsigned comparison right after such
/// a load, values 0x80..=0xEF are taken as the zero-extended byte; 0xF0..=0xFF
/// are left alone as genuine small negatives.
fn compare(op: Op, left: u16, acc: u16, prior_imm: Option<u8>) -> bool {
    let unsigned_acc = match prior_imm {
        Some(byte @ 0x80..=0xEF) => byte as u16,
        _ => acc,
    };
    let (sl, sa) = (left as i16, acc as i16);
    match op {
        Op::Eq => left == acc,
        Op::Ne => left != acc,
        Op::Gt => sl > sa,
        Op::Ge => sl >= sa,
        Op::Lt => sl < sa,
        Op::Le => sl <= sa,
        Op::Ugt => left > unsigned_acc,
        Op::Uge => left >= unsigned_acc,
        Op::Ult => left < unsigned_acc,
        Op::Ule => left <= unsigned_acc,
        _ => unreachable!("{} is not a comparison", op.name()),
    }
}
