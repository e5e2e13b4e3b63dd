/// Memory operations for the script interpreter
///
/// This module handles:
/// - Variable access (load, store, increment, decrement on globals, locals,
///   temps and params; to the accumulator or the stack; optionally indexed)
/// - `lea`, taking the address of a variable
/// - Property access on the current object by byte offset
/// - `lofsa`/`lofss`, turning a script offset into a heap address
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Interpreter};
use crate::object::ObjectModel;
use crate::opcode_tables::{AccessOp, Op, VarAccess, VarSpace};
use log::trace;

impl Interpreter {
    pub fn is_memory_opcode(op: Op) -> bool {
        matches!(
            op,
            Op::Lea
                | Op::PToA
                | Op::AToP
                | Op::PToS
                | Op::SToP
                | Op::IpToA
                | Op::DpToA
                | Op::IpToS
                | Op::DpToS
                | Op::Lofsa
                | Op::Lofss
        )
    }

    pub fn execute_access(&mut self, access: VarAccess, operand: u16) -> VmResult<ExecutionResult> {
        let acc = self.vm.regs.acc;
        let index = if access.indexed {
            operand.wrapping_add(acc)
        } else {
            operand
        };
        let addr = self.vm.var_addr(access.space, index)?;

        match access.op {
            AccessOp::Load => {
                let value = self.vm.heap.read_word(addr);
                self.deliver(access, value)?;
            }
            AccessOp::Store => {
                let value = if access.stack {
                    self.vm.pop()?
                } else if access.indexed {
                    // the accumulator held the index, the value comes from the stack
                    let value = self.vm.pop()?;
                    self.vm.regs.acc = value;
                    value
                } else {
                    acc
                };
                self.vm.heap.write_word(addr, value);
            }
            AccessOp::Inc | AccessOp::Dec => {
                let old = self.vm.heap.read_word(addr) as i16;
                let value = if access.op == AccessOp::Inc {
                    old.wrapping_add(1)
                } else {
                    old.wrapping_sub(1)
                } as u16;
                self.vm.heap.write_word(addr, value);
                self.deliver(access, value)?;
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// Put a loaded value where the access wants it
    fn deliver(&mut self, access: VarAccess, value: u16) -> VmResult<()> {
        if access.stack {
            self.vm.push(value)
        } else {
            self.vm.regs.acc = value;
            Ok(())
        }
    }

    pub fn execute_memory_op(&mut self, inst: &Instruction) -> VmResult<ExecutionResult> {
        match inst.op {
            Op::Lea => {
                let kind = inst.operand(0);
                let mut index = inst.operand(1);
                if kind & 0x10 != 0 {
                    index = index.wrapping_add(self.vm.regs.acc);
                }
                let space = VarSpace::from_bits((kind >> 1) as u8);
                self.vm.regs.acc = self.vm.var_addr(space, index)?;
            }
            Op::Lofsa | Op::Lofss => {
                // pc already points past this instruction
                let offset = self.vm.regs.pc.wrapping_add(inst.operand(0));
                let addr = self
                    .vm
                    .script(self.vm.regs.script)?
                    .to_heap(offset)
                    .unwrap_or(offset);
                trace!("{}: offset {offset:04x} is {addr:04x}", inst.name());
                if inst.op == Op::Lofsa {
                    self.vm.regs.acc = addr;
                } else {
                    self.vm.push(addr)?;
                }
            }
            op => {
                let addr = self.property_addr(inst.operand(0))?;
                let old = self.vm.heap.read_word(addr);
                match op {
                    Op::PToA => self.vm.regs.acc = old,
                    Op::PToS => self.vm.push(old)?,
                    Op::AToP => self.vm.heap.write_word(addr, self.vm.regs.acc),
                    Op::SToP => {
                        let value = self.vm.pop()?;
                        self.vm.heap.write_word(addr, value);
                    }
                    _ => {
                        let value = if matches!(op, Op::IpToA | Op::IpToS) {
                            old.wrapping_add(1)
                        } else {
                            old.wrapping_sub(1)
                        };
                        self.vm.heap.write_word(addr, value);
                        if matches!(op, Op::IpToA | Op::DpToA) {
                            self.vm.regs.acc = value;
                        } else {
                            self.vm.push(value)?;
                        }
                    }
                }
            }
        }
        Ok(ExecutionResult::Continue)
    }

    /// Address of the property at byte `offset` of the current object
    fn property_addr(&self, offset: u16) -> VmResult<u16> {
        let obj = self.vm.regs.object;
        let header = self.vm.object_header(obj)?;
        if offset % 2 != 0 || offset / 2 >= header.prop_count {
            return Err(VmError::BadVariable {
                space: "property",
                index: offset,
            });
        }
        Ok(obj + offset)
    }
}
