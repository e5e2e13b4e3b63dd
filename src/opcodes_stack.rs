/// Stack and control flow operations
///
/// This module handles:
/// - Branches (`bt`, `bnt`, `jmp`), relative to the next instruction
/// - Immediates and stack shuffling (`ldi`, `push*`, `toss`, `dup`, `pprev`)
/// - Frames (`link`, `&rest`)
/// - Procedure and kernel calls (`call`, `callb`, `calle`, `callk`) and `ret`
///
/// A call's argument block is the argc word followed by the arguments. The
/// `frame` operand counts the argument bytes without the argc word; words
/// pushed by `&rest` sit on top and are added to argc at call time. When the
/// callee returns, the whole block is popped.
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Frame, Interpreter};
use crate::kernel::kernel_name;
use crate::opcode_tables::Op;
use log::trace;

impl Interpreter {
    pub fn execute_stack_op(&mut self, inst: &Instruction) -> VmResult<ExecutionResult> {
        let acc = self.vm.regs.acc;
        match inst.op {
            Op::Bt | Op::Bnt | Op::Jmp => {
                let taken = match inst.op {
                    Op::Bt => acc != 0,
                    Op::Bnt => acc == 0,
                    _ => true,
                };
                if taken {
                    self.vm.regs.pc = self.vm.regs.pc.wrapping_add(inst.operand(0));
                    return Ok(ExecutionResult::Branched);
                }
            }
            Op::Ldi => {
                self.vm.regs.acc = inst.operand(0);
                if inst.byte_form {
                    self.last_byte_imm = Some(inst.operand(0) as u8);
                }
            }
            Op::Push => self.vm.push(acc)?,
            Op::Pushi => self.vm.push(inst.operand(0))?,
            Op::Push0 => self.vm.push(0)?,
            Op::Push1 => self.vm.push(1)?,
            Op::Push2 => self.vm.push(2)?,
            Op::Pprev => self.vm.push(self.vm.regs.prev)?,
            Op::Toss => {
                self.vm.pop()?;
            }
            Op::Dup => {
                let top = self.vm.peek()?;
                self.vm.push(top)?;
            }
            Op::Link => {
                self.vm.regs.temps = self.vm.stack.sp;
                self.vm.stack.reserve(&mut self.vm.heap, inst.operand(0))?;
            }
            Op::Rest => self.do_rest(inst.operand(0))?,
            Op::Call => {
                let target = self.vm.regs.pc.wrapping_add(inst.operand(0));
                let params = self.take_call_frame(inst.operand(1))?;
                let frame = Frame {
                    script: self.vm.regs.script,
                    pc: target,
                    object: self.vm.regs.object,
                    params,
                };
                return self.do_call(frame);
            }
            Op::Callb => {
                let pc = self.vm.script_ptr(0)?.export_code(inst.operand(0))?;
                let params = self.take_call_frame(inst.operand(1))?;
                let frame = Frame {
                    script: 0,
                    pc,
                    object: self.vm.regs.object,
                    params,
                };
                return self.do_call(frame);
            }
            Op::Calle => {
                let script = inst.operand(0);
                let pc = self.vm.script_ptr(script)?.export_code(inst.operand(1))?;
                let params = self.take_call_frame(inst.operand(2))?;
                let frame = Frame {
                    script,
                    pc,
                    object: self.vm.regs.object,
                    params,
                };
                return self.do_call(frame);
            }
            Op::Callk => return self.do_kernel_call(inst.operand(0), inst.operand(1)),
            Op::Ret => return Ok(ExecutionResult::Returned),
            op => unreachable!("{} routed to the stack module", op.name()),
        }
        Ok(ExecutionResult::Continue)
    }

    /// Locate the argument block of a call, folding pending `&rest` words
    /// into its argc. Returns the address of the argc word.
    pub(crate) fn take_call_frame(&mut self, frame_bytes: u16) -> VmResult<u16> {
        let rest = std::mem::take(&mut self.vm.regs.rest);
        let params = self.vm.stack.frame_base(frame_bytes / 2 + 1 + rest)?;
        if rest > 0 {
            let argc = self.vm.heap.read_word(params);
            self.vm.heap.write_word(params, argc.wrapping_add(rest));
        }
        Ok(params)
    }

    fn do_call(&mut self, frame: Frame) -> VmResult<ExecutionResult> {
        let result = self.invoke(frame);
        self.vm.stack.unwind_to(frame.params);
        result.map(|_| ExecutionResult::Called)
    }

    fn do_kernel_call(&mut self, ordinal: u16, frame_bytes: u16) -> VmResult<ExecutionResult> {
        let kernel = self.kernels.get(ordinal)?;
        let params = self.take_call_frame(frame_bytes)?;
        let argc = self.vm.heap.read_word(params);
        let args: Vec<u16> = (0..=argc)
            .map(|i| self.vm.heap.read_word(params.wrapping_add(i.wrapping_mul(2))))
            .collect();
        trace!(
            "callk {} {:?}",
            kernel_name(ordinal).map_or_else(|| ordinal.to_string(), str::to_string),
            &args[1..]
        );
        self.vm.stack.unwind_to(params);
        kernel(&mut self.vm, &args)?;
        Ok(ExecutionResult::Continue)
    }

    /// `&rest n`: push the current frame's params n..=argc
    fn do_rest(&mut self, first: u16) -> VmResult<()> {
        let argc = self.vm.argc();
        let mut pushed = 0;
        for i in first.max(1)..=argc {
            let value = self.vm.heap.read_word(self.vm.regs.params.wrapping_add(i.wrapping_mul(2)));
            self.vm.push(value)?;
            pushed += 1;
        }
        self.vm.regs.rest += pushed;
        Ok(())
    }
}
