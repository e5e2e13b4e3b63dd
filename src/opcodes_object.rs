/// Object operations for the script interpreter
///
/// This module handles message sends (`send`, `self`, `super`) and the small
/// object opcodes (`class`, `selfID`, `pushSelf`).
///
/// A send's `frame` operand is the byte length of its message bundle on the
/// stack: one or more groups of (selector, argc, args...). Words pushed by
/// `&rest` follow the bundle and belong to the last group. A selector naming
/// a property reads it (argc 0) or writes the first argument; anything else
/// is looked up as a method, starting at the object or, for `super`, at the
/// named class.
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::interpreter::{ExecutionResult, Frame, Interpreter};
use crate::object::ObjectModel;
use crate::opcode_tables::Op;
use log::trace;

impl Interpreter {
    pub fn is_object_opcode(op: Op) -> bool {
        matches!(
            op,
            Op::Send | Op::SelfSend | Op::Super | Op::Class | Op::SelfId | Op::PushSelf
        )
    }

    pub fn execute_object_op(&mut self, inst: &Instruction) -> VmResult<ExecutionResult> {
        match inst.op {
            Op::Send => {
                let target = self.vm.regs.acc;
                self.send(target, inst.operand(0), None)?;
                Ok(ExecutionResult::Called)
            }
            Op::SelfSend => {
                let target = self.vm.regs.object;
                self.send(target, inst.operand(0), None)?;
                Ok(ExecutionResult::Called)
            }
            Op::Super => {
                let class = self.vm.get_class(inst.operand(0))?;
                let target = self.vm.regs.object;
                self.send(target, inst.operand(1), Some(class))?;
                Ok(ExecutionResult::Called)
            }
            Op::Class => {
                self.vm.regs.acc = self.vm.get_class(inst.operand(0))?;
                Ok(ExecutionResult::Continue)
            }
            Op::SelfId => {
                self.vm.regs.acc = self.vm.regs.object;
                Ok(ExecutionResult::Continue)
            }
            Op::PushSelf => {
                self.vm.push(self.vm.regs.object)?;
                Ok(ExecutionResult::Continue)
            }
            op => unreachable!("{} routed to the object module", op.name()),
        }
    }

    /// Deliver every message of the bundle on top of the stack, then pop it.
    pub(crate) fn send(
        &mut self,
        target: u16,
        frame_bytes: u16,
        method_start: Option<u16>,
    ) -> VmResult<()> {
        let rest = std::mem::take(&mut self.vm.regs.rest);
        let base = self.vm.stack.frame_base(frame_bytes / 2 + rest)?;
        let top = self.vm.stack.sp;
        let bundle_end = base + frame_bytes;

        let mut groups = Vec::new();
        let mut at = base;
        while at < bundle_end {
            let argc_addr = at + 2;
            if argc_addr >= bundle_end {
                return Err(VmError::StackBlown);
            }
            groups.push(argc_addr);
            at = argc_addr
                .wrapping_add(2)
                .wrapping_add(self.vm.heap.read_word(argc_addr).wrapping_mul(2));
        }
        if at != bundle_end {
            return Err(VmError::StackBlown);
        }
        if rest > 0 {
            match groups.last() {
                Some(&argc_addr) => {
                    let argc = self.vm.heap.read_word(argc_addr);
                    self.vm.heap.write_word(argc_addr, argc.wrapping_add(rest));
                }
                None => return Err(VmError::StackBlown),
            }
        }

        let result = groups.into_iter().try_for_each(|argc_addr| {
            let selector = self.vm.heap.read_word(argc_addr - 2);
            let result = self.dispatch(target, selector, argc_addr, method_start);
            self.vm.stack.unwind_to(top);
            result
        });
        self.vm.stack.unwind_to(base);
        result
    }

    /// Deliver one message: property access or method invocation
    fn dispatch(
        &mut self,
        obj: u16,
        selector: u16,
        params: u16,
        method_start: Option<u16>,
    ) -> VmResult<()> {
        if !self.vm.is_object(obj) {
            return Err(VmError::NotAnObject(obj));
        }
        let argc = self.vm.heap.read_word(params);
        if let Some(index) = self.vm.prop_index(obj, selector)? {
            let addr = obj + index * 2;
            if argc == 0 {
                self.vm.regs.acc = self.vm.heap.read_word(addr);
            } else {
                let value = self.vm.heap.read_word(params + 2);
                self.vm.heap.write_word(addr, value);
            }
            trace!(
                "{} {} {}",
                self.vm.object_name(obj),
                if argc == 0 { "read" } else { "write" },
                self.vm.selector_name(selector)
            );
            return Ok(());
        }

        let start = method_start.unwrap_or(obj);
        match self.vm.find_method(start, selector)? {
            Some(method) => {
                trace!(
                    "send {}::{} ({argc} args) to {}",
                    self.vm.object_name(method.owner),
                    self.vm.selector_name(selector),
                    self.vm.object_name(obj)
                );
                self.invoke(Frame {
                    script: method.script,
                    pc: method.offset,
                    object: obj,
                    params,
                })
            }
            None => Err(VmError::BadSelector {
                object: obj,
                selector,
            }),
        }
    }
}
