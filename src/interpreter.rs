use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::kernel::KernelTable;
use crate::opcode_tables::Op;
use crate::resource::ResourceCache;
use crate::script::Export;
use crate::ticker::Ticker;
use crate::vm::{Registers, VM};
use log::{debug, info, trace};

/// Result of executing an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Continue execution normally
    Continue,
    /// Branch taken, PC already updated
    Branched,
    /// A call or send ran to completion
    Called,
    /// `ret`: leave the current dispatch loop
    Returned,
}

/// Where a call or send enters code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub script: u16,
    pub pc: u16,
    /// `self` for the callee
    pub object: u16,
    /// Address of the argc word
    pub params: u16,
}

/// The script interpreter
pub struct Interpreter {
    /// The VM state
    pub vm: VM,
    pub kernels: KernelTable,
    /// Trace every instruction
    pub debug: bool,
    instruction_count: u64,
    instruction_limit: Option<u64>,
    /// Nesting of calls and sends
    depth: usize,
    /// Byte immediate loaded into the accumulator by the previous `ldi`
    pub(crate) last_byte_imm: Option<u8>,
    ticker: Option<Ticker>,
}

impl Interpreter {
    pub fn new(vm: VM) -> Self {
        let kernels = KernelTable::with_core(vm.config.kernel_table_size);
        let instruction_limit = vm.config.instruction_limit;
        Interpreter {
            vm,
            kernels,
            debug: false,
            instruction_count: 0,
            instruction_limit,
            depth: 0,
            last_byte_imm: None,
            ticker: None,
        }
    }

    /// Build a VM over `resources` and wrap it
    pub fn with_resources(
        config: VmConfig,
        resources: Box<dyn ResourceCache>,
    ) -> VmResult<Self> {
        Ok(Interpreter::new(VM::new(config, resources)?))
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn set_instruction_limit(&mut self, limit: Option<u64>) {
        self.instruction_limit = limit;
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Start the timer thread feeding GetTime
    pub fn start_ticker(&mut self) {
        if self.ticker.is_none() {
            let rate = self.vm.config.tick_rate_hz;
            self.ticker = Some(Ticker::start(self.vm.ticks.clone(), rate));
        }
    }

    pub fn stop_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    /// Send `play` to the game object (script 0, export 0)
    pub fn start_game(&mut self) -> VmResult<u16> {
        let game = match self.vm.script_ptr(0)?.export(0)? {
            Export::Heap(addr) => addr,
            _ => return Err(VmError::BadExport { script: 0, index: 0 }),
        };
        let play = self
            .vm
            .selectors
            .selector("play")
            .unwrap_or(self.vm.config.play_selector);
        info!("starting game object {game:04x} with selector {play}");
        self.send_message(game, play, &[])
    }

    /// Send one message from outside the interpreter; returns the accumulator.
    pub fn send_message(&mut self, obj: u16, selector: u16, args: &[u16]) -> VmResult<u16> {
        let sp = self.vm.stack.sp;
        let result = self.push_message(selector, args).and_then(|frame| {
            self.vm.regs.rest = 0;
            self.send(obj, frame, None)
        });
        self.vm.stack.unwind_to(sp);
        result.map(|_| self.vm.regs.acc)
    }

    fn push_message(&mut self, selector: u16, args: &[u16]) -> VmResult<u16> {
        self.vm.push(selector)?;
        self.vm.push(args.len() as u16)?;
        for &arg in args {
            self.vm.push(arg)?;
        }
        Ok((args.len() as u16 + 2) * 2)
    }

    /// Call a procedure exported by a script; returns the accumulator.
    pub fn call_export(&mut self, script: u16, index: u16, args: &[u16]) -> VmResult<u16> {
        let pc = self.vm.script_ptr(script)?.export_code(index)?;
        let sp = self.vm.stack.sp;
        let result = (|| {
            self.vm.push(args.len() as u16)?;
            for &arg in args {
                self.vm.push(arg)?;
            }
            self.invoke(Frame {
                script,
                pc,
                object: self.vm.regs.object,
                params: sp,
            })
        })();
        self.vm.stack.unwind_to(sp);
        result.map(|_| self.vm.regs.acc)
    }

    /// Run code in a fresh frame until its `ret`. Registers other than the
    /// accumulator and `prev` are restored afterwards.
    pub(crate) fn invoke(&mut self, frame: Frame) -> VmResult<()> {
        if self.depth >= self.vm.config.max_call_depth {
            return Err(VmError::StackBlown);
        }
        let (code, locals, num_locals) = {
            let script = self.vm.script(frame.script)?;
            (script.resource.clone(), script.locals, script.num_locals)
        };
        let saved = self.vm.regs;
        let saved_code = std::mem::replace(&mut self.vm.code, code);
        self.vm.regs = Registers {
            acc: saved.acc,
            prev: saved.prev,
            pc: frame.pc,
            script: frame.script,
            object: frame.object,
            params: frame.params,
            temps: self.vm.stack.sp,
            locals,
            num_locals,
            rest: 0,
        };
        trace!(
            "enter {}:{:04x} self {:04x} depth {}",
            frame.script,
            frame.pc,
            frame.object,
            self.depth + 1
        );

        self.depth += 1;
        self.last_byte_imm = None;
        let result = self.run_frame();
        self.depth -= 1;

        let (acc, prev) = (self.vm.regs.acc, self.vm.regs.prev);
        self.vm.regs = Registers { acc, prev, ..saved };
        self.vm.code = saved_code;
        self.last_byte_imm = None;
        result
    }

    /// The dispatch loop of one frame
    fn run_frame(&mut self) -> VmResult<()> {
        loop {
            if let Some(limit) = self.instruction_limit {
                if self.instruction_count >= limit {
                    return Err(VmError::InstructionLimit(limit));
                }
            }
            let pc = self.vm.regs.pc;
            let inst = Instruction::decode(&self.vm.code, pc as usize, self.vm.regs.script)?;
            if self.debug {
                debug!(
                    "{:03}:{:04x} {:<20} acc={:04x} sp={:04x}",
                    self.vm.regs.script, pc, inst, self.vm.regs.acc, self.vm.stack.sp
                );
            }
            self.vm.regs.pc = pc.wrapping_add(inst.size as u16);
            self.instruction_count += 1;

            let prior_imm = self.last_byte_imm.take();
            if self.execute_instruction(&inst, prior_imm)? == ExecutionResult::Returned {
                return Ok(());
            }
        }
    }

    pub(crate) fn execute_instruction(
        &mut self,
        inst: &Instruction,
        prior_imm: Option<u8>,
    ) -> VmResult<ExecutionResult> {
        match inst.op {
            Op::Access(access) => self.execute_access(access, inst.operand(0)),
            op if Self::is_math_opcode(op) => self.execute_math_op(inst, prior_imm),
            op if Self::is_memory_opcode(op) => self.execute_memory_op(inst),
            op if Self::is_object_opcode(op) => self.execute_object_op(inst),
            _ => self.execute_stack_op(inst),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
