use crate::class_table::ClassTable;
use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::opcode_tables::VarSpace;
use crate::resource::{ResourceCache, ResourceHandle, ResourceType};
use crate::sci_rand::SciRand;
use crate::script::Script;
use crate::stack::Stack;
use crate::ticker::TickCounter;
use crate::vocab::{self, SelectorNames};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Interpreter registers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    /// Accumulator
    pub acc: u16,
    /// Accumulator before the last comparison
    pub prev: u16,
    /// Offset of the next instruction in the current script's code
    pub pc: u16,
    /// Script whose code is executing
    pub script: u16,
    /// Current object (`self`)
    pub object: u16,
    /// Address of the argc word of the current frame; params are 1-based above it
    pub params: u16,
    /// First temporary of the current frame
    pub temps: u16,
    /// Locals of the script owning the executing code
    pub locals: u16,
    pub num_locals: u16,
    /// Words pushed by `&rest` for the next call or send
    pub rest: u16,
}

/// The interpreter's world: heap, stack, registers and every resident script
pub struct VM {
    pub config: VmConfig,
    pub heap: Heap,
    pub stack: Stack,
    pub regs: Registers,
    /// Code of the executing script
    pub code: ResourceHandle,
    /// Active-script registry
    pub scripts: BTreeMap<u16, Script>,
    pub classes: ClassTable,
    pub resources: Box<dyn ResourceCache>,
    pub selectors: SelectorNames,
    /// Script 0's locals
    pub globals: u16,
    pub num_globals: u16,
    pub rng: SciRand,
    pub ticks: TickCounter,
}

impl VM {
    /// Create a VM over a resource cache, reading the class table and the
    /// selector names when the vocabularies exist.
    pub fn new(config: VmConfig, mut resources: Box<dyn ResourceCache>) -> VmResult<Self> {
        let mut heap = Heap::new(config.heap_size);
        let stack = Stack::new(&mut heap, config.stack_size)?;

        let classes = match resources.load(ResourceType::Vocab, vocab::CLASS_VOCAB) {
            Ok(data) => ClassTable::from_scripts(&vocab::parse_class_vocab(&data)?),
            Err(e) if !e.is_fatal() => {
                warn!("no class vocabulary ({e}), classes register as scripts load");
                ClassTable::new()
            }
            Err(e) => return Err(e),
        };
        let selectors = match resources.load(ResourceType::Vocab, vocab::SELECTOR_VOCAB) {
            Ok(data) => SelectorNames::parse(&data)?,
            Err(e) if !e.is_fatal() => {
                debug!("no selector names ({e})");
                SelectorNames::default()
            }
            Err(e) => return Err(e),
        };
        debug!(
            "vm: heap {} bytes, stack {:04x}..{:04x}, {} classes, {} selectors",
            heap.size(),
            stack.base(),
            stack.limit(),
            classes.len(),
            selectors.len()
        );

        let rng = SciRand::from_seed(config.random_seed);
        Ok(VM {
            config,
            heap,
            stack,
            regs: Registers::default(),
            code: Rc::from(Vec::new()),
            scripts: BTreeMap::new(),
            classes,
            resources,
            selectors,
            globals: 0,
            num_globals: 0,
            rng,
            ticks: TickCounter::new(),
        })
    }

    /// Tear every script down and start over with an empty heap
    pub fn restart(&mut self) -> VmResult<()> {
        self.scripts.clear();
        self.classes.reset();
        self.resources.unload(ResourceType::Script, None);
        self.heap = Heap::new(self.config.heap_size);
        self.stack = Stack::new(&mut self.heap, self.config.stack_size)?;
        self.regs = Registers::default();
        self.code = Rc::from(Vec::new());
        self.globals = 0;
        self.num_globals = 0;
        debug!("vm: restarted");
        Ok(())
    }

    pub fn script(&self, number: u16) -> VmResult<&Script> {
        self.scripts
            .get(&number)
            .ok_or_else(|| VmError::LoaderMismatch(format!("script {number} is not loaded")))
    }

    pub fn is_loaded(&self, number: u16) -> bool {
        self.scripts.contains_key(&number)
    }

    pub fn push(&mut self, value: u16) -> VmResult<()> {
        self.stack.push(&mut self.heap, value)
    }

    pub fn pop(&mut self) -> VmResult<u16> {
        self.stack.pop(&self.heap)
    }

    pub fn peek(&self) -> VmResult<u16> {
        self.stack.peek(&self.heap)
    }

    /// Heap address of a variable
    pub fn var_addr(&self, space: VarSpace, index: u16) -> VmResult<u16> {
        let bad = || VmError::BadVariable {
            space: space.name(),
            index,
        };
        let addr = match space {
            VarSpace::Global => {
                if index >= self.num_globals {
                    return Err(bad());
                }
                self.globals + index * 2
            }
            VarSpace::Local => {
                if index >= self.regs.num_locals {
                    return Err(bad());
                }
                self.regs.locals + index * 2
            }
            VarSpace::Temp => {
                if self.regs.temps == 0 {
                    return Err(bad());
                }
                self.regs.temps.wrapping_add(index.wrapping_mul(2))
            }
            VarSpace::Param => {
                if self.regs.params == 0 {
                    return Err(bad());
                }
                self.regs.params.wrapping_add(index.wrapping_mul(2))
            }
        };
        if matches!(space, VarSpace::Temp | VarSpace::Param)
            && (addr < self.stack.base() || addr.saturating_add(2) > self.stack.limit())
        {
            return Err(bad());
        }
        Ok(addr)
    }

    pub fn read_var(&self, space: VarSpace, index: u16) -> VmResult<u16> {
        Ok(self.heap.read_word(self.var_addr(space, index)?))
    }

    pub fn write_var(&mut self, space: VarSpace, index: u16, value: u16) -> VmResult<()> {
        let addr = self.var_addr(space, index)?;
        self.heap.write_word(addr, value);
        Ok(())
    }

    /// Number of arguments of the current frame
    pub fn argc(&self) -> u16 {
        if self.regs.params == 0 {
            0
        } else {
            self.heap.read_word(self.regs.params)
        }
    }

    /// Describe a selector, using vocab names when available
    pub fn selector_name(&self, selector: u16) -> String {
        self.selectors.describe(selector)
    }
}

impl fmt::Debug for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VM")
            .field("regs", &self.regs)
            .field("sp", &self.stack.sp)
            .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
            .field("globals", &self.globals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{MemorySource, ResourceManager};

    fn empty_vm() -> VM {
        let rm = ResourceManager::new(Box::new(MemorySource::new()), 4096);
        VM::new(VmConfig::default(), Box::new(rm)).unwrap()
    }

    #[test]
    fn starts_without_vocabularies() {
        let vm = empty_vm();
        assert!(vm.classes.is_empty());
        assert!(vm.selectors.is_empty());
        assert_eq!(vm.stack.depth(), 0);
    }

    #[test]
    fn variable_spaces_are_bounds_checked() {
        let mut vm = empty_vm();
        assert!(vm.read_var(VarSpace::Global, 0).is_err());
        assert!(vm.read_var(VarSpace::Temp, 0).is_err());

        vm.globals = vm.heap.alloc(8).unwrap();
        vm.num_globals = 4;
        vm.write_var(VarSpace::Global, 3, 99).unwrap();
        assert_eq!(vm.read_var(VarSpace::Global, 3).unwrap(), 99);
        assert_eq!(
            vm.read_var(VarSpace::Global, 4),
            Err(VmError::BadVariable {
                space: "global",
                index: 4
            })
        );

        vm.push(2).unwrap();
        vm.push(10).unwrap();
        vm.push(20).unwrap();
        vm.regs.params = vm.stack.base();
        assert_eq!(vm.argc(), 2);
        assert_eq!(vm.read_var(VarSpace::Param, 2).unwrap(), 20);
    }
}
