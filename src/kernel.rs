/// Kernel call table
///
/// `callk n, frame` calls slot `n` with the argument block on the stack:
/// `args[0]` is the argument count, the arguments follow. A kernel leaves its
/// result in the accumulator. Only the kernels the interpreter core itself
/// needs are built in; graphics, sound, parser and the rest are registered by
/// the embedder, by ordinal or by name.
use crate::error::{VmError, VmResult};
use crate::object::ObjectModel;
use crate::resource::ResourceType;
use crate::vm::VM;
use log::{debug, warn};
use std::collections::HashMap;

pub type KernelFn = fn(&mut VM, &[u16]) -> VmResult<()>;

pub const KERNEL_NAMES: [&str; 16] = [
    "Load",
    "UnLoad",
    "ScriptID",
    "DisposeScript",
    "Clone",
    "DisposeClone",
    "IsObject",
    "RespondsTo",
    "Lock",
    "Random",
    "Abs",
    "GetTime",
    "StrCmp",
    "StrLen",
    "StrCpy",
    "StrAt",
];

lazy_static! {
    pub static ref KERNEL_ORDINALS: HashMap<&'static str, u16> = KERNEL_NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| (name, i as u16))
        .collect();
}

pub fn kernel_name(ordinal: u16) -> Option<&'static str> {
    KERNEL_NAMES.get(ordinal as usize).copied()
}

pub struct KernelTable {
    entries: Vec<Option<KernelFn>>,
}

impl KernelTable {
    /// An empty table with `size` slots
    pub fn new(size: usize) -> Self {
        KernelTable {
            entries: vec![None; size],
        }
    }

    /// A table with the core kernels installed
    pub fn with_core(size: usize) -> Self {
        let mut table = KernelTable::new(size.max(KERNEL_NAMES.len()));
        let core: [KernelFn; 16] = [
            k_load,
            k_unload,
            k_script_id,
            k_dispose_script,
            k_clone,
            k_dispose_clone,
            k_is_object,
            k_responds_to,
            k_lock,
            k_random,
            k_abs,
            k_get_time,
            k_str_cmp,
            k_str_len,
            k_str_cpy,
            k_str_at,
        ];
        for (ordinal, f) in core.into_iter().enumerate() {
            table.entries[ordinal] = Some(f);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(&mut self, ordinal: u16, f: KernelFn) -> VmResult<()> {
        let slot = self
            .entries
            .get_mut(ordinal as usize)
            .ok_or(VmError::KernelOutOfRange(ordinal))?;
        *slot = Some(f);
        Ok(())
    }

    pub fn register_named(&mut self, name: &str, f: KernelFn) -> VmResult<()> {
        let ordinal = KERNEL_ORDINALS
            .get(name)
            .copied()
            .ok_or_else(|| VmError::Config(format!("unknown kernel function {name}")))?;
        self.register(ordinal, f)
    }

    pub fn get(&self, ordinal: u16) -> VmResult<KernelFn> {
        match self.entries.get(ordinal as usize) {
            None => Err(VmError::KernelOutOfRange(ordinal)),
            Some(None) => Err(VmError::KernelNotImplemented(ordinal)),
            Some(Some(f)) => Ok(*f),
        }
    }
}

fn arg(args: &[u16], n: usize) -> u16 {
    args.get(n).copied().unwrap_or(0)
}

fn argc(args: &[u16]) -> u16 {
    arg(args, 0)
}

fn resource_type(value: u16) -> VmResult<ResourceType> {
    ResourceType::from_u16(value)
        .ok_or_else(|| VmError::LoaderMismatch(format!("bad resource type {value}")))
}

pub fn k_load(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let kind = resource_type(arg(args, 1))?;
    let number = arg(args, 2);
    vm.regs.acc = match vm.resources.load(kind, number) {
        Ok(_) => number,
        Err(e) if !e.is_fatal() => {
            warn!("Load: {e}");
            0
        }
        Err(e) => return Err(e),
    };
    Ok(())
}

pub fn k_unload(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let kind = resource_type(arg(args, 1))?;
    vm.resources.unload(kind, Some(arg(args, 2)));
    Ok(())
}

pub fn k_lock(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let kind = resource_type(arg(args, 1))?;
    let locked = argc(args) < 3 || arg(args, 3) != 0;
    vm.resources.lock(kind, arg(args, 2), locked);
    Ok(())
}

/// ScriptID(script [, export]): the export's value, loading the script
pub fn k_script_id(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let number = arg(args, 1);
    let index = if argc(args) >= 2 { arg(args, 2) } else { 0 };
    let export = match vm.script_ptr(number) {
        Ok(script) => script.export(index)?,
        Err(e) if !e.is_fatal() => {
            warn!("ScriptID: {e}");
            vm.regs.acc = 0;
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    vm.regs.acc = export.value();
    Ok(())
}

pub fn k_dispose_script(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.dispose_script(arg(args, 1))
}

pub fn k_clone(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.regs.acc = vm.clone_object(arg(args, 1))?;
    Ok(())
}

pub fn k_dispose_clone(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.dispose_clone(arg(args, 1))?;
    Ok(())
}

pub fn k_is_object(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.regs.acc = vm.is_object(arg(args, 1)) as u16;
    Ok(())
}

pub fn k_responds_to(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let obj = arg(args, 1);
    vm.regs.acc = (vm.is_object(obj) && vm.responds_to(obj, arg(args, 2))?) as u16;
    Ok(())
}

pub fn k_random(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.regs.acc = vm.rng.range(arg(args, 1), arg(args, 2));
    Ok(())
}

pub fn k_abs(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.regs.acc = (arg(args, 1) as i16).wrapping_abs() as u16;
    Ok(())
}

pub fn k_get_time(vm: &mut VM, _args: &[u16]) -> VmResult<()> {
    vm.regs.acc = vm.ticks.ticks() as u16;
    Ok(())
}

fn string_bytes(vm: &VM, addr: u16, limit: Option<usize>) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut at = addr;
    while limit.map_or(true, |n| bytes.len() < n) {
        let b = vm.heap.read_byte(at);
        if b == 0 || at as usize >= vm.heap.size() {
            break;
        }
        bytes.push(b);
        at = at.wrapping_add(1);
    }
    bytes
}

/// StrCmp(a, b [, n]): negative, zero or positive like strcmp
pub fn k_str_cmp(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let limit = (argc(args) >= 3).then(|| arg(args, 3) as usize);
    let a = string_bytes(vm, arg(args, 1), limit);
    let b = string_bytes(vm, arg(args, 2), limit);
    let mut result = 0i16;
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0) as i16;
        let y = b.get(i).copied().unwrap_or(0) as i16;
        if x != y {
            result = x - y;
            break;
        }
    }
    vm.regs.acc = result as u16;
    Ok(())
}

pub fn k_str_len(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    vm.regs.acc = string_bytes(vm, arg(args, 1), None).len() as u16;
    Ok(())
}

/// StrCpy(dest, src [, n]): copy at most n characters and terminate
pub fn k_str_cpy(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let dest = arg(args, 1);
    let limit = (argc(args) >= 3).then(|| arg(args, 3) as i16);
    let mut bytes = string_bytes(vm, arg(args, 2), None);
    if let Some(n) = limit {
        if n > 0 {
            bytes.truncate(n as usize - 1);
        }
    }
    vm.heap.write_string(dest, &bytes);
    debug!("StrCpy {} bytes to {dest:04x}", bytes.len());
    vm.regs.acc = dest;
    Ok(())
}

/// StrAt(str, index [, new]): read a character, optionally replacing it
pub fn k_str_at(vm: &mut VM, args: &[u16]) -> VmResult<()> {
    let addr = arg(args, 1).wrapping_add(arg(args, 2));
    vm.regs.acc = vm.heap.read_byte(addr) as u16;
    if argc(args) >= 3 {
        vm.heap.write_byte(addr, arg(args, 3) as u8);
    }
    Ok(())
}
