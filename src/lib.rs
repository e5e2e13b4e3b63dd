#![crate_name = "scivm"]

#[macro_use]
extern crate lazy_static;

pub mod class_table;
pub mod config;
pub mod disassembler;
pub mod error;
pub mod heap;
pub mod instruction;
pub mod interpreter;
pub mod kernel;
pub mod loader;
pub mod object;
pub mod opcode_tables;
pub mod opcodes_math;
pub mod opcodes_memory;
pub mod opcodes_object;
pub mod opcodes_stack;
pub mod resource;
pub mod sci_rand;
pub mod script;
pub mod stack;
pub mod ticker;
pub mod vm;
pub mod vocab;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod opcode_tests;
