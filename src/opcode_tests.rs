use crate::error::VmError;
use crate::opcode_tables::{AccessOp, Op, VarSpace};
use crate::test_utils::{run_procedure, Asm};
use test_log::test;

use AccessOp::{Dec, Inc, Load, Store};
use VarSpace::{Global, Local, Param, Temp};

fn run(code: Asm, args: &[u16]) -> Result<u16, VmError> {
    let (interp, result) = run_procedure(&code.finish(), args);
    assert_eq!(interp.vm.stack.depth(), 0, "stack not balanced");
    result
}

#[test]
fn test_binary_operators_take_left_from_stack() {
    let sub = Asm::new().pushi(10).ldi(3).op(Op::Sub, &[]).ret();
    assert_eq!(run(sub, &[]), Ok(7));

    let div = Asm::new().pushi(0xFFF7).ldi(2).op(Op::Div, &[]).ret();
    assert_eq!(run(div, &[]), Ok((-4i16) as u16));

    let shl = Asm::new().pushi(3).ldi(4).op(Op::Shl, &[]).ret();
    assert_eq!(run(shl, &[]), Ok(48));
}

#[test]
fn test_unary_operators() {
    let neg = Asm::new().ldi(5).op(Op::Neg, &[]).ret();
    assert_eq!(run(neg, &[]), Ok(0xFFFB));
    let not = Asm::new().ldi(0).op(Op::Not, &[]).ret();
    assert_eq!(run(not, &[]), Ok(1));
    let bnot = Asm::new().ldi(0).op(Op::Bnot, &[]).ret();
    assert_eq!(run(bnot, &[]), Ok(0xFFFF));
}

#[test]
fn test_division_by_zero_is_fatal() {
    let div = Asm::new().pushi(5).ldi(0).op(Op::Div, &[]).ret();
    let (_, result) = run_procedure(&div.finish(), &[]);
    assert_eq!(result, Err(VmError::ZeroDivide));
    assert!(VmError::ZeroDivide.is_fatal());

    let rem = Asm::new().pushi(5).ldi(0).op(Op::Mod, &[]).ret();
    let (_, result) = run_procedure(&rem.finish(), &[]);
    assert_eq!(result, Err(VmError::ZeroModulo));
}

#[test]
fn test_pprev_chains_a_range_check() {
    // 3 < param1 < 8
    let code = Asm::new()
        .pushi(3)
        .access(Load, Param, 1, false, false)
        .op(Op::Lt, &[])
        .op(Op::Bnt, &[4])
        .op(Op::Pprev, &[])
        .ldi(8)
        .op(Op::Lt, &[])
        .ret();
    assert_eq!(run(code.clone(), &[5]), Ok(1));
    assert_eq!(run(code.clone(), &[2]), Ok(0));
    assert_eq!(run(code, &[9]), Ok(0));
}

#[test]
fn test_branch_on_parameter() {
    let code = Asm::new()
        .access(Load, Param, 1, false, false)
        .op(Op::Bnt, &[3])
        .ldi(10)
        .ret()
        .ldi(20)
        .ret();
    assert_eq!(run(code.clone(), &[1]), Ok(10));
    assert_eq!(run(code, &[0]), Ok(20));
}

#[test]
fn test_backward_jump_counts_down() {
    // g0 = 3; loop { g0--; if g0 == 0 break }; return 99
    let body = Asm::new()
        .access(Dec, Global, 0, false, false)
        .op(Op::Bt, &[0xFFFC]); // back to the decrement
    assert_eq!(body.len(), 4);
    let code = Asm::new()
        .ldi(3)
        .access(Store, Global, 0, false, false)
        .append(&body)
        .ldi(99)
        .ret();
    assert_eq!(run(code, &[]), Ok(99));
}

#[test]
fn test_byte_immediate_before_unsigned_compare() {
    let flag = Asm::new()
        .pushi(0x100)
        .op_byte(Op::Ldi, &[0x80])
        .op(Op::Ugt, &[])
        .ret();
    assert_eq!(run(flag, &[]), Ok(1));

    let negative = Asm::new()
        .pushi(0x100)
        .op_byte(Op::Ldi, &[0xF0])
        .op(Op::Ugt, &[])
        .ret();
    assert_eq!(run(negative, &[]), Ok(0));

    // only the instruction right after the load sees the byte
    let interrupted = Asm::new()
        .pushi(0x100)
        .op_byte(Op::Ldi, &[0x80])
        .push()
        .op(Op::Toss, &[])
        .op(Op::Ugt, &[])
        .ret();
    assert_eq!(run(interrupted, &[]), Ok(0));

    // a word-form load is taken as it is
    let word = Asm::new()
        .pushi(0x100)
        .op_word(Op::Ldi, &[0xFF80])
        .op(Op::Ugt, &[])
        .ret();
    assert_eq!(run(word, &[]), Ok(0));
}

#[test]
fn test_global_access_forms() {
    let code = Asm::new()
        .pushi(4)
        .access(Store, Global, 1, true, false) // ssg 1
        .access(Load, Global, 1, true, false) // lsg 1
        .access(Inc, Global, 1, false, false) // +ag 1
        .op(Op::Add, &[])
        .ret();
    assert_eq!(run(code, &[]), Ok(9));
}

#[test]
fn test_indexed_access_uses_the_accumulator() {
    let code = Asm::new()
        .pushi(11)
        .ldi(3)
        .access(Store, Global, 1, false, true) // sagi 1: g[4] = 11
        .ldi(0)
        .ldi(3)
        .access(Load, Global, 1, false, true) // lagi 1
        .ret();
    assert_eq!(run(code, &[]), Ok(11));
}

#[test]
fn test_decrement_wraps() {
    let code = Asm::new()
        .ldi(0)
        .access(Store, Global, 2, false, false)
        .access(Dec, Global, 2, false, false)
        .ret();
    assert_eq!(run(code, &[]), Ok(0xFFFF));
}

#[test]
fn test_global_out_of_range() {
    let code = Asm::new().access(Load, Global, 8, false, false).ret();
    let (_, result) = run_procedure(&code.finish(), &[]);
    assert_eq!(
        result,
        Err(VmError::BadVariable {
            space: "global",
            index: 8
        })
    );
}

#[test]
fn test_temporaries_after_link() {
    let code = Asm::new()
        .op(Op::Link, &[2])
        .ldi(5)
        .access(Store, Temp, 0, false, false)
        .ldi(7)
        .access(Store, Temp, 1, false, false)
        .access(Load, Temp, 0, true, false)
        .access(Load, Temp, 1, false, false)
        .op(Op::Add, &[])
        .ret();
    assert_eq!(run(code, &[]), Ok(12));
}

#[test]
fn test_argc_is_param_zero() {
    let code = Asm::new().access(Load, Param, 0, false, false).ret();
    assert_eq!(run(code.clone(), &[4, 5, 6]), Ok(3));
    assert_eq!(run(code, &[]), Ok(0));
}

#[test]
fn test_script_zero_locals_are_the_globals() {
    let code = Asm::new()
        .ldi(9)
        .access(Store, Local, 3, false, false)
        .ldi(0)
        .access(Load, Global, 3, false, false)
        .ret();
    assert_eq!(run(code, &[]), Ok(9));
}

#[test]
fn test_lea_takes_variable_addresses() {
    let plain = Asm::new().op(Op::Lea, &[0, 2]).ret();
    let (interp, result) = run_procedure(&plain.finish(), &[]);
    assert_eq!(result, Ok(interp.vm.globals + 4));

    let indexed = Asm::new().ldi(1).op(Op::Lea, &[0x10, 2]).ret();
    let (interp, result) = run_procedure(&indexed.finish(), &[]);
    assert_eq!(result, Ok(interp.vm.globals + 6));

    // type 2 is the locals, which are the globals in script 0
    let local = Asm::new().op(Op::Lea, &[2, 0]).ret();
    let (interp, result) = run_procedure(&local.finish(), &[]);
    assert_eq!(result, Ok(interp.vm.globals));
}

#[test]
fn test_push_constants_and_dup() {
    let code = Asm::new()
        .op(Op::Push0, &[])
        .op(Op::Toss, &[])
        .op(Op::Push2, &[])
        .op(Op::Dup, &[])
        .ldi(0)
        .op(Op::Add, &[])
        .op(Op::Add, &[])
        .op(Op::Push1, &[])
        .op(Op::Add, &[])
        .ret();
    assert_eq!(run(code, &[]), Ok(5));
}

#[test]
fn test_undefined_opcode() {
    let (interp, result) = run_procedure(&[0x4C, 0x48], &[]);
    assert_eq!(
        result,
        Err(VmError::BadOpcode {
            opcode: 0x4C,
            script: 0,
            pc: 4
        })
    );
    assert_eq!(interp.vm.stack.depth(), 0);
}

#[test]
fn test_pop_from_empty_stack() {
    let code = Asm::new().op(Op::Toss, &[]).ret();
    let (_, result) = run_procedure(&code.finish(), &[]);
    // the argument block sits below, so the first pop still succeeds
    assert_eq!(result, Ok(0));

    let code = Asm::new().op(Op::Toss, &[]).op(Op::Toss, &[]).ret();
    let (_, result) = run_procedure(&code.finish(), &[]);
    assert_eq!(result, Err(VmError::StackBlown));
}
