//! Operand visitor.
//!
//! The register allocator needs every register an instruction reads, clobbers and
//! writes. [`OpVisitState::visit`] collects them by role. Memory addresses contribute
//! their base and index registers as inputs in every position, temp and result
//! included, since the instruction reads them to form the address. Constants and stack
//! slots are skipped.

use super::instruction::{BranchTarget, Instruction, Payload};
use super::operand::{Operand, Register};

/// Role of an operand within an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandMode {
    Input,
    Temp,
    Output,
}

/// Registers of one instruction grouped by role.
#[derive(Debug, Default, Clone)]
pub struct OpVisitState {
    inputs: Vec<Register>,
    temps: Vec<Register>,
    outputs: Vec<Register>,
    has_call: bool,
    has_info: bool,
}

impl OpVisitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the operands of `inst`, replacing any previous contents.
    pub fn visit(&mut self, inst: &Instruction) {
        self.inputs.clear();
        self.temps.clear();
        self.outputs.clear();
        self.has_call = inst.opcode().is_call();
        self.has_info = inst.info().is_some();

        for opr in inst.inputs() {
            self.append(opr, OperandMode::Input);
        }
        match inst.payload() {
            Payload::Call { args, .. } => {
                for arg in args {
                    self.append(arg, OperandMode::Input);
                }
            }
            Payload::Branch { target: BranchTarget::Stub(stub), .. } => {
                for opr in &stub.inputs {
                    self.append(opr, OperandMode::Input);
                }
            }
            _ => {}
        }
        for opr in inst.temps() {
            self.append(opr, OperandMode::Temp);
        }
        self.append(&inst.result(), OperandMode::Output);
    }

    fn append(&mut self, opr: &Operand, mode: OperandMode) {
        match opr {
            Operand::Register(reg) => self.list_mut(mode).push(*reg),
            Operand::Address(addr) => {
                self.inputs.push(addr.base());
                if let Some(index) = addr.index() {
                    self.inputs.push(index);
                }
            }
            Operand::Illegal | Operand::Constant(_) | Operand::Stack(_) => {}
        }
    }

    fn list_mut(&mut self, mode: OperandMode) -> &mut Vec<Register> {
        match mode {
            OperandMode::Input => &mut self.inputs,
            OperandMode::Temp => &mut self.temps,
            OperandMode::Output => &mut self.outputs,
        }
    }

    pub fn registers(&self, mode: OperandMode) -> &[Register] {
        match mode {
            OperandMode::Input => &self.inputs,
            OperandMode::Temp => &self.temps,
            OperandMode::Output => &self.outputs,
        }
    }

    pub fn opr_count(&self, mode: OperandMode) -> usize {
        self.registers(mode).len()
    }

    pub fn opr_at(&self, mode: OperandMode, index: usize) -> Option<Register> {
        self.registers(mode).get(index).copied()
    }

    /// Whether the instruction clobbers caller-saved registers.
    pub fn has_call(&self) -> bool {
        self.has_call
    }

    /// Whether the instruction records debug state.
    pub fn has_info(&self) -> bool {
        self.has_info
    }
}

fn visit_operand_mut(opr: &mut Operand, mode: OperandMode, f: &mut impl FnMut(OperandMode, &mut Register)) {
    match opr {
        Operand::Register(reg) => f(mode, reg),
        Operand::Address(addr) => {
            f(OperandMode::Input, addr.base_mut());
            if let Some(index) = addr.index_mut() {
                f(OperandMode::Input, index);
            }
        }
        Operand::Illegal | Operand::Constant(_) | Operand::Stack(_) => {}
    }
}

impl Instruction {
    /// Visit every register of this instruction mutably, in the same order and with the
    /// same roles as [`OpVisitState::visit`].
    pub fn for_each_register_mut(&mut self, mut f: impl FnMut(OperandMode, &mut Register)) {
        let n = self.n_inputs as usize;
        for opr in &mut self.inputs[..n] {
            visit_operand_mut(opr, OperandMode::Input, &mut f);
        }
        match &mut self.payload {
            Payload::Call { args, .. } => {
                for arg in args {
                    visit_operand_mut(arg, OperandMode::Input, &mut f);
                }
            }
            Payload::Branch { target: BranchTarget::Stub(stub), .. } => {
                for opr in &mut stub.inputs {
                    visit_operand_mut(opr, OperandMode::Input, &mut f);
                }
            }
            _ => {}
        }
        for opr in &mut self.temps {
            visit_operand_mut(opr, OperandMode::Temp, &mut f);
        }
        visit_operand_mut(&mut self.result, OperandMode::Output, &mut f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::instruction::{CallTarget, Condition, CodeStub, Label, Opcode, StateRef, StubKind};
    use crate::lir::operand::{Address, OprType, RegId, Scale, VReg};

    fn reg(n: u32, ty: OprType) -> Register {
        Register::new_virtual(VReg(n), ty)
    }

    #[test]
    fn test_address_result_is_read_not_written() {
        let addr = Address::new(
            reg(40, OprType::Object).into(),
            reg(41, OprType::Int).into(),
            Scale::Times4,
            16,
            OprType::Int,
        )
        .unwrap();
        let store = Instruction::new(Opcode::Move, &[reg(42, OprType::Int).into()], addr.into());

        let mut state = OpVisitState::new();
        state.visit(&store);
        assert_eq!(state.registers(OperandMode::Input), &[reg(42, OprType::Int), reg(40, OprType::Object), reg(41, OprType::Int)]);
        assert_eq!(state.opr_count(OperandMode::Output), 0);
    }

    #[test]
    fn test_address_temp_is_read_as_input() {
        let addr = Address::base_disp(reg(100, OprType::Object), 8, OprType::Int).unwrap();
        let mut inst = Instruction::new(Opcode::Move, &[Operand::int_const(1)], reg(101, OprType::Int).into())
            .with_temps(&[addr.into(), reg(102, OprType::Int).into()]);

        let mut state = OpVisitState::new();
        state.visit(&inst);
        assert_eq!(state.registers(OperandMode::Input), &[reg(100, OprType::Object)]);
        assert_eq!(state.registers(OperandMode::Temp), &[reg(102, OprType::Int)]);
        assert_eq!(state.registers(OperandMode::Output), &[reg(101, OprType::Int)]);

        let mut seen = Vec::new();
        inst.for_each_register_mut(|mode, r| seen.push((mode, *r)));
        assert_eq!(
            seen,
            vec![
                (OperandMode::Input, reg(100, OprType::Object)),
                (OperandMode::Temp, reg(102, OprType::Int)),
                (OperandMode::Output, reg(101, OprType::Int)),
            ]
        );
    }

    #[test]
    fn test_constants_and_stack_slots_are_ignored() {
        let inst = Instruction::new(
            Opcode::Add,
            &[Operand::stack(2, OprType::Int), Operand::int_const(1)],
            reg(50, OprType::Int).into(),
        );
        let mut state = OpVisitState::new();
        state.visit(&inst);
        assert_eq!(state.opr_count(OperandMode::Input), 0);
        assert_eq!(state.opr_at(OperandMode::Output, 0), Some(reg(50, OprType::Int)));
    }

    #[test]
    fn test_call_arguments_and_info() {
        let call = Instruction::new(Opcode::StaticCall, &[], reg(60, OprType::Long).into())
            .with_payload(Payload::Call {
                target: CallTarget::Method(0x1000),
                args: vec![reg(61, OprType::Int).into(), Operand::int_const(3)],
            })
            .with_temps(&[reg(62, OprType::Int).into()])
            .with_info(Some(StateRef(7)));
        let mut state = OpVisitState::new();
        state.visit(&call);
        assert!(state.has_call());
        assert!(state.has_info());
        assert_eq!(state.registers(OperandMode::Input), &[reg(61, OprType::Int)]);
        assert_eq!(state.registers(OperandMode::Temp), &[reg(62, OprType::Int)]);
        assert_eq!(state.registers(OperandMode::Output), &[reg(60, OprType::Long)]);
    }

    #[test]
    fn test_stub_operands_are_inputs() {
        let branch = Instruction::op0(Opcode::Branch).with_payload(Payload::Branch {
            cond: Condition::NotEqual,
            target: BranchTarget::Stub(Box::new(CodeStub {
                kind: StubKind::SatbPreBarrier,
                inputs: vec![reg(70, OprType::Object).into()],
                continuation: Label(0),
            })),
        });
        let mut state = OpVisitState::new();
        state.visit(&branch);
        assert_eq!(state.registers(OperandMode::Input), &[reg(70, OprType::Object)]);
    }

    #[test]
    fn test_mutable_visit_matches_collection() {
        let addr = Address::base_disp(reg(40, OprType::Object), 8, OprType::Int).unwrap();
        let mut load = Instruction::new(Opcode::Move, &[addr.into()], reg(41, OprType::Int).into());

        let mut state = OpVisitState::new();
        state.visit(&load);
        let mut seen = Vec::new();
        load.for_each_register_mut(|mode, r| seen.push((mode, *r)));
        assert_eq!(
            seen,
            vec![(OperandMode::Input, reg(40, OprType::Object)), (OperandMode::Output, reg(41, OprType::Int))]
        );
        assert_eq!(state.opr_count(OperandMode::Input), 1);

        load.for_each_register_mut(|_, r| {
            if r.vreg() == Some(VReg(40)) {
                r.assign(RegId::Cpu(3)).unwrap();
            }
        });
        let rewritten = load.inputs()[0].as_address().unwrap();
        assert_eq!(rewritten.base().id(), RegId::Cpu(3));
    }
}
