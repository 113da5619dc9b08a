//! Linearizes IR into bytecode.
//!
//! The first pass sums the bytecode width of every instruction to find where
//! each label lands; labels emit nothing, so a label's position is the index
//! of the next real instruction. The second pass emits load-operands,
//! compute, store-result sequences. Temporaries become ordinary frame
//! variables named after themselves.

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::bytecode::{BytecodeGenerator, CompiledProgram, Constant, Instruction};
use crate::ir::{IrInstruction, IrProgram, Label, Operand, Temp};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Jump to undefined label {label}")]
    UndefinedLabel { label: String },
    #[error("Label {label} defined twice")]
    DuplicateLabel { label: String },
}

/// Number of bytecode instructions `instruction` expands to.
fn width(instruction: &IrInstruction) -> usize {
    match instruction {
        IrInstruction::Label(_) => 0,
        IrInstruction::Jump(_)
        | IrInstruction::DefineFunction(_)
        | IrInstruction::DefineClass(_) => 1,
        IrInstruction::Const { .. }
        | IrInstruction::Assign { .. }
        | IrInstruction::Print(_)
        | IrInstruction::JumpIfFalse { .. }
        | IrInstruction::Return(_) => 2,
        IrInstruction::LoadAttr { .. } | IrInstruction::StoreAttr { .. } => 3,
        IrInstruction::Binary { .. }
        | IrInstruction::Compare { .. }
        | IrInstruction::LoadIndex { .. }
        | IrInstruction::StoreIndex { .. } => 4,
        IrInstruction::BuildList { elements, .. } => elements.len() + 2,
        IrInstruction::Call { args, .. } => args.len() + 2,
        IrInstruction::CallMethod { args, .. } => args.len() + 3,
    }
}

fn label_positions(ir: &[IrInstruction]) -> Result<FxHashMap<Label, usize>, ConvertError> {
    let mut positions = FxHashMap::default();
    let mut position = 0;
    for instruction in ir {
        if let IrInstruction::Label(label) = instruction
            && positions.insert(*label, position).is_some()
        {
            return Err(ConvertError::DuplicateLabel {
                label: label.to_string(),
            });
        }
        position += width(instruction);
    }
    Ok(positions)
}

pub fn convert(ir: &[IrInstruction]) -> Result<Vec<Instruction>, ConvertError> {
    let positions = label_positions(ir)?;
    let resolve = |label: &Label| {
        positions
            .get(label)
            .copied()
            .ok_or_else(|| ConvertError::UndefinedLabel {
                label: label.to_string(),
            })
    };

    let mut code = Vec::with_capacity(ir.iter().map(width).sum());
    for instruction in ir {
        let before = code.len();
        match instruction {
            IrInstruction::Const { value, result } => {
                code.push(Instruction::LoadConst(*value));
                code.push(store_temp(*result));
            }
            IrInstruction::Assign { source, target } => {
                code.push(load(source));
                code.push(Instruction::StoreVar(target.slot()));
            }
            IrInstruction::Binary {
                op,
                left,
                right,
                result,
            } => {
                code.push(load(left));
                code.push(load(right));
                code.push(Instruction::arithmetic(*op));
                code.push(store_temp(*result));
            }
            IrInstruction::Compare {
                op,
                left,
                right,
                result,
            } => {
                code.push(load(left));
                code.push(load(right));
                code.push(Instruction::Compare(*op));
                code.push(store_temp(*result));
            }
            IrInstruction::Print(value) => {
                code.push(load(value));
                code.push(Instruction::Print);
            }
            IrInstruction::Label(label) => {
                debug_assert_eq!(positions.get(label), Some(&code.len()));
            }
            IrInstruction::Jump(label) => code.push(Instruction::Jump(resolve(label)?)),
            IrInstruction::JumpIfFalse { condition, target } => {
                code.push(load(condition));
                code.push(Instruction::JumpIfFalse(resolve(target)?));
            }
            IrInstruction::BuildList { elements, result } => {
                code.extend(elements.iter().map(load));
                code.push(Instruction::BuildList(elements.len()));
                code.push(store_temp(*result));
            }
            IrInstruction::LoadIndex {
                list,
                index,
                result,
            } => {
                code.push(Instruction::LoadVar(list.clone()));
                code.push(load(index));
                code.push(Instruction::LoadIndex);
                code.push(store_temp(*result));
            }
            IrInstruction::StoreIndex { list, index, value } => {
                code.push(Instruction::LoadVar(list.clone()));
                code.push(load(index));
                code.push(load(value));
                code.push(Instruction::StoreIndex);
            }
            IrInstruction::Call { name, args, result } => {
                code.extend(args.iter().map(load));
                code.push(Instruction::CallFunction {
                    name: name.clone(),
                    argc: args.len(),
                });
                code.push(store_temp(*result));
            }
            IrInstruction::CallMethod {
                object,
                method,
                args,
                result,
            } => {
                code.push(Instruction::LoadVar(object.clone()));
                code.extend(args.iter().map(load));
                code.push(Instruction::CallMethod {
                    name: method.clone(),
                    argc: args.len(),
                });
                code.push(store_temp(*result));
            }
            IrInstruction::LoadAttr {
                object,
                name,
                result,
            } => {
                code.push(Instruction::LoadVar(object.clone()));
                code.push(Instruction::LoadAttr(name.clone()));
                code.push(store_temp(*result));
            }
            IrInstruction::StoreAttr {
                object,
                name,
                value,
            } => {
                code.push(Instruction::LoadVar(object.clone()));
                code.push(load(value));
                code.push(Instruction::StoreAttr(name.clone()));
            }
            IrInstruction::DefineFunction(name) => {
                code.push(Instruction::DefineFunction(name.clone()));
            }
            IrInstruction::DefineClass(name) => code.push(Instruction::DefineClass(name.clone())),
            IrInstruction::Return(value) => {
                code.push(match value {
                    Some(value) => load(value),
                    None => Instruction::LoadConst(Constant::None),
                });
                code.push(Instruction::ReturnValue);
            }
        }
        debug_assert_eq!(code.len() - before, width(instruction));
    }
    debug!(ir = ir.len(), bytecode = code.len(), "converted IR to bytecode");
    Ok(code)
}

/// Converts the main instruction stream and compiles the recorded function
/// and class bodies directly.
pub fn convert_program(ir: &IrProgram) -> Result<CompiledProgram, ConvertError> {
    let main = convert(&ir.instructions)?;
    let mut generator = BytecodeGenerator::new();
    for function in &ir.functions {
        generator.compile_function(function);
    }
    for class in &ir.classes {
        generator.compile_class(class);
    }
    Ok(generator.finish(main))
}

fn load(operand: &Operand) -> Instruction {
    Instruction::LoadVar(operand.slot())
}

fn store_temp(temp: Temp) -> Instruction {
    Instruction::StoreVar(temp.to_string())
}
