//! Stack-based virtual machine.
//!
//! Every function and method body is its own code block. A call pushes a
//! [`Frame`] that remembers the caller's block and instruction pointer, and
//! switches execution to the callee's block; `RETURN_VALUE` switches back.
//! Variable reads look in the current frame, then in the global frame.

use std::mem;
use std::rc::Rc;

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ast::{BinaryOperator, CONSTRUCTOR, Program};
use crate::backend::{Backend, PreparedBackend};
use crate::builtins::BuiltinFunction;
use crate::bytecode::{CodeBlock, CompiledClass, CompiledFunction, CompiledProgram, Instruction};
use crate::config::{Config, VmConfig};
use crate::pipeline;
use crate::runtime::{ExecutionError, RuntimeError, RuntimeResult, Value};

mod frame;

use frame::{Frame, ReturnAddress, ReturnMode};

/// Outcome of executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    /// A call just returned to its caller.
    Returned,
    /// The main block ran to completion.
    Halted,
}

pub struct VM {
    config: Config,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    functions: FxHashMap<String, Rc<CompiledFunction>>,
    classes: FxHashMap<String, Rc<CompiledClass>>,
    code: CodeBlock,
    ip: usize,
    steps: u64,
    output: Vec<String>,
}

pub struct PreparedVM {
    compiled: CompiledProgram,
    config: Config,
}

impl VM {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            stack: Vec::new(),
            frames: vec![Frame::global()],
            functions: FxHashMap::default(),
            classes: FxHashMap::default(),
            code: Rc::from(Vec::new()),
            ip: 0,
            steps: 0,
            output: Vec::new(),
        }
    }

    fn limits(&self) -> VmConfig {
        self.config.vm
    }

    /// Runs `program` from a fresh state and returns everything it printed.
    pub fn run_compiled(&mut self, program: &CompiledProgram) -> Result<String, ExecutionError> {
        self.reset(Rc::clone(&program.main));
        loop {
            match self.step(program) {
                Ok(VmState::Halted) => break,
                Ok(VmState::Running | VmState::Returned) => {}
                Err(error) => {
                    debug!(%error, steps = self.steps, "execution failed");
                    return Err(ExecutionError {
                        error,
                        output: self.take_output(),
                    });
                }
            }
        }
        debug!(steps = self.steps, "execution halted");
        Ok(self.take_output())
    }

    fn reset(&mut self, main: CodeBlock) {
        self.stack.clear();
        self.frames = vec![Frame::global()];
        self.functions.clear();
        self.classes.clear();
        self.code = main;
        self.ip = 0;
        self.steps = 0;
        self.output.clear();
    }

    fn take_output(&mut self) -> String {
        mem::take(&mut self.output).join("\n")
    }

    /// Executes the instruction at the current instruction pointer.
    pub fn step(&mut self, program: &CompiledProgram) -> RuntimeResult<VmState> {
        if self.ip >= self.code.len() {
            if self.frames.len() == 1 {
                return Ok(VmState::Halted);
            }
            // Bodies end with an explicit return; this only guards hand-built code.
            return self.return_from_call(Value::None);
        }

        if let Some(limit) = self.limits().max_steps
            && self.steps >= limit
        {
            return Err(RuntimeError::StepLimitExceeded { limit });
        }
        self.steps += 1;

        let code = Rc::clone(&self.code);
        let instruction = &code[self.ip];
        trace!(ip = self.ip, depth = self.frames.len() - 1, %instruction, "step");
        self.ip += 1;

        match instruction {
            Instruction::LoadConst(constant) => self.stack.push(Value::from_constant(*constant)),
            Instruction::LoadVar(name) => {
                let value = self.load(name)?;
                self.stack.push(value);
            }
            Instruction::StoreVar(name) => {
                let value = self.pop()?;
                self.current_frame().variables.insert(name.clone(), value);
            }
            Instruction::Add => self.arithmetic(BinaryOperator::Add)?,
            Instruction::Sub => self.arithmetic(BinaryOperator::Sub)?,
            Instruction::Mul => self.arithmetic(BinaryOperator::Mul)?,
            Instruction::Div => self.arithmetic(BinaryOperator::Div)?,
            Instruction::Compare(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                self.stack.push(Value::Bool(left.compare(*op, &right)?));
            }
            Instruction::Print => {
                let value = self.pop()?;
                self.output.push(value.to_output());
            }
            Instruction::Jump(target) => self.jump(*target)?,
            Instruction::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.jump(*target)?;
                }
            }
            Instruction::BuildList(count) => {
                let values = self.pop_many(*count)?;
                self.stack.push(Value::list(values));
            }
            Instruction::LoadIndex => {
                let index = self.pop()?;
                let list = self.pop()?;
                self.stack.push(list.load_index(&index)?);
            }
            Instruction::StoreIndex => {
                let value = self.pop()?;
                let index = self.pop()?;
                let list = self.pop()?;
                list.store_index(&index, value)?;
            }
            Instruction::DefineFunction(name) => {
                let function = program.functions.get(name).ok_or_else(|| {
                    RuntimeError::UndefinedFunction { name: name.clone() }
                })?;
                self.functions.insert(name.clone(), Rc::clone(function));
            }
            Instruction::DefineClass(name) => {
                let class = program
                    .classes
                    .get(name)
                    .ok_or_else(|| RuntimeError::UndefinedFunction { name: name.clone() })?;
                self.classes.insert(name.clone(), Rc::clone(class));
            }
            Instruction::CallFunction { name, argc } => self.call_function(name, *argc)?,
            Instruction::ReturnValue => {
                let value = self.pop()?;
                return self.return_from_call(value);
            }
            Instruction::LoadAttr(name) => {
                let object = self.pop()?;
                self.stack.push(object.get_attribute(name)?);
            }
            Instruction::StoreAttr(name) => {
                let value = self.pop()?;
                let object = self.pop()?;
                object.set_attribute(name, value)?;
            }
            Instruction::CallMethod { name, argc } => self.call_method(name, *argc)?,
            Instruction::Pop => {
                self.pop()?;
            }
        }
        Ok(VmState::Running)
    }

    fn arithmetic(&mut self, op: BinaryOperator) -> RuntimeResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;
        self.stack.push(left.binary(op, &right)?);
        Ok(())
    }

    fn jump(&mut self, target: usize) -> RuntimeResult<()> {
        if target > self.code.len() {
            return Err(RuntimeError::InvalidJumpTarget {
                target,
                len: self.code.len(),
            });
        }
        self.ip = target;
        Ok(())
    }

    fn call_function(&mut self, name: &str, argc: usize) -> RuntimeResult<()> {
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            return self.call_builtin(builtin, argc);
        }
        let args = self.pop_many(argc)?;

        if let Some(function) = self.functions.get(name).cloned() {
            return self.enter(&function, args, ReturnMode::Value);
        }
        if let Some(class) = self.classes.get(name).cloned() {
            let instance = Value::instance_of(&class);
            return match class.method(CONSTRUCTOR).cloned() {
                Some(init) => {
                    let mut bound = Vec::with_capacity(args.len() + 1);
                    bound.push(instance.clone());
                    bound.extend(args);
                    self.enter(&init, bound, ReturnMode::Instance(instance))
                }
                None if args.is_empty() => {
                    self.stack.push(instance);
                    Ok(())
                }
                None => Err(RuntimeError::ArityMismatch {
                    name: class.name.clone(),
                    expected: 0,
                    found: args.len(),
                }),
            };
        }
        Err(RuntimeError::UndefinedFunction {
            name: name.to_string(),
        })
    }

    fn call_builtin(&mut self, builtin: BuiltinFunction, argc: usize) -> RuntimeResult<()> {
        if argc != builtin.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: builtin.name().to_string(),
                expected: builtin.arity(),
                found: argc,
            });
        }
        match builtin {
            BuiltinFunction::Len => {
                let value = self.pop()?;
                let len = i64::try_from(value.len()?).map_err(|_| RuntimeError::IntegerOverflow)?;
                self.stack.push(Value::int(len));
            }
        }
        Ok(())
    }

    fn call_method(&mut self, name: &str, argc: usize) -> RuntimeResult<()> {
        let args = self.pop_many(argc)?;
        let receiver = self.pop()?;
        let class = match &receiver {
            Value::Object(instance) => instance.borrow().class.clone(),
            Value::List(_) => {
                let result = receiver.call_list_method(name, args)?;
                self.stack.push(result);
                return Ok(());
            }
            other => {
                return Err(RuntimeError::UnknownMethod {
                    method: name.to_string(),
                    type_name: other.type_name(),
                });
            }
        };

        let Some(method) = class.as_deref().and_then(|class| class.method(name)).cloned() else {
            return Err(RuntimeError::UnknownMethod {
                method: name.to_string(),
                type_name: receiver.type_name(),
            });
        };
        let mut bound = Vec::with_capacity(args.len() + 1);
        bound.push(receiver);
        bound.extend(args);
        self.enter(&method, bound, ReturnMode::Value)
    }

    /// Pushes a frame binding `args` to the callee's parameters and jumps
    /// into its block.
    fn enter(
        &mut self,
        function: &CompiledFunction,
        args: Vec<Value>,
        mode: ReturnMode,
    ) -> RuntimeResult<()> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        let depth = self.frames.len();
        if let Some(limit) = self.limits().max_call_depth
            && depth > limit
        {
            return Err(RuntimeError::CallDepthExceeded { limit });
        }

        let variables = function.params.iter().cloned().zip(args).collect();
        let return_address = ReturnAddress {
            code: mem::replace(&mut self.code, Rc::clone(&function.code)),
            ip: self.ip,
        };
        self.frames
            .push(Frame::call(variables, return_address, mode));
        self.ip = 0;
        debug!(function = %function.name, depth, "call");
        Ok(())
    }

    fn return_from_call(&mut self, value: Value) -> RuntimeResult<VmState> {
        if self.frames.len() == 1 {
            return Err(RuntimeError::ReturnOutsideFunction);
        }
        let frame = self.frames.pop().ok_or(RuntimeError::ReturnOutsideFunction)?;
        let address = frame
            .return_address
            .ok_or(RuntimeError::ReturnOutsideFunction)?;
        self.code = address.code;
        self.ip = address.ip;
        self.stack.push(match frame.mode {
            ReturnMode::Value => value,
            ReturnMode::Instance(instance) => instance,
        });
        debug!(depth = self.frames.len() - 1, "return");
        Ok(VmState::Returned)
    }

    fn load(&self, name: &str) -> RuntimeResult<Value> {
        let local = self.frames.last().and_then(|frame| frame.variables.get(name));
        local
            .or_else(|| self.frames.first().and_then(|frame| frame.variables.get(name)))
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn current_frame(&mut self) -> &mut Frame {
        // The global frame is never popped.
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn pop(&mut self) -> RuntimeResult<Value> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops `count` values, returned in the order they were pushed.
    fn pop_many(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(RuntimeError::StackUnderflow)?;
        Ok(self.stack.split_off(start))
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for VM {
    fn name(&self) -> &'static str {
        "vm"
    }

    fn prepare(&self, program: &Program) -> Result<Box<dyn PreparedBackend>> {
        Ok(Box::new(PreparedVM {
            compiled: pipeline::compile_program(program.clone(), &self.config.compile)?,
            config: self.config,
        }))
    }
}

impl PreparedBackend for PreparedVM {
    fn run(&self) -> Result<String> {
        let mut vm = VM::with_config(self.config);
        Ok(vm.run_compiled(&self.compiled)?)
    }
}
