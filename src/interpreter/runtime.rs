use rustc_hash::FxHashMap;

use crate::ast::{
    BinaryOperator, CONSTRUCTOR, ClassDef, CompareOperator, Expression, FunctionDef, Statement,
};
use crate::builtins::BuiltinFunction;
use crate::config::VmConfig;
use crate::runtime::{RuntimeError, RuntimeResult, Value};

/// Control-flow marker for statement execution.
pub(super) enum ExecResult {
    Continue,
    Return(Value),
}

/// Variable environment: shared globals plus the current call's locals.
///
/// Reads fall back from locals to globals; writes always land in the
/// innermost scope.
pub(super) struct Environment<'a> {
    globals: &'a mut FxHashMap<String, Value>,
    locals: Option<&'a mut FxHashMap<String, Value>>,
}

impl<'a> Environment<'a> {
    pub(super) fn top_level(globals: &'a mut FxHashMap<String, Value>) -> Self {
        Self {
            globals,
            locals: None,
        }
    }

    fn load(&self, name: &str) -> RuntimeResult<Value> {
        if let Some(locals) = self.locals.as_deref()
            && let Some(value) = locals.get(name)
        {
            return Ok(value.clone());
        }
        self.globals
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn store(&mut self, name: &str, value: Value) {
        let scope = match self.locals.as_deref_mut() {
            Some(locals) => locals,
            None => &mut *self.globals,
        };
        scope.insert(name.to_string(), value);
    }

    fn child_with_locals<'b>(
        &'b mut self,
        locals: &'b mut FxHashMap<String, Value>,
    ) -> Environment<'b> {
        Environment {
            globals: &mut *self.globals,
            locals: Some(locals),
        }
    }
}

/// Executor for statements and expressions.
///
/// Definitions become callable when their `def`/`class` statement runs, the
/// same moment the VM executes `DEFINE_FUNCTION`/`DEFINE_CLASS`.
pub(super) struct InterpreterRuntime<'a> {
    functions: FxHashMap<&'a str, &'a FunctionDef>,
    classes: FxHashMap<&'a str, &'a ClassDef>,
    limits: VmConfig,
    steps: u64,
    depth: usize,
    pub(super) output: Vec<String>,
}

impl<'a> InterpreterRuntime<'a> {
    pub(super) fn new(limits: VmConfig) -> Self {
        Self {
            functions: FxHashMap::default(),
            classes: FxHashMap::default(),
            limits,
            steps: 0,
            depth: 0,
            output: Vec::new(),
        }
    }

    pub(super) fn exec_block(
        &mut self,
        body: &'a [Statement],
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<ExecResult> {
        for statement in body {
            if let ExecResult::Return(value) = self.exec_statement(statement, environment)? {
                return Ok(ExecResult::Return(value));
            }
        }
        Ok(ExecResult::Continue)
    }

    fn tick(&mut self) -> RuntimeResult<()> {
        if let Some(limit) = self.limits.max_steps
            && self.steps >= limit
        {
            return Err(RuntimeError::StepLimitExceeded { limit });
        }
        self.steps += 1;
        Ok(())
    }

    fn exec_statement(
        &mut self,
        statement: &'a Statement,
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<ExecResult> {
        self.tick()?;
        match statement {
            Statement::Assign { name, value } => {
                let value = self.eval_expression(value, environment)?;
                environment.store(name, value);
            }
            Statement::IndexAssign { name, index, value } => {
                let list = environment.load(name)?;
                let index = self.eval_expression(index, environment)?;
                let value = self.eval_expression(value, environment)?;
                list.store_index(&index, value)?;
            }
            Statement::AttributeAssign {
                object,
                name,
                value,
            } => {
                let object = environment.load(object)?;
                let value = self.eval_expression(value, environment)?;
                object.set_attribute(name, value)?;
            }
            Statement::Print(value) => {
                let value = self.eval_expression(value, environment)?;
                self.output.push(value.to_output());
            }
            Statement::Expr(value) => {
                self.eval_expression(value, environment)?;
            }
            Statement::If {
                condition,
                body,
                else_body,
            } => {
                let body = if self.eval_expression(condition, environment)?.is_truthy() {
                    body
                } else {
                    else_body
                };
                return self.exec_block(body, environment);
            }
            Statement::While { condition, body } => loop {
                if !self.eval_expression(condition, environment)?.is_truthy() {
                    break;
                }
                if let ExecResult::Return(value) = self.exec_block(body, environment)? {
                    return Ok(ExecResult::Return(value));
                }
                self.tick()?;
            },
            Statement::For {
                variable,
                start,
                end,
                body,
            } => {
                let mut counter = self.eval_expression(start, environment)?;
                let end = self.eval_expression(end, environment)?;
                while counter.compare(CompareOperator::Lt, &end)? {
                    environment.store(variable, counter.clone());
                    if let ExecResult::Return(value) = self.exec_block(body, environment)? {
                        return Ok(ExecResult::Return(value));
                    }
                    counter = counter.binary(BinaryOperator::Add, &Value::int(1))?;
                    self.tick()?;
                }
            }
            Statement::FunctionDef(function) => {
                self.functions.insert(&function.name, function);
            }
            Statement::ClassDef(class) => {
                self.classes.insert(&class.name, class);
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(value) => self.eval_expression(value, environment)?,
                    None => Value::None,
                };
                return Ok(ExecResult::Return(value));
            }
            Statement::Pass => {}
        }
        Ok(ExecResult::Continue)
    }

    fn eval_expression(
        &mut self,
        expression: &'a Expression,
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<Value> {
        match expression {
            Expression::Number(value) => Ok(Value::Number(*value)),
            Expression::Boolean(value) => Ok(Value::Bool(*value)),
            Expression::Variable(name) => environment.load(name),
            Expression::BinaryOp { left, op, right } => {
                let left = self.eval_expression(left, environment)?;
                let right = self.eval_expression(right, environment)?;
                left.binary(*op, &right)
            }
            Expression::Compare { left, op, right } => {
                let left = self.eval_expression(left, environment)?;
                let right = self.eval_expression(right, environment)?;
                Ok(Value::Bool(left.compare(*op, &right)?))
            }
            Expression::List(elements) => {
                let values = self.eval_all(elements, environment)?;
                Ok(Value::list(values))
            }
            Expression::Index { name, index } => {
                let list = environment.load(name)?;
                let index = self.eval_expression(index, environment)?;
                list.load_index(&index)
            }
            Expression::Attribute { object, name } => environment.load(object)?.get_attribute(name),
            Expression::Call { name, args } => {
                let args = self.eval_all(args, environment)?;
                self.call(name, args, environment)
            }
            Expression::MethodCall {
                object,
                method,
                args,
            } => {
                let receiver = environment.load(object)?;
                let args = self.eval_all(args, environment)?;
                self.call_method(receiver, method, args, environment)
            }
        }
    }

    fn eval_all(
        &mut self,
        expressions: &'a [Expression],
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<Vec<Value>> {
        expressions
            .iter()
            .map(|expression| self.eval_expression(expression, environment))
            .collect()
    }

    fn call(
        &mut self,
        name: &str,
        args: Vec<Value>,
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<Value> {
        if let Some(builtin) = BuiltinFunction::from_name(name) {
            return call_builtin(builtin, &args);
        }
        if let Some(function) = self.functions.get(name).copied() {
            return self.invoke(function, args, environment);
        }
        let Some(class) = self.classes.get(name).copied() else {
            return Err(RuntimeError::UndefinedFunction {
                name: name.to_string(),
            });
        };

        let instance = Value::instance(&class.name);
        match class.method(CONSTRUCTOR) {
            Some(init) => {
                let mut bound = Vec::with_capacity(args.len() + 1);
                bound.push(instance.clone());
                bound.extend(args);
                // Whatever `__init__` returns, the call evaluates to the instance.
                self.invoke(init, bound, environment)?;
                Ok(instance)
            }
            None if args.is_empty() => Ok(instance),
            None => Err(RuntimeError::ArityMismatch {
                name: class.name.clone(),
                expected: 0,
                found: args.len(),
            }),
        }
    }

    fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<Value> {
        let class_name = match &receiver {
            Value::List(_) => return receiver.call_list_method(method, args),
            Value::Object(instance) => instance.borrow().class_name.clone(),
            other => {
                return Err(RuntimeError::UnknownMethod {
                    method: method.to_string(),
                    type_name: other.type_name(),
                });
            }
        };
        let function = self
            .classes
            .get(class_name.as_str())
            .copied()
            .and_then(|class| class.method(method))
            .ok_or_else(|| RuntimeError::UnknownMethod {
                method: method.to_string(),
                type_name: class_name.clone(),
            })?;
        let mut bound = Vec::with_capacity(args.len() + 1);
        bound.push(receiver);
        bound.extend(args);
        self.invoke(function, bound, environment)
    }

    fn invoke(
        &mut self,
        function: &'a FunctionDef,
        args: Vec<Value>,
        environment: &mut Environment<'_>,
    ) -> RuntimeResult<Value> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::ArityMismatch {
                name: function.name.clone(),
                expected: function.params.len(),
                found: args.len(),
            });
        }
        if let Some(limit) = self.limits.max_call_depth
            && self.depth >= limit
        {
            return Err(RuntimeError::CallDepthExceeded { limit });
        }

        let mut locals: FxHashMap<String, Value> =
            function.params.iter().cloned().zip(args).collect();
        let mut local_environment = environment.child_with_locals(&mut locals);
        self.depth += 1;
        let result = self.exec_block(&function.body, &mut local_environment);
        self.depth -= 1;
        match result? {
            ExecResult::Continue => Ok(Value::None),
            ExecResult::Return(value) => Ok(value),
        }
    }
}

fn call_builtin(builtin: BuiltinFunction, args: &[Value]) -> RuntimeResult<Value> {
    if args.len() != builtin.arity() {
        return Err(RuntimeError::ArityMismatch {
            name: builtin.name().to_string(),
            expected: builtin.arity(),
            found: args.len(),
        });
    }
    match builtin {
        BuiltinFunction::Len => {
            let len = i64::try_from(args[0].len()?).map_err(|_| RuntimeError::IntegerOverflow)?;
            Ok(Value::int(len))
        }
    }
}
