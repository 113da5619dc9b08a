use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{BinaryOperator, CompareOperator};
use crate::builtins::ListMethod;
use crate::bytecode::{CompiledClass, Constant};
use crate::number::Number;

use super::{RuntimeError, RuntimeResult};

/// A runtime value. Lists and instances are shared by reference, so mutation
/// through one alias is visible through every other.
#[derive(Debug, Clone)]
pub enum Value {
    Number(Number),
    Bool(bool),
    List(Rc<ListCell>),
    Object(Rc<RefCell<Instance>>),
    None,
}

/// Backing storage of a list value.
#[derive(Debug, Default)]
pub struct ListCell(RefCell<Vec<Value>>);

impl Deref for ListCell {
    type Target = RefCell<Vec<Value>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for ListCell {
    // Unlinks nested lists one level at a time instead of recursing.
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.0.get_mut());
        while let Some(value) = pending.pop() {
            if let Value::List(list) = value
                && let Ok(mut list) = Rc::try_unwrap(list)
            {
                pending.append(list.0.get_mut());
            }
        }
    }
}

#[derive(Debug)]
pub struct Instance {
    pub class_name: String,
    /// Set for instances built by the VM so method calls skip the class table.
    pub class: Option<Rc<CompiledClass>>,
    pub attributes: FxHashMap<String, Value>,
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Number(Number::Int(value))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Rc::new(ListCell(RefCell::new(values))))
    }

    pub fn instance(class_name: &str) -> Self {
        Value::Object(Rc::new(RefCell::new(Instance {
            class_name: class_name.to_string(),
            class: None,
            attributes: FxHashMap::default(),
        })))
    }

    pub fn instance_of(class: &Rc<CompiledClass>) -> Self {
        Value::Object(Rc::new(RefCell::new(Instance {
            class_name: class.name.clone(),
            class: Some(Rc::clone(class)),
            attributes: FxHashMap::default(),
        })))
    }

    pub fn from_constant(constant: Constant) -> Self {
        match constant {
            Constant::Number(value) => Value::Number(value),
            Constant::Bool(value) => Value::Bool(value),
            Constant::None => Value::None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Number(Number::Int(_)) => "int".to_string(),
            Value::Number(Number::Float(_)) => "float".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Object(instance) => instance.borrow().class_name.clone(),
            Value::None => "NoneType".to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(value) => value.is_truthy(),
            Value::Bool(value) => *value,
            Value::List(values) => !values.borrow().is_empty(),
            Value::Object(_) => true,
            Value::None => false,
        }
    }

    /// Numeric view of the value; booleans count as 0 and 1.
    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Bool(value) => Some(Number::Int(i64::from(*value))),
            _ => None,
        }
    }

    pub fn binary(&self, op: BinaryOperator, rhs: &Value) -> RuntimeResult<Value> {
        if let (Some(lhs), Some(rhs)) = (self.as_number(), rhs.as_number()) {
            return Ok(Value::Number(lhs.apply(op, rhs)?));
        }
        if let (BinaryOperator::Add, Value::List(lhs), Value::List(rhs)) = (op, self, rhs) {
            let mut joined = lhs.borrow().clone();
            joined.extend(rhs.borrow().iter().cloned());
            return Ok(Value::list(joined));
        }
        Err(RuntimeError::TypeMismatch {
            operation: op.symbol().to_string(),
            left: self.type_name(),
            right: rhs.type_name(),
        })
    }

    pub fn compare(&self, op: CompareOperator, rhs: &Value) -> RuntimeResult<bool> {
        match op {
            CompareOperator::Eq => return Ok(self.equals(rhs)),
            CompareOperator::NotEq => return Ok(!self.equals(rhs)),
            _ => {}
        }
        match (self.as_number(), rhs.as_number()) {
            (Some(lhs), Some(rhs)) => Ok(lhs.compare(op, rhs)),
            _ => Err(RuntimeError::TypeMismatch {
                operation: op.symbol().to_string(),
                left: self.type_name(),
                right: rhs.type_name(),
            }),
        }
    }

    /// Structural equality. Pairs of lists already under comparison count as
    /// equal, so self-containing lists compare without unbounded recursion.
    fn equals(&self, other: &Value) -> bool {
        let mut pending = vec![(self.clone(), other.clone())];
        let mut compared = FxHashSet::default();
        while let Some((lhs, rhs)) = pending.pop() {
            match (&lhs, &rhs) {
                (Value::List(left), Value::List(right)) => {
                    if Rc::ptr_eq(left, right)
                        || !compared.insert((Rc::as_ptr(left), Rc::as_ptr(right)))
                    {
                        continue;
                    }
                    let (left, right) = (left.borrow(), right.borrow());
                    if left.len() != right.len() {
                        return false;
                    }
                    pending.extend(left.iter().cloned().zip(right.iter().cloned()));
                }
                _ => {
                    if !lhs.equals_scalar(&rhs) {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn equals_scalar(&self, other: &Value) -> bool {
        if let (Some(lhs), Some(rhs)) = (self.as_number(), other.as_number()) {
            return lhs.compare(CompareOperator::Eq, rhs);
        }
        match (self, other) {
            (Value::Object(lhs), Value::Object(rhs)) => Rc::ptr_eq(lhs, rhs),
            (Value::None, Value::None) => true,
            _ => false,
        }
    }

    /// Renders the value the way `print` shows it.
    pub fn to_output(&self) -> String {
        let mut open_lists = Vec::new();
        self.render(&mut open_lists)
    }

    fn render(&self, open_lists: &mut Vec<*const ListCell>) -> String {
        match self {
            Value::Number(value) => value.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::List(values) => {
                let pointer = Rc::as_ptr(values);
                // A list that contains itself prints as `[...]`.
                if open_lists.contains(&pointer) {
                    return "[...]".to_string();
                }
                open_lists.push(pointer);
                let rendered = values
                    .borrow()
                    .iter()
                    .map(|value| value.render(open_lists))
                    .collect::<Vec<_>>()
                    .join(", ");
                open_lists.pop();
                format!("[{rendered}]")
            }
            Value::Object(instance) => format!("<{} object>", instance.borrow().class_name),
            Value::None => "None".to_string(),
        }
    }

    fn as_list(&self, operation: &str) -> RuntimeResult<&Rc<ListCell>> {
        match self {
            Value::List(values) => Ok(values),
            other => Err(RuntimeError::ExpectedList {
                operation: operation.to_string(),
                found: other.type_name(),
            }),
        }
    }

    pub fn len(&self) -> RuntimeResult<usize> {
        Ok(self.as_list("len")?.borrow().len())
    }

    pub fn load_index(&self, index: &Value) -> RuntimeResult<Value> {
        let values = self.as_list("index")?.borrow();
        let position = resolve_index(index, values.len())?;
        Ok(values[position].clone())
    }

    pub fn store_index(&self, index: &Value, value: Value) -> RuntimeResult<()> {
        let mut values = self.as_list("index assignment")?.borrow_mut();
        let position = resolve_index(index, values.len())?;
        values[position] = value;
        Ok(())
    }

    pub fn get_attribute(&self, name: &str) -> RuntimeResult<Value> {
        if let Value::Object(instance) = self
            && let Some(value) = instance.borrow().attributes.get(name)
        {
            return Ok(value.clone());
        }
        Err(RuntimeError::UnknownAttribute {
            attribute: name.to_string(),
            type_name: self.type_name(),
        })
    }

    pub fn set_attribute(&self, name: &str, value: Value) -> RuntimeResult<()> {
        match self {
            Value::Object(instance) => {
                instance
                    .borrow_mut()
                    .attributes
                    .insert(name.to_string(), value);
                Ok(())
            }
            other => Err(RuntimeError::UnknownAttribute {
                attribute: name.to_string(),
                type_name: other.type_name(),
            }),
        }
    }

    pub fn call_list_method(&self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let values = self.as_list(name)?;
        let method = ListMethod::from_name(name).ok_or_else(|| RuntimeError::UnknownMethod {
            method: name.to_string(),
            type_name: self.type_name(),
        })?;
        if args.len() != method.arity() {
            return Err(RuntimeError::ArityMismatch {
                name: method.name().to_string(),
                expected: method.arity(),
                found: args.len(),
            });
        }
        match method {
            ListMethod::Append => values.borrow_mut().extend(args),
        }
        Ok(Value::None)
    }
}

/// Maps a possibly negative index onto `0..len`.
fn resolve_index(index: &Value, len: usize) -> RuntimeResult<usize> {
    let index = match index {
        Value::Number(Number::Int(value)) => *value,
        Value::Bool(value) => i64::from(*value),
        other => {
            return Err(RuntimeError::ExpectedInteger {
                found: other.type_name(),
            });
        }
    };
    let out_of_range = || RuntimeError::IndexOutOfRange { index, len };
    let length = i64::try_from(len).map_err(|_| out_of_range())?;
    let position = if index < 0 { index + length } else { index };
    if (0..length).contains(&position) {
        usize::try_from(position).map_err(|_| out_of_range())
    } else {
        Err(out_of_range())
    }
}
