//! Runtime values and errors shared by the VM and the reference interpreter.
mod error;
mod value;

pub use error::{ExecutionError, RuntimeError, RuntimeResult};
pub use value::{Instance, ListCell, Value};
