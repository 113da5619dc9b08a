use rustc_hash::FxHashMap;

use crate::bytecode::CodeBlock;
use crate::runtime::Value;

/// Where execution resumes after a call returns.
pub(super) struct ReturnAddress {
    pub(super) code: CodeBlock,
    pub(super) ip: usize,
}

/// What a returning frame hands back to its caller.
pub(super) enum ReturnMode {
    /// The value on top of the callee's stack.
    Value,
    /// The instance being constructed; `__init__`'s own result is discarded.
    Instance(Value),
}

pub(super) struct Frame {
    pub(super) variables: FxHashMap<String, Value>,
    /// `None` only for the global frame.
    pub(super) return_address: Option<ReturnAddress>,
    pub(super) mode: ReturnMode,
}

impl Frame {
    pub(super) fn global() -> Self {
        Self {
            variables: FxHashMap::default(),
            return_address: None,
            mode: ReturnMode::Value,
        }
    }

    pub(super) fn call(
        variables: FxHashMap<String, Value>,
        return_address: ReturnAddress,
        mode: ReturnMode,
    ) -> Self {
        Self {
            variables,
            return_address: Some(return_address),
            mode,
        }
    }
}
