/// Functions callable without a definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Len,
}

impl BuiltinFunction {
    pub const ALL: &'static [BuiltinFunction] = &[BuiltinFunction::Len];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "len" => Some(Self::Len),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Len => 1,
        }
    }
}

/// Methods every list value answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListMethod {
    Append,
}

impl ListMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "append" => Some(Self::Append),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Append => "append",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Append => 1,
        }
    }
}
