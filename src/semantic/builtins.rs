use super::types::{BaseType, Type};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Builtin {
    pub name: &'static str,
    pub params: &'static [Type],
    pub ret: Type,
}

const ANY_ARRAY: Type = Type::dynamic(BaseType::Any);

/// Calls the source language provides without a declaration.
///
/// `sizeof` takes a type reference rather than a value; its single `any`
/// parameter is checked separately by the analyzer.
pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "print", params: &[Type::ANY], ret: Type::VOID },
    Builtin { name: "input", params: &[Type::STR], ret: Type::STR },
    Builtin { name: "malloc", params: &[Type::INT], ret: ANY_ARRAY },
    Builtin { name: "free", params: &[ANY_ARRAY], ret: Type::VOID },
    Builtin { name: "realloc", params: &[ANY_ARRAY, Type::INT], ret: ANY_ARRAY },
    Builtin { name: "sizeof", params: &[Type::ANY], ret: Type::INT },
    Builtin { name: "strlen", params: &[Type::STR], ret: Type::INT },
    Builtin { name: "atoi", params: &[Type::STR], ret: Type::INT },
    Builtin { name: "atof", params: &[Type::STR], ret: Type::FLOAT },
    Builtin { name: "itoa", params: &[Type::INT], ret: Type::STR },
    Builtin { name: "ftoa", params: &[Type::FLOAT], ret: Type::STR },
];

/// Runtime entry points the generated module calls directly. User code may
/// not define functions under these names.
pub const RESERVED_RUNTIME_NAMES: &[&str] = &["printf", "strcmp", "read", "fflush"];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn is_reserved(name: &str) -> bool {
    lookup(name).is_some() || RESERVED_RUNTIME_NAMES.contains(&name)
}
