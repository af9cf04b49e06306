use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int,
    Float,
    Bool,
    Str,
    Void,
    Error,
    Any,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Int => "int",
            BaseType::Float => "float",
            BaseType::Bool => "bool",
            BaseType::Str => "str",
            BaseType::Void => "void",
            BaseType::Error => "error",
            BaseType::Any => "any",
        };
        f.write_str(name)
    }
}

/// Extent of an array type. `Dynamic` arrays only fix their element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extent {
    Fixed(usize),
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    pub base: BaseType,
    pub extent: Option<Extent>,
}

impl Type {
    pub const INT: Type = Type::scalar(BaseType::Int);
    pub const FLOAT: Type = Type::scalar(BaseType::Float);
    pub const BOOL: Type = Type::scalar(BaseType::Bool);
    pub const STR: Type = Type::scalar(BaseType::Str);
    pub const VOID: Type = Type::scalar(BaseType::Void);
    pub const ERROR: Type = Type::scalar(BaseType::Error);
    pub const ANY: Type = Type::scalar(BaseType::Any);

    pub const fn scalar(base: BaseType) -> Self {
        Self { base, extent: None }
    }

    pub const fn fixed(base: BaseType, len: usize) -> Self {
        Self {
            base,
            extent: Some(Extent::Fixed(len)),
        }
    }

    pub const fn dynamic(base: BaseType) -> Self {
        Self {
            base,
            extent: Some(Extent::Dynamic),
        }
    }

    pub fn is_array(&self) -> bool {
        self.extent.is_some()
    }

    pub fn is_scalar(&self) -> bool {
        self.extent.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.base == BaseType::Error
    }

    pub fn is_void(&self) -> bool {
        self.is_scalar() && self.base == BaseType::Void
    }

    pub fn is_numeric(&self) -> bool {
        self.is_scalar() && matches!(self.base, BaseType::Int | BaseType::Float)
    }

    pub fn is_bool(&self) -> bool {
        self.is_scalar() && self.base == BaseType::Bool
    }

    pub fn is_str(&self) -> bool {
        self.is_scalar() && self.base == BaseType::Str
    }

    /// Element type of an array; scalars are returned unchanged.
    pub fn element(&self) -> Type {
        Type::scalar(self.base)
    }

    pub fn fixed_len(&self) -> Option<usize> {
        match self.extent {
            Some(Extent::Fixed(len)) => Some(len),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.extent {
            None => write!(f, "{}", self.base),
            Some(Extent::Dynamic) => write!(f, "{}[]", self.base),
            Some(Extent::Fixed(len)) => write!(f, "{}[{}]", self.base, len),
        }
    }
}

/// Whether a value of type `source` may be stored where `target` is expected.
pub fn is_compatible(target: &Type, source: &Type) -> bool {
    if target.is_error() || source.is_error() {
        return true;
    }

    if target.base == BaseType::Any {
        return target.is_scalar() || source.is_array();
    }
    if source.base == BaseType::Any {
        return source.is_scalar() || target.is_array();
    }

    match (target.extent, source.extent) {
        (None, None) => {
            target.base == source.base
                || (target.base == BaseType::Float && source.base == BaseType::Int)
        }
        (Some(target_extent), Some(source_extent)) => {
            if target.base != source.base {
                return false;
            }
            match (target_extent, source_extent) {
                (Extent::Fixed(a), Extent::Fixed(b)) => a == b,
                _ => true,
            }
        }
        _ => false,
    }
}

/// Result type of combining `lhs` and `rhs` in a binary operation.
pub fn common_type(lhs: &Type, rhs: &Type) -> Type {
    if lhs.base == rhs.base && lhs.is_array() == rhs.is_array() {
        return match (lhs.extent, rhs.extent) {
            (Some(Extent::Dynamic), Some(Extent::Fixed(_))) => *rhs,
            _ => *lhs,
        };
    }

    if lhs.is_numeric() && rhs.is_numeric() {
        return Type::FLOAT;
    }

    *lhs
}
