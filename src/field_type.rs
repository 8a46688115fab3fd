use std::fmt;

/// Data type of a column (or of a single cell during inference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    /// Null/empty value; a column of only nulls keeps this type.
    Null,
    /// Boolean value (`True`/`false`/...).
    Bool,
    /// Whole number fitting in `i64`. Columns may contain nulls.
    Int,
    /// Floating point number.
    Float,
    /// Timestamp kept as canonical text.
    DateTime,
    /// Text/string value (fallback type).
    #[default]
    Text,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.public_name())
    }
}

impl Type {
    /// Name reported by the schema endpoint.
    pub const fn public_name(&self) -> &'static str {
        match self {
            Type::Null | Type::Text => "string",
            Type::Bool => "bool",
            Type::Int => "int",
            Type::Float => "float",
            Type::DateTime => "datetime",
        }
    }

    /// Merge two types, returning the most specific type that can represent both.
    pub fn merge(self, other: Type) -> Type {
        if self == other {
            return self;
        }

        // NULL can be promoted to any type
        if self == Type::Null {
            return other;
        }
        if other == Type::Null {
            return self;
        }

        match (self, other) {
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            // Everything else becomes Text
            _ => Type::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_merge() {
        assert_eq!(Type::Int.merge(Type::Int), Type::Int);
        assert_eq!(Type::Int.merge(Type::Float), Type::Float);
        assert_eq!(Type::Null.merge(Type::Int), Type::Int);
        assert_eq!(Type::DateTime.merge(Type::Null), Type::DateTime);
        assert_eq!(Type::DateTime.merge(Type::Int), Type::Text);
        assert_eq!(Type::Bool.merge(Type::Int), Type::Text);
        assert_eq!(Type::Bool.merge(Type::Text), Type::Text);
    }

    #[test]
    fn test_public_names() {
        assert_eq!(Type::Text.public_name(), "string");
        assert_eq!(Type::Null.public_name(), "string");
        assert_eq!(Type::Int.to_string(), "int");
        assert_eq!(Type::DateTime.to_string(), "datetime");
    }
}
