use std::fmt::{self, Display, Formatter};

/// A runtime value of loaded Ember code.
#[derive(PartialEq, Debug, Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::String(_) => "string",
        }
    }

    /// The default value of a field of the named type.
    pub fn default_for(type_name: &str) -> Value {
        match type_name {
            "bool" => Value::Bool(false),
            "int" => Value::Int(0),
            "double" => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    /// Text used when the value is an operand of string concatenation.
    pub fn to_concat_string(&self) -> String {
        match self {
            Value::Void | Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Double(d) => d.to_string(),
            Value::String(s) => s.clone(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
