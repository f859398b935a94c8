//! Field errors rendered the way the Kubernetes API server renders them, so that messages surfaced
//! in events read the same as admission failures.

use std::fmt;

/// A dotted path to a field, e.g. `spec.rules[0].host`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path(String);

/// A rejected value. Strings are quoted when rendered, numbers are not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("{path}: Required value{}", suffix(.detail))]
    Required { path: Path, detail: String },

    #[error("{path}: Duplicate value: {value}")]
    Duplicate { path: Path, value: Value },

    #[error("{path}: Invalid value: {value}{}", suffix(.detail))]
    Invalid {
        path: Path,
        value: Value,
        detail: String,
    },

    #[error("{path}: Forbidden{}", suffix(.detail))]
    Forbidden { path: Path, detail: String },

    #[error("{path}: Too many: {actual}: must have at most {max} items")]
    TooMany {
        path: Path,
        actual: usize,
        max: usize,
    },

    #[error("{path}: Not found: {value}")]
    NotFound { path: Path, value: Value },

    #[error("{path}: Unsupported value: {value}: supported values: {}", quoted(.supported))]
    NotSupported {
        path: Path,
        value: Value,
        supported: Vec<String>,
    },
}

/// An aggregate of field errors. A single error renders bare; several render as `[e1, e2]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, thiserror::Error)]
pub struct FieldErrors(Vec<FieldError>);

fn suffix(detail: &str) -> String {
    if detail.is_empty() {
        return String::new();
    }
    format!(": {detail}")
}

fn quoted(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// === impl Path ===

impl Path {
    pub fn new(root: &str) -> Self {
        Self(root.to_string())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl Value ===

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(n) => n.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n.into())
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Int(n.into())
    }
}

// === impl FieldError ===

impl FieldError {
    pub fn required(path: &Path, detail: impl Into<String>) -> Self {
        Self::Required {
            path: path.clone(),
            detail: detail.into(),
        }
    }

    pub fn duplicate(path: &Path, value: impl Into<Value>) -> Self {
        Self::Duplicate {
            path: path.clone(),
            value: value.into(),
        }
    }

    pub fn invalid(path: &Path, value: impl Into<Value>, detail: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.clone(),
            value: value.into(),
            detail: detail.into(),
        }
    }

    pub fn forbidden(path: &Path, detail: impl Into<String>) -> Self {
        Self::Forbidden {
            path: path.clone(),
            detail: detail.into(),
        }
    }

    pub fn too_many(path: &Path, actual: usize, max: usize) -> Self {
        Self::TooMany {
            path: path.clone(),
            actual,
            max,
        }
    }

    pub fn not_found(path: &Path, value: impl Into<Value>) -> Self {
        Self::NotFound {
            path: path.clone(),
            value: value.into(),
        }
    }

    pub fn not_supported(path: &Path, value: impl Into<Value>, supported: &[&str]) -> Self {
        Self::NotSupported {
            path: path.clone(),
            value: value.into(),
            supported: supported.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// === impl FieldErrors ===

impl FieldErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Converts the accumulated errors into a validation result.
    pub fn into_result(self) -> Result<(), Self> {
        if self.0.is_empty() {
            return Ok(());
        }
        Err(self)
    }
}

impl Extend<FieldError> for FieldErrors {
    fn extend<I: IntoIterator<Item = FieldError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl From<FieldError> for FieldErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

impl FromIterator<FieldError> for FieldErrors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [e] => e.fmt(f),
            errors => {
                f.write_str("[")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    e.fmt(f)?;
                }
                f.write_str("]")
            }
        }
    }
}
