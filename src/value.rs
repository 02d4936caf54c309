//! Native value model.
//!
//! [`Value`] is the closed set of shapes a caller can pass to or receive
//! from the bridge. Most shapes map to exactly one wire kind; a few
//! ([`Value::LongArray`], [`Value::Raw`], [`Value::Complex`]) exist on the
//! host side but have no wire form, and fail to marshal.
//!
//! # Example
//!
//! ```
//! use clrbridge_client::{Matrix, Value};
//!
//! let args: Vec<Value> = vec![1i32.into(), "x".into(), true.into()];
//! assert_eq!(args[0].as_i32(), Some(1));
//!
//! let m = Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(m.get(1, 0), Some(2.0));
//! ```

use crate::error::{BridgeError, Result};
use crate::handle::RemoteObject;

/// A value crossing the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent / unit.
    Null,
    Bool(bool),
    Byte(u8),
    Int(i32),
    Long(i64),
    Float(f64),
    Str(String),
    /// Handle to a server-side object.
    Object(RemoteObject),
    BoolArray(Vec<bool>),
    IntArray(Vec<i32>),
    /// Plain float64 array (wire kind Float64Array).
    FloatArray(Vec<f64>),
    StrArray(Vec<String>),
    /// Float64 sequence with optional names (wire kind Vector).
    Vector(Vector),
    Matrix(Matrix),
    /// Heterogeneous sequence, typically of handles (wire kind ObjectArray).
    List(Vec<Value>),
    /// 64-bit integer sequence. Not supported on the wire.
    LongArray(Vec<i64>),
    /// Raw binary blob. Not supported on the wire.
    Raw(Vec<u8>),
    /// Complex number. Not supported on the wire.
    Complex { re: f64, im: f64 },
}

impl Value {
    /// Short name of the shape, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Int(_) => "int32",
            Value::Long(_) => "int64",
            Value::Float(_) => "float64",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::BoolArray(_) => "bool array",
            Value::IntArray(_) => "int32 array",
            Value::FloatArray(_) => "float64 array",
            Value::StrArray(_) => "string array",
            Value::Vector(_) => "vector",
            Value::Matrix(_) => "matrix",
            Value::List(_) => "list",
            Value::LongArray(_) => "int64 array",
            Value::Raw(_) => "raw bytes",
            Value::Complex { .. } => "complex",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer scalar that fits in 32 bits.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Byte(b) => Some(i32::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Long(l) => i32::try_from(*l).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(f64::from(*i)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&RemoteObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the handle out of an object value.
    pub fn into_object(self) -> Result<RemoteObject> {
        match self {
            Value::Object(obj) => Ok(obj),
            other => Err(BridgeError::UnexpectedResponse(format!(
                "expected an object, got {}",
                other.type_name()
            ))),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Byte(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BoolArray(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntArray(v)
    }
}

/// A float sequence marshals as an unnamed vector.
impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(Vector::new(v))
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrArray(v)
    }
}

impl From<Vector> for Value {
    fn from(v: Vector) -> Self {
        Value::Vector(v)
    }
}

impl From<Matrix> for Value {
    fn from(v: Matrix) -> Self {
        Value::Matrix(v)
    }
}

impl From<RemoteObject> for Value {
    fn from(v: RemoteObject) -> Self {
        Value::Object(v)
    }
}

impl From<&RemoteObject> for Value {
    fn from(v: &RemoteObject) -> Self {
        Value::Object(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Float64 sequence with optional element names.
///
/// An empty `names` list means the vector is unnamed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl Vector {
    /// Create an unnamed vector.
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            names: Vec::new(),
            values,
        }
    }

    /// Create a named vector; there must be one name per value.
    pub fn named(names: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if !names.is_empty() && names.len() != values.len() {
            return Err(BridgeError::Marshal(format!(
                "vector has {} names for {} values",
                names.len(),
                values.len()
            )));
        }
        Ok(Self { names, values })
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        !self.names.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i).copied())
    }

    /// Consume into the raw values.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

/// Column-major float64 matrix with optional row and column names.
///
/// An empty name list means the names are absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    row_names: Vec<String>,
    col_names: Vec<String>,
}

impl Matrix {
    /// Create a matrix from column-major `data`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(BridgeError::Marshal(format!(
                "matrix {}x{} needs {} values, got {}",
                rows,
                cols,
                rows.saturating_mul(cols),
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            row_names: Vec::new(),
            col_names: Vec::new(),
        })
    }

    /// Create a matrix from row-major rows of equal length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let nrow = rows.len();
        let ncol = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncol) {
            return Err(BridgeError::Marshal("matrix rows differ in length".to_string()));
        }
        let mut data = Vec::with_capacity(nrow * ncol);
        for col in 0..ncol {
            data.extend(rows.iter().map(|r| r[col]));
        }
        Self::new(nrow, ncol, data)
    }

    /// Attach row names; there must be one per row.
    pub fn with_row_names(mut self, names: Vec<String>) -> Result<Self> {
        check_names("row", names.len(), self.rows)?;
        self.row_names = names;
        Ok(self)
    }

    /// Attach column names; there must be one per column.
    pub fn with_col_names(mut self, names: Vec<String>) -> Result<Self> {
        check_names("column", names.len(), self.cols)?;
        self.col_names = names;
        Ok(self)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Column-major values.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    #[inline]
    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    /// Element at (`row`, `col`).
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(col * self.rows + row).copied()
    }

    /// One column as a slice.
    pub fn column(&self, col: usize) -> Option<&[f64]> {
        if col >= self.cols {
            return None;
        }
        let start = col * self.rows;
        self.data.get(start..start + self.rows)
    }
}

fn check_names(axis: &str, names: usize, len: usize) -> Result<()> {
    if names != 0 && names != len {
        return Err(BridgeError::Marshal(format!(
            "{} {} names for {} {}s",
            names, axis, len, axis
        )));
    }
    Ok(())
}

/// Member listing for a remote class.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassTemplate {
    /// Instance property names.
    pub properties: Vec<String>,
    /// Instance method names.
    pub methods: Vec<String>,
    /// Static method names.
    pub static_methods: Vec<String>,
}

impl ClassTemplate {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m == name)
    }

    pub fn has_static_method(&self, name: &str) -> bool {
        self.static_methods.iter().any(|m| m == name)
    }
}
