use ndarray::{ArrayD, ArrayViewD};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "netcdf")]
pub mod netcdf_store;

pub use memory::MemoryDataset;
#[cfg(feature = "netcdf")]
pub use netcdf_store::{NetCdfReader, NetCdfWriter};

/// Generic error type for dataset readers and writers
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("NetCDF error: {0}")]
    Netcdf(String),

    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Dimension not found: {0}")]
    MissingDimension(String),

    #[error("Attribute not found: {0}")]
    MissingAttribute(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),

    #[error("Shape mismatch for {variable}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for StoreError {
    fn from(err: netcdf::Error) -> Self {
        StoreError::Netcdf(err.to_string())
    }
}

/// Metadata about a variable in the dataset
#[derive(Debug, Clone)]
pub struct VariableInfo {
    /// Variable name
    pub name: String,
    /// Variable dimensions
    pub dimensions: Vec<String>,
    /// Variable shape
    pub shape: Vec<usize>,
    /// Data type
    pub dtype: String,
    /// Units attribute if available
    pub units: Option<String>,
    /// Long name or description if available
    pub long_name: Option<String>,
}

/// Metadata about a dimension in the dataset
#[derive(Debug, Clone)]
pub struct DimensionInfo {
    /// Dimension name
    pub name: String,
    /// Dimension size
    pub size: usize,
    /// Whether this is an unlimited dimension
    pub is_unlimited: bool,
}

/// Global and variable attributes
pub type Attributes = HashMap<String, AttributeValue>;

/// Decode packed values in place: `_FillValue`/`missing_value` become NaN,
/// everything else is scaled by `scale_factor` and shifted by `add_offset`
pub(crate) fn unpack<'a>(values: impl IntoIterator<Item = &'a mut f64>, attrs: &Attributes) {
    let fill = attrs.get("_FillValue").and_then(AttributeValue::as_f64);
    let missing = attrs.get("missing_value").and_then(AttributeValue::as_f64);
    let scale = attrs
        .get("scale_factor")
        .and_then(AttributeValue::as_f64)
        .unwrap_or(1.0);
    let offset = attrs
        .get("add_offset")
        .and_then(AttributeValue::as_f64)
        .unwrap_or(0.0);

    for v in values {
        if Some(*v) == fill || Some(*v) == missing {
            *v = f64::NAN;
        } else {
            *v = *v * scale + offset;
        }
    }
}

/// Supported attribute value types
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i32),
    Float(f32),
    Double(f64),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
}

impl AttributeValue {
    /// Text value, if this is a string attribute
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Scalar numeric value; single-element arrays are accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v as f64),
            AttributeValue::Double(v) => Some(*v),
            AttributeValue::IntArray(v) if v.len() == 1 => Some(v[0] as f64),
            AttributeValue::FloatArray(v) if v.len() == 1 => Some(v[0] as f64),
            AttributeValue::DoubleArray(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Double(value)
    }
}

/// Storage type of a variable created through a [`DataWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    Double,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "i4",
            DataType::Float => "f4",
            DataType::Double => "f8",
            DataType::Text => "str",
        };
        write!(f, "{}", name)
    }
}

/// Declaration of a variable to be created in an output dataset
#[derive(Debug, Clone)]
pub struct VariableSpec {
    pub name: String,
    pub dimensions: Vec<String>,
    pub dtype: DataType,
    pub attributes: Attributes,
}

impl VariableSpec {
    pub fn new(name: &str, dimensions: &[&str], dtype: DataType) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            dtype,
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute<V: Into<AttributeValue>>(mut self, name: &str, value: V) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// Generic trait for reading named multidimensional datasets
///
/// Numeric values are always returned as `f64` with packing
/// (`scale_factor`/`add_offset`) already applied and missing values
/// replaced by NaN.
pub trait DataReader {
    /// Identifier used in error messages, usually the file path
    fn identifier(&self) -> String;

    /// List all available variables in the dataset
    ///
    /// # Returns
    /// * `Result<Vec<String>, StoreError>` - Variable names or error
    fn list_variables(&self) -> Result<Vec<String>, StoreError>;

    /// Get detailed information about a specific variable
    ///
    /// # Arguments
    /// * `variable_name` - Name of the variable
    ///
    /// # Returns
    /// * `Result<VariableInfo, StoreError>` - Variable metadata or error
    fn get_variable_info(&self, variable_name: &str) -> Result<VariableInfo, StoreError>;

    /// List all dimensions in the dataset
    fn list_dimensions(&self) -> Result<Vec<String>, StoreError>;

    /// Get information about a specific dimension
    ///
    /// # Arguments
    /// * `dimension_name` - Name of the dimension
    ///
    /// # Returns
    /// * `Result<DimensionInfo, StoreError>` - Dimension metadata or error
    fn get_dimension_info(&self, dimension_name: &str) -> Result<DimensionInfo, StoreError>;

    /// Read a hyperslab of a variable
    ///
    /// # Arguments
    /// * `variable_name` - Name of the variable to read
    /// * `ranges` - One index range per variable dimension
    ///
    /// # Returns
    /// * `Result<ArrayD<f64>, StoreError>` - Array shaped by the range lengths
    fn read_variable_slice(
        &self,
        variable_name: &str,
        ranges: &[Range<usize>],
    ) -> Result<ArrayD<f64>, StoreError>;

    /// Read a complete variable
    fn read_variable(&self, variable_name: &str) -> Result<ArrayD<f64>, StoreError> {
        let info = self.get_variable_info(variable_name)?;
        let ranges: Vec<Range<usize>> = info.shape.iter().map(|&n| 0..n).collect();
        self.read_variable_slice(variable_name, &ranges)
    }

    /// Read a one-dimensional string variable
    fn read_strings(&self, variable_name: &str) -> Result<Vec<String>, StoreError>;

    /// Get attributes for a specific variable
    fn get_variable_attributes(&self, variable_name: &str) -> Result<Attributes, StoreError>;

    /// Get global attributes of the dataset
    fn get_global_attributes(&self) -> Result<Attributes, StoreError>;

    /// Get a specific variable attribute value
    ///
    /// # Arguments
    /// * `variable_name` - Name of the variable
    /// * `attribute_name` - Name of the attribute
    fn get_variable_attribute(
        &self,
        variable_name: &str,
        attribute_name: &str,
    ) -> Result<AttributeValue, StoreError> {
        self.get_variable_attributes(variable_name)?
            .remove(attribute_name)
            .ok_or_else(|| {
                StoreError::MissingAttribute(format!("{}:{}", variable_name, attribute_name))
            })
    }

    /// Check if a variable exists in the dataset
    fn has_variable(&self, variable_name: &str) -> bool {
        self.list_variables()
            .map(|vars| vars.iter().any(|v| v == variable_name))
            .unwrap_or(false)
    }
}

/// Generic trait for writing datasets that grow along one unlimited dimension
pub trait DataWriter {
    /// Identifier used in error messages, usually the file path
    fn identifier(&self) -> String;

    /// Declare a dimension; `None` declares the unlimited dimension
    fn add_dimension(&mut self, name: &str, len: Option<usize>) -> Result<(), StoreError>;

    /// Declare a variable with its attributes
    fn add_variable(&mut self, spec: &VariableSpec) -> Result<(), StoreError>;

    /// Set a global attribute
    fn put_global_attribute(&mut self, name: &str, value: AttributeValue) -> Result<(), StoreError>;

    /// Write a block of values starting at `offset`, one entry per dimension.
    /// Writing past the end of the unlimited dimension extends it.
    fn put_values(
        &mut self,
        variable_name: &str,
        offset: &[usize],
        data: ArrayViewD<'_, f64>,
    ) -> Result<(), StoreError>;

    /// Write a one-dimensional string variable
    fn put_strings(&mut self, variable_name: &str, values: &[String]) -> Result<(), StoreError>;

    /// Flush pending writes
    fn sync(&mut self) -> Result<(), StoreError>;

    /// Throw away everything written so far (removes files on disk)
    fn discard(&mut self) -> Result<(), StoreError>;
}

impl<W: DataWriter + ?Sized> DataWriter for &mut W {
    fn identifier(&self) -> String {
        (**self).identifier()
    }

    fn add_dimension(&mut self, name: &str, len: Option<usize>) -> Result<(), StoreError> {
        (**self).add_dimension(name, len)
    }

    fn add_variable(&mut self, spec: &VariableSpec) -> Result<(), StoreError> {
        (**self).add_variable(spec)
    }

    fn put_global_attribute(&mut self, name: &str, value: AttributeValue) -> Result<(), StoreError> {
        (**self).put_global_attribute(name, value)
    }

    fn put_values(
        &mut self,
        variable_name: &str,
        offset: &[usize],
        data: ArrayViewD<'_, f64>,
    ) -> Result<(), StoreError> {
        (**self).put_values(variable_name, offset, data)
    }

    fn put_strings(&mut self, variable_name: &str, values: &[String]) -> Result<(), StoreError> {
        (**self).put_strings(variable_name, values)
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        (**self).sync()
    }

    fn discard(&mut self) -> Result<(), StoreError> {
        (**self).discard()
    }
}

/// Check whether the file starts with NetCDF classic or HDF5 magic bytes
pub fn is_netcdf_format<P: AsRef<std::path::Path>>(path: P) -> bool {
    use std::io::Read;

    let mut buffer = [0u8; 8];
    let Ok(mut file) = std::fs::File::open(path.as_ref()) else {
        return false;
    };
    if file.read_exact(&mut buffer).is_err() {
        return false;
    }
    buffer.starts_with(b"CDF\x01")
        || buffer.starts_with(b"CDF\x02")
        || buffer.starts_with(b"CDF\x05")
        || buffer.starts_with(b"\x89HDF\r\n\x1a\n")
}
