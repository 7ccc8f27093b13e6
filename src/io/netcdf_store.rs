use super::{
    unpack, AttributeValue, Attributes, DataReader, DataType, DataWriter, DimensionInfo, StoreError,
    VariableInfo, VariableSpec,
};
use log::{debug, warn};
use ndarray::{ArrayD, ArrayViewD, IxDyn};
use std::ops::Range;
use std::path::{Path, PathBuf};

fn convert_attribute(value: netcdf::AttributeValue) -> Option<AttributeValue> {
    use netcdf::AttributeValue as Nc;
    match value {
        Nc::Str(s) => Some(AttributeValue::String(s)),
        Nc::Strs(mut s) if s.len() == 1 => s.pop().map(AttributeValue::String),
        Nc::Schar(v) => Some(AttributeValue::Int(v as i32)),
        Nc::Uchar(v) => Some(AttributeValue::Int(v as i32)),
        Nc::Short(v) => Some(AttributeValue::Int(v as i32)),
        Nc::Ushort(v) => Some(AttributeValue::Int(v as i32)),
        Nc::Int(v) => Some(AttributeValue::Int(v)),
        Nc::Shorts(v) => Some(AttributeValue::IntArray(v.into_iter().map(i32::from).collect())),
        Nc::Ints(v) => Some(AttributeValue::IntArray(v)),
        Nc::Float(v) => Some(AttributeValue::Float(v)),
        Nc::Floats(v) => Some(AttributeValue::FloatArray(v)),
        Nc::Double(v) => Some(AttributeValue::Double(v)),
        Nc::Doubles(v) => Some(AttributeValue::DoubleArray(v)),
        _ => None,
    }
}

fn collect_attributes<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> Attributes {
    let mut out = Attributes::new();
    for attr in attrs {
        let name = attr.name().to_string();
        match attr.value().ok().and_then(convert_attribute) {
            Some(value) => {
                out.insert(name, value);
            }
            None => debug!("Skipping attribute {} with unsupported type", name),
        }
    }
    out
}

/// Read a hyperslab as `f64`. Tuples of ranges are the extents form the
/// `netcdf` crate accepts for fixed ranks.
fn get_slab(var: &netcdf::Variable<'_>, ranges: &[Range<usize>]) -> Result<Vec<f64>, StoreError> {
    let values = match ranges {
        [] => var.get_values::<f64, _>(..)?,
        [a] => var.get_values::<f64, _>([a.clone()])?,
        [a, b] => var.get_values::<f64, _>((a.clone(), b.clone()))?,
        [a, b, c] => var.get_values::<f64, _>((a.clone(), b.clone(), c.clone()))?,
        [a, b, c, d] => {
            var.get_values::<f64, _>((a.clone(), b.clone(), c.clone(), d.clone()))?
        }
        _ => {
            return Err(StoreError::UnsupportedOperation(format!(
                "{}-dimensional reads of {}",
                ranges.len(),
                var.name()
            )))
        }
    };
    Ok(values)
}

/// Apply CF packing and missing-value conventions in place
/// Read-only NetCDF dataset
pub struct NetCdfReader {
    path: PathBuf,
    file: netcdf::File,
}

impl NetCdfReader {
    /// Open an existing NetCDF file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::FileNotFound(path.display().to_string()));
        }
        let file = netcdf::open(path)?;
        debug!("Opened NetCDF file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn variable(&self, name: &str) -> Result<netcdf::Variable<'_>, StoreError> {
        self.file
            .variable(name)
            .ok_or_else(|| StoreError::MissingVariable(name.to_string()))
    }
}

impl DataReader for NetCdfReader {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn list_variables(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.file.variables().map(|v| v.name()).collect())
    }

    fn get_variable_info(&self, variable_name: &str) -> Result<VariableInfo, StoreError> {
        let var = self.variable(variable_name)?;
        let attrs = collect_attributes(var.attributes());
        Ok(VariableInfo {
            name: var.name(),
            dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
            dtype: format!("{:?}", var.vartype()),
            units: attrs
                .get("units")
                .and_then(AttributeValue::as_str)
                .map(str::to_string),
            long_name: attrs
                .get("long_name")
                .and_then(AttributeValue::as_str)
                .map(str::to_string),
        })
    }

    fn list_dimensions(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.file.dimensions().map(|d| d.name()).collect())
    }

    fn get_dimension_info(&self, dimension_name: &str) -> Result<DimensionInfo, StoreError> {
        let dim = self
            .file
            .dimension(dimension_name)
            .ok_or_else(|| StoreError::MissingDimension(dimension_name.to_string()))?;
        Ok(DimensionInfo {
            name: dim.name(),
            size: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
    }

    fn read_variable_slice(
        &self,
        variable_name: &str,
        ranges: &[Range<usize>],
    ) -> Result<ArrayD<f64>, StoreError> {
        let var = self.variable(variable_name)?;
        let dims = var.dimensions();
        if ranges.len() != dims.len() {
            return Err(StoreError::ShapeMismatch {
                variable: variable_name.to_string(),
                expected: dims.iter().map(|d| d.len()).collect(),
                found: ranges.iter().map(|r| r.end).collect(),
            });
        }

        let mut values = get_slab(&var, ranges)?;
        unpack(&mut values, &collect_attributes(var.attributes()));

        let shape: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            StoreError::ConversionError(format!("{} in {}: {}", variable_name, self.identifier(), e))
        })
    }

    fn read_strings(&self, variable_name: &str) -> Result<Vec<String>, StoreError> {
        let var = self.variable(variable_name)?;
        let len = var.dimensions().first().map(|d| d.len()).unwrap_or(0);
        (0..len)
            .map(|i| var.get_string([i]).map_err(StoreError::from))
            .collect()
    }

    fn get_variable_attributes(&self, variable_name: &str) -> Result<Attributes, StoreError> {
        let var = self.variable(variable_name)?;
        Ok(collect_attributes(var.attributes()))
    }

    fn get_global_attributes(&self) -> Result<Attributes, StoreError> {
        Ok(collect_attributes(self.file.attributes()))
    }
}

/// NetCDF file opened for writing.
///
/// `discard` closes the handle and deletes the file.
pub struct NetCdfWriter {
    path: PathBuf,
    file: Option<netcdf::FileMut>,
    dtypes: Vec<(String, DataType)>,
}

impl NetCdfWriter {
    /// Create (or truncate) a NetCDF file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if path.exists() {
            warn!("Output file {} already exists and will be replaced", path.display());
        }
        let file = netcdf::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            dtypes: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> Result<&mut netcdf::FileMut, StoreError> {
        self.file.as_mut().ok_or_else(|| {
            StoreError::UnsupportedOperation(format!("{} has been discarded", self.path.display()))
        })
    }

    fn dtype(&self, name: &str) -> Result<DataType, StoreError> {
        self.dtypes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
            .ok_or_else(|| StoreError::MissingVariable(name.to_string()))
    }
}

fn put_attribute(var: &mut netcdf::VariableMut<'_>, name: &str, value: &AttributeValue) -> Result<(), StoreError> {
    match value {
        AttributeValue::String(s) => var.put_attribute(name, s.as_str())?,
        AttributeValue::Int(v) => var.put_attribute(name, *v)?,
        AttributeValue::Float(v) => var.put_attribute(name, *v)?,
        AttributeValue::Double(v) => var.put_attribute(name, *v)?,
        AttributeValue::IntArray(v) => var.put_attribute(name, v.clone())?,
        AttributeValue::FloatArray(v) => var.put_attribute(name, v.clone())?,
        AttributeValue::DoubleArray(v) => var.put_attribute(name, v.clone())?,
    };
    Ok(())
}

fn put_slab<T>(var: &mut netcdf::VariableMut<'_>, data: &[T], ranges: &[Range<usize>]) -> Result<(), StoreError>
where
    T: netcdf::NcTypeDescriptor + Copy,
{
    match ranges {
        [a] => var.put_values(data, [a.clone()])?,
        [a, b] => var.put_values(data, (a.clone(), b.clone()))?,
        [a, b, c] => var.put_values(data, (a.clone(), b.clone(), c.clone()))?,
        [a, b, c, d] => var.put_values(data, (a.clone(), b.clone(), c.clone(), d.clone()))?,
        _ => {
            return Err(StoreError::UnsupportedOperation(format!(
                "{}-dimensional writes",
                ranges.len()
            )))
        }
    };
    Ok(())
}

impl DataWriter for NetCdfWriter {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn add_dimension(&mut self, name: &str, len: Option<usize>) -> Result<(), StoreError> {
        let file = self.file_mut()?;
        match len {
            Some(n) => file.add_dimension(name, n)?,
            None => file.add_unlimited_dimension(name)?,
        };
        Ok(())
    }

    fn add_variable(&mut self, spec: &VariableSpec) -> Result<(), StoreError> {
        let dims: Vec<&str> = spec.dimensions.iter().map(String::as_str).collect();
        let file = self.file_mut()?;
        let mut var = match spec.dtype {
            DataType::Int => file.add_variable::<i32>(&spec.name, &dims)?,
            DataType::Float => file.add_variable::<f32>(&spec.name, &dims)?,
            DataType::Double => file.add_variable::<f64>(&spec.name, &dims)?,
            DataType::Text => file.add_string_variable(&spec.name, &dims)?,
        };
        // _FillValue has to match the variable type
        let mut names: Vec<&String> = spec.attributes.keys().collect();
        names.sort();
        for name in names {
            let value = &spec.attributes[name];
            match (name.as_str(), spec.dtype, value.as_f64()) {
                ("_FillValue" | "missing_value", DataType::Float, Some(v)) => {
                    var.put_attribute(name, v as f32)?;
                }
                ("_FillValue" | "missing_value", DataType::Int, Some(v)) => {
                    var.put_attribute(name, v as i32)?;
                }
                _ => put_attribute(&mut var, name, value)?,
            }
        }
        self.dtypes.push((spec.name.clone(), spec.dtype));
        Ok(())
    }

    fn put_global_attribute(&mut self, name: &str, value: AttributeValue) -> Result<(), StoreError> {
        let file = self.file_mut()?;
        match value {
            AttributeValue::String(s) => file.add_attribute(name, s)?,
            AttributeValue::Int(v) => file.add_attribute(name, v)?,
            AttributeValue::Float(v) => file.add_attribute(name, v)?,
            AttributeValue::Double(v) => file.add_attribute(name, v)?,
            AttributeValue::IntArray(v) => file.add_attribute(name, v)?,
            AttributeValue::FloatArray(v) => file.add_attribute(name, v)?,
            AttributeValue::DoubleArray(v) => file.add_attribute(name, v)?,
        };
        Ok(())
    }

    fn put_values(
        &mut self,
        variable_name: &str,
        offset: &[usize],
        data: ArrayViewD<'_, f64>,
    ) -> Result<(), StoreError> {
        let dtype = self.dtype(variable_name)?;
        let ranges: Vec<Range<usize>> = offset
            .iter()
            .zip(data.shape())
            .map(|(&o, &n)| o..o + n)
            .collect();
        if ranges.len() != data.ndim() {
            return Err(StoreError::ShapeMismatch {
                variable: variable_name.to_string(),
                expected: vec![data.ndim()],
                found: vec![offset.len()],
            });
        }
        let file = self.file_mut()?;
        let mut var = file
            .variable_mut(variable_name)
            .ok_or_else(|| StoreError::MissingVariable(variable_name.to_string()))?;

        match dtype {
            DataType::Int => {
                let values: Vec<i32> = data.iter().map(|v| v.round() as i32).collect();
                put_slab(&mut var, &values, &ranges)
            }
            DataType::Float => {
                let values: Vec<f32> = data.iter().map(|&v| v as f32).collect();
                put_slab(&mut var, &values, &ranges)
            }
            DataType::Double => {
                let values: Vec<f64> = data.iter().copied().collect();
                put_slab(&mut var, &values, &ranges)
            }
            DataType::Text => Err(StoreError::ConversionError(format!(
                "{} is a string variable",
                variable_name
            ))),
        }
    }

    fn put_strings(&mut self, variable_name: &str, values: &[String]) -> Result<(), StoreError> {
        let file = self.file_mut()?;
        let mut var = file
            .variable_mut(variable_name)
            .ok_or_else(|| StoreError::MissingVariable(variable_name.to_string()))?;
        for (i, value) in values.iter().enumerate() {
            var.put_string(value, [i])?;
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        // Dropping the handle flushes and closes the file
        self.file.take();
        Ok(())
    }

    fn discard(&mut self) -> Result<(), StoreError> {
        self.file.take();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            warn!("Removed incomplete output {}", self.path.display());
        }
        Ok(())
    }
}
