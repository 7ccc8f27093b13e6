use super::{
    unpack, AttributeValue, Attributes, DataReader, DataType, DataWriter, DimensionInfo, StoreError,
    VariableInfo, VariableSpec,
};
use ndarray::{ArrayD, ArrayViewD, IxDyn, Slice};
use std::ops::Range;

#[derive(Debug, Clone)]
struct MemoryVariable {
    name: String,
    dimensions: Vec<String>,
    dtype: DataType,
    attributes: Attributes,
    data: ArrayD<f64>,
    strings: Vec<String>,
}

/// Dataset held entirely in memory.
///
/// Implements both [`DataReader`] and [`DataWriter`], so the output of one
/// pipeline stage can be handed straight to the next without touching disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    name: String,
    dimensions: Vec<DimensionInfo>,
    variables: Vec<MemoryVariable>,
    global_attributes: Attributes,
    discarded: bool,
}

impl MemoryDataset {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Insert a fully populated numeric variable, declaring missing dimensions
    /// from the array shape.
    pub fn insert_variable(
        &mut self,
        name: &str,
        dimensions: &[&str],
        data: ArrayD<f64>,
    ) -> Result<(), StoreError> {
        if dimensions.len() != data.ndim() {
            return Err(StoreError::ShapeMismatch {
                variable: name.to_string(),
                expected: vec![dimensions.len()],
                found: vec![data.ndim()],
            });
        }
        for (dim, &len) in dimensions.iter().zip(data.shape()) {
            match self.dimension_mut(dim) {
                Some(existing) if existing.is_unlimited => {
                    existing.size = existing.size.max(len);
                }
                Some(existing) if existing.size != len => {
                    return Err(StoreError::ShapeMismatch {
                        variable: name.to_string(),
                        expected: vec![existing.size],
                        found: vec![len],
                    });
                }
                Some(_) => {}
                None => self.dimensions.push(DimensionInfo {
                    name: dim.to_string(),
                    size: len,
                    is_unlimited: false,
                }),
            }
        }
        self.variables.retain(|v| v.name != name);
        self.variables.push(MemoryVariable {
            name: name.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            dtype: DataType::Double,
            attributes: Attributes::new(),
            data,
            strings: Vec::new(),
        });
        Ok(())
    }

    /// Set (or replace) an attribute on an existing variable
    pub fn set_attribute<V: Into<AttributeValue>>(
        &mut self,
        variable_name: &str,
        attribute_name: &str,
        value: V,
    ) -> Result<(), StoreError> {
        let var = self.variable_mut(variable_name)?;
        var.attributes.insert(attribute_name.to_string(), value.into());
        Ok(())
    }

    /// Borrow the values of a numeric variable
    pub fn variable_data(&self, variable_name: &str) -> Option<&ArrayD<f64>> {
        self.variables
            .iter()
            .find(|v| v.name == variable_name)
            .map(|v| &v.data)
    }

    /// True once [`DataWriter::discard`] has been called
    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    fn dimension_mut(&mut self, name: &str) -> Option<&mut DimensionInfo> {
        self.dimensions.iter_mut().find(|d| d.name == name)
    }

    fn variable(&self, name: &str) -> Result<&MemoryVariable, StoreError> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| StoreError::MissingVariable(name.to_string()))
    }

    fn variable_mut(&mut self, name: &str) -> Result<&mut MemoryVariable, StoreError> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| StoreError::MissingVariable(name.to_string()))
    }
}

impl DataReader for MemoryDataset {
    fn identifier(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn list_variables(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.variables.iter().map(|v| v.name.clone()).collect())
    }

    fn get_variable_info(&self, variable_name: &str) -> Result<VariableInfo, StoreError> {
        let var = self.variable(variable_name)?;
        let shape = match var.dtype {
            DataType::Text => vec![var.strings.len()],
            _ => var.data.shape().to_vec(),
        };
        Ok(VariableInfo {
            name: var.name.clone(),
            dimensions: var.dimensions.clone(),
            shape,
            dtype: var.dtype.to_string(),
            units: var
                .attributes
                .get("units")
                .and_then(|a| a.as_str())
                .map(str::to_string),
            long_name: var
                .attributes
                .get("long_name")
                .and_then(|a| a.as_str())
                .map(str::to_string),
        })
    }

    fn list_dimensions(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.dimensions.iter().map(|d| d.name.clone()).collect())
    }

    fn get_dimension_info(&self, dimension_name: &str) -> Result<DimensionInfo, StoreError> {
        self.dimensions
            .iter()
            .find(|d| d.name == dimension_name)
            .cloned()
            .ok_or_else(|| StoreError::MissingDimension(dimension_name.to_string()))
    }

    fn read_variable_slice(
        &self,
        variable_name: &str,
        ranges: &[Range<usize>],
    ) -> Result<ArrayD<f64>, StoreError> {
        let var = self.variable(variable_name)?;
        let shape = var.data.shape();
        let in_bounds = ranges.len() == shape.len()
            && ranges
                .iter()
                .zip(shape)
                .all(|(r, &n)| r.start <= r.end && r.end <= n);
        if !in_bounds {
            return Err(StoreError::ShapeMismatch {
                variable: variable_name.to_string(),
                expected: shape.to_vec(),
                found: ranges.iter().map(|r| r.end).collect(),
            });
        }
        let mut values = var
            .data
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned();
        unpack(values.iter_mut(), &var.attributes);
        Ok(values)
    }

    fn read_strings(&self, variable_name: &str) -> Result<Vec<String>, StoreError> {
        let var = self.variable(variable_name)?;
        match var.dtype {
            DataType::Text => Ok(var.strings.clone()),
            _ => Err(StoreError::ConversionError(format!(
                "{} is not a string variable",
                variable_name
            ))),
        }
    }

    fn get_variable_attributes(&self, variable_name: &str) -> Result<Attributes, StoreError> {
        Ok(self.variable(variable_name)?.attributes.clone())
    }

    fn get_global_attributes(&self) -> Result<Attributes, StoreError> {
        Ok(self.global_attributes.clone())
    }
}

impl DataWriter for MemoryDataset {
    fn identifier(&self) -> String {
        DataReader::identifier(self)
    }

    fn add_dimension(&mut self, name: &str, len: Option<usize>) -> Result<(), StoreError> {
        if self.dimensions.iter().any(|d| d.name == name) {
            return Err(StoreError::UnsupportedOperation(format!(
                "dimension {} already defined",
                name
            )));
        }
        self.dimensions.push(DimensionInfo {
            name: name.to_string(),
            size: len.unwrap_or(0),
            is_unlimited: len.is_none(),
        });
        Ok(())
    }

    fn add_variable(&mut self, spec: &VariableSpec) -> Result<(), StoreError> {
        if self.variables.iter().any(|v| v.name == spec.name) {
            return Err(StoreError::UnsupportedOperation(format!(
                "variable {} already defined",
                spec.name
            )));
        }
        let mut shape = Vec::with_capacity(spec.dimensions.len());
        for dim in &spec.dimensions {
            let info = self.get_dimension_info(dim)?;
            shape.push(info.size);
        }
        self.variables.push(MemoryVariable {
            name: spec.name.clone(),
            dimensions: spec.dimensions.clone(),
            dtype: spec.dtype,
            attributes: spec.attributes.clone(),
            data: ArrayD::from_elem(IxDyn(&shape), f64::NAN),
            strings: Vec::new(),
        });
        Ok(())
    }

    fn put_global_attribute(&mut self, name: &str, value: AttributeValue) -> Result<(), StoreError> {
        self.global_attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn put_values(
        &mut self,
        variable_name: &str,
        offset: &[usize],
        data: ArrayViewD<'_, f64>,
    ) -> Result<(), StoreError> {
        let var = self.variable(variable_name)?;
        if offset.len() != var.data.ndim() || data.ndim() != var.data.ndim() {
            return Err(StoreError::ShapeMismatch {
                variable: variable_name.to_string(),
                expected: var.data.shape().to_vec(),
                found: data.shape().to_vec(),
            });
        }

        let current = var.data.shape().to_vec();
        let mut required = current.clone();
        for (axis, dim) in var.dimensions.clone().iter().enumerate() {
            let end = offset[axis] + data.shape()[axis];
            if end > current[axis] {
                let unlimited = self.get_dimension_info(dim)?.is_unlimited;
                if !unlimited {
                    return Err(StoreError::ShapeMismatch {
                        variable: variable_name.to_string(),
                        expected: current.clone(),
                        found: data.shape().to_vec(),
                    });
                }
                required[axis] = end;
                if let Some(info) = self.dimension_mut(dim) {
                    info.size = info.size.max(end);
                }
            }
        }

        let var = self.variable_mut(variable_name)?;
        if required != current {
            let mut grown = ArrayD::from_elem(IxDyn(&required), f64::NAN);
            grown
                .slice_each_axis_mut(|ax| Slice::from(0..current[ax.axis.index()]))
                .assign(&var.data);
            var.data = grown;
        }
        var.data
            .slice_each_axis_mut(|ax| {
                let i = ax.axis.index();
                Slice::from(offset[i]..offset[i] + data.shape()[i])
            })
            .assign(&data);
        Ok(())
    }

    fn put_strings(&mut self, variable_name: &str, values: &[String]) -> Result<(), StoreError> {
        let var = self.variable_mut(variable_name)?;
        if var.dtype != DataType::Text {
            return Err(StoreError::ConversionError(format!(
                "{} is not a string variable",
                variable_name
            )));
        }
        var.strings = values.to_vec();
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn discard(&mut self) -> Result<(), StoreError> {
        self.dimensions.clear();
        self.variables.clear();
        self.global_attributes.clear();
        self.discarded = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_insert_and_slice() {
        let mut ds = MemoryDataset::new("grid");
        let data = Array2::from_shape_fn((3, 4), |(i, j)| (i * 10 + j) as f64).into_dyn();
        ds.insert_variable("t2m", &["time", "station"], data).unwrap();
        ds.set_attribute("t2m", "units", "K").unwrap();

        let slice = ds.read_variable_slice("t2m", &[1..3, 2..4]).unwrap();
        assert_eq!(slice.shape(), &[2, 2]);
        assert_eq!(slice[[0, 0]], 12.0);
        assert_eq!(slice[[1, 1]], 23.0);

        let info = ds.get_variable_info("t2m").unwrap();
        assert_eq!(info.units.as_deref(), Some("K"));
        assert_eq!(info.shape, vec![3, 4]);
    }

    #[test]
    fn test_slice_decodes_fill_and_packing() {
        let mut ds = MemoryDataset::new("series");
        ds.insert_variable("t2m", &["station"], array![280.0, -9999.0, 10.0].into_dyn())
            .unwrap();
        ds.set_attribute("t2m", "_FillValue", -9999.0f32).unwrap();
        ds.insert_variable("tp", &["station"], array![4.0, -1.0].into_dyn())
            .unwrap();
        ds.set_attribute("tp", "scale_factor", 0.5).unwrap();
        ds.set_attribute("tp", "add_offset", 1.0).unwrap();
        ds.set_attribute("tp", "missing_value", -1).unwrap();

        let t2m = ds.read_variable_slice("t2m", &[0..3]).unwrap();
        assert_eq!(t2m[[0]], 280.0);
        assert!(t2m[[1]].is_nan());
        assert_eq!(t2m[[2]], 10.0);
        let tp = ds.read_variable_slice("tp", &[0..2]).unwrap();
        assert_eq!(tp[[0]], 3.0);
        assert!(tp[[1]].is_nan());
        // stored values stay untouched
        assert_eq!(ds.variable_data("t2m").unwrap()[[1]], -9999.0);
    }

    #[test]
    fn test_inconsistent_dimension_rejected() {
        let mut ds = MemoryDataset::new("grid");
        ds.insert_variable("a", &["x"], array![1.0, 2.0].into_dyn()).unwrap();
        let err = ds.insert_variable("b", &["x"], array![1.0, 2.0, 3.0].into_dyn());
        assert!(matches!(err, Err(StoreError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_append_along_unlimited_dimension() {
        let mut ds = MemoryDataset::new("out");
        ds.add_dimension("time", None).unwrap();
        ds.add_dimension("station", Some(2)).unwrap();
        ds.add_variable(&VariableSpec::new("v", &["time", "station"], DataType::Float))
            .unwrap();

        ds.put_values("v", &[0, 0], array![[1.0, 2.0]].into_dyn().view())
            .unwrap();
        ds.put_values("v", &[1, 0], array![[3.0, 4.0], [5.0, 6.0]].into_dyn().view())
            .unwrap();

        assert_eq!(ds.get_dimension_info("time").unwrap().size, 3);
        let v = ds.variable_data("v").unwrap();
        assert_eq!(v.shape(), &[3, 2]);
        assert_eq!(v[[2, 1]], 6.0);
    }

    #[test]
    fn test_fixed_dimension_cannot_grow() {
        let mut ds = MemoryDataset::new("out");
        ds.add_dimension("station", Some(1)).unwrap();
        ds.add_variable(&VariableSpec::new("v", &["station"], DataType::Float))
            .unwrap();
        let err = ds.put_values("v", &[0], array![1.0, 2.0].into_dyn().view());
        assert!(matches!(err, Err(StoreError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_discard_clears_everything() {
        let mut ds = MemoryDataset::new("out");
        ds.add_dimension("time", None).unwrap();
        ds.put_global_attribute("Conventions", "CF-1.6".into()).unwrap();
        ds.discard().unwrap();
        assert!(ds.is_discarded());
        assert!(ds.list_dimensions().unwrap().is_empty());
        assert!(ds.get_global_attributes().unwrap().is_empty());
    }

    #[test]
    fn test_strings_roundtrip_through_text_variable() {
        let mut ds = MemoryDataset::new("out");
        ds.add_dimension("station", Some(2)).unwrap();
        ds.add_variable(&VariableSpec::new("station_name", &["station"], DataType::Text))
            .unwrap();
        let names = vec!["Alpha".to_string(), "Beta".to_string()];
        ds.put_strings("station_name", &names).unwrap();
        assert_eq!(ds.read_strings("station_name").unwrap(), names);
        assert!(ds.put_strings("missing", &names).is_err());
    }
}
