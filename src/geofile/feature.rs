use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::{
    crs::crs_utils::Crs,
    error::{PipelineError, Result},
};

use super::schema::{parse_cell, FieldType, Schema};

/// A scalar attribute value.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttributeValue {
    /// The type of a non-null value.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Boolean(_) => Some(FieldType::Boolean),
            AttributeValue::Integer(_) => Some(FieldType::Integer),
            AttributeValue::Float(_) => Some(FieldType::Float),
            AttributeValue::Text(_) => Some(FieldType::Text),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(value) => Some(*value as f64),
            AttributeValue::Float(value) => Some(*value),
            AttributeValue::Text(text) => text.trim().parse().ok(),
            AttributeValue::Null | AttributeValue::Boolean(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Convert to `field_type`. Returns `None` when the value cannot be represented in that type.
    pub fn coerce(self, field_type: FieldType) -> Option<AttributeValue> {
        match (self, field_type) {
            (AttributeValue::Null, _) => Some(AttributeValue::Null),
            (AttributeValue::Text(text), field_type) => parse_cell(&text, field_type),
            (value, FieldType::Text) => Some(AttributeValue::Text(value.to_string())),
            (AttributeValue::Integer(value), FieldType::Float) => {
                Some(AttributeValue::Float(value as f64))
            }
            (value, field_type) if value.field_type() == Some(field_type) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Boolean(value) => write!(f, "{}", value),
            AttributeValue::Integer(value) => write!(f, "{}", value),
            AttributeValue::Float(value) => write!(f, "{}", value),
            AttributeValue::Text(value) => f.write_str(value),
        }
    }
}

impl AttributeValue {
    // Floats compare by bit pattern so that equality is reflexive and usable as a hash key.
    fn float_bits(value: f64) -> u64 {
        if value == 0.0 {
            0.0f64.to_bits()
        } else {
            value.to_bits()
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => Self::float_bits(*a) == Self::float_bits(*b),
            (Text(a), Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttributeValue::Null => {}
            AttributeValue::Boolean(value) => value.hash(state),
            AttributeValue::Integer(value) => value.hash(state),
            AttributeValue::Float(value) => Self::float_bits(*value).hash(state),
            AttributeValue::Text(value) => value.hash(state),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

/// One row: attribute values in schema order plus an optional geometry. Identity is positional.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub attributes: Vec<AttributeValue>,
    pub geometry: Option<geo::Geometry>,
}

impl FeatureRecord {
    pub fn new(attributes: Vec<AttributeValue>, geometry: Option<geo::Geometry>) -> Self {
        Self {
            attributes,
            geometry,
        }
    }
}

impl From<geo::Geometry> for FeatureRecord {
    fn from(value: geo::Geometry) -> Self {
        Self {
            attributes: Vec::new(),
            geometry: Some(value),
        }
    }
}

/// Ordered records sharing one schema, tagged with an optional CRS.
#[derive(Debug, Clone)]
pub struct FeatureCollection {
    schema: Schema,
    records: Vec<FeatureRecord>,
    crs: Option<Crs>,
}

impl FeatureCollection {
    /// Create an empty collection.
    pub fn new(schema: Schema, crs: Option<Crs>) -> Self {
        Self {
            schema,
            records: Vec::new(),
            crs,
        }
    }

    pub fn from_records(
        schema: Schema,
        records: Vec<FeatureRecord>,
        crs: Option<Crs>,
    ) -> Result<Self> {
        let mut collection = Self::new(schema, crs);
        collection.records.reserve(records.len());
        for record in records {
            collection.push(record)?;
        }
        Ok(collection)
    }

    pub fn push(&mut self, record: FeatureRecord) -> Result<()> {
        if record.attributes.len() != self.schema.len() {
            return Err(PipelineError::SchemaMismatch(format!(
                "record {} has {} values but the schema has {} columns",
                self.records.len(),
                record.attributes.len(),
                self.schema.len()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[FeatureRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<FeatureRecord> {
        self.records
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value of column `name` in row `row`.
    pub fn value(&self, row: usize, name: &str) -> Result<Option<&AttributeValue>> {
        let column = self.schema.require(name)?;
        Ok(self
            .records
            .get(row)
            .map(|record| &record.attributes[column]))
    }

    /// Geometries of all records. Spatial operations need every record to carry one, so a
    /// collection with any missing geometry is rejected for `operation`.
    pub fn geometries(&self, operation: &'static str) -> Result<Vec<&geo::Geometry>> {
        self.records
            .iter()
            .enumerate()
            .map(|(row, record)| {
                record.geometry.as_ref().ok_or_else(|| {
                    PipelineError::SchemaMismatch(format!(
                        "cannot {} a collection whose record {} has no geometry",
                        operation, row
                    ))
                })
            })
            .collect()
    }

    /// A collection with the same schema and CRS holding the records at `rows`, in that order.
    /// Out-of-range rows are skipped.
    pub fn select_rows(&self, rows: impl IntoIterator<Item = usize>) -> FeatureCollection {
        Self {
            schema: self.schema.clone(),
            records: rows
                .into_iter()
                .filter_map(|row| self.records.get(row).cloned())
                .collect(),
            crs: self.crs.clone(),
        }
    }

    pub(crate) fn with_crs(self, crs: Option<Crs>) -> Self {
        Self { crs, ..self }
    }
}
