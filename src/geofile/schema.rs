use std::{collections::BTreeMap, fmt};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

use super::feature::AttributeValue;

/// Semantic type of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Integer => "Integer",
            FieldType::Float => "Float",
            FieldType::Boolean => "Boolean",
        }
    }

    /// The narrowest type that can hold values of both `self` and `other`, if any.
    pub fn widen(self, other: FieldType) -> Option<FieldType> {
        use FieldType::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Integer, Float) | (Float, Integer) => Some(Float),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered column schema shared by every record of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut schema = Schema::default();
        for field in fields {
            schema.push(field)?;
        }
        Ok(schema)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    /// Like `index_of`, failing with `ColumnMissing` for unknown columns.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| PipelineError::ColumnMissing(name.to_string()))
    }

    pub fn push(&mut self, field: Field) -> Result<()> {
        if self.index_of(&field.name).is_some() {
            return Err(PipelineError::SchemaMismatch(format!(
                "duplicate column '{}'",
                field.name
            )));
        }
        self.fields.push(field);
        Ok(())
    }

    pub(crate) fn set_field_type(&mut self, index: usize, field_type: FieldType) {
        self.fields[index].field_type = field_type;
    }
}

/// Column types declared by the caller, checked when a file is loaded.
pub type DeclaredSchema = BTreeMap<String, FieldType>;

/// Infer the type of a delimited-text column from its raw cells. Empty cells are ignored; a column
/// without any non-empty cell is Text.
pub fn infer_field_type<'a>(cells: impl IntoIterator<Item = &'a str>) -> FieldType {
    let mut inferred: Option<FieldType> = None;
    for cell in cells {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let cell_type = if cell.parse::<i64>().is_ok() {
            FieldType::Integer
        } else if cell.parse::<f64>().is_ok() {
            FieldType::Float
        } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
            FieldType::Boolean
        } else {
            return FieldType::Text;
        };
        inferred = match inferred {
            None => Some(cell_type),
            Some(current) => match current.widen(cell_type) {
                Some(widened) => Some(widened),
                None => return FieldType::Text,
            },
        };
    }
    inferred.unwrap_or(FieldType::Text)
}

/// Parse a raw cell as `field_type`. Empty cells become Null; `None` means the cell does not parse.
pub fn parse_cell(cell: &str, field_type: FieldType) -> Option<AttributeValue> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(AttributeValue::Null);
    }
    match field_type {
        FieldType::Text => Some(AttributeValue::Text(cell.to_string())),
        FieldType::Integer => cell.parse().ok().map(AttributeValue::Integer),
        FieldType::Float => cell.parse().ok().map(AttributeValue::Float),
        FieldType::Boolean => {
            if cell.eq_ignore_ascii_case("true") {
                Some(AttributeValue::Boolean(true))
            } else if cell.eq_ignore_ascii_case("false") {
                Some(AttributeValue::Boolean(false))
            } else {
                None
            }
        }
    }
}

/// Find a common type for already-typed values (e.g. GeoJSON properties) and convert them to it.
/// Mixed numeric columns become Float, any other mix becomes Text.
pub fn unify_values(values: Vec<AttributeValue>) -> (FieldType, Vec<AttributeValue>) {
    let mut unified: Option<FieldType> = None;
    for value in &values {
        let Some(value_type) = value.field_type() else {
            continue;
        };
        unified = Some(match unified {
            None => value_type,
            Some(current) => current.widen(value_type).unwrap_or(FieldType::Text),
        });
    }
    let field_type = unified.unwrap_or(FieldType::Text);
    let values = values
        .into_iter()
        .map(|value| value.coerce(field_type).unwrap_or(AttributeValue::Null))
        .collect();
    (field_type, values)
}
