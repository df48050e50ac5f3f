use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    crs::normalize::{collections_share_crs, describe_crs},
    error::{PipelineError, Result},
    geofile::{
        feature::{AttributeValue, FeatureCollection, FeatureRecord},
        schema::{Field, Schema},
    },
};

use super::points::{points_from_columns, CoordinateColumns};

/// Column names of the harmonized node set built by `endpoints_to_nodes`.
pub const NODE_NAME_COLUMN: &str = "name";
pub const NODE_X_COLUMN: &str = "lon";
pub const NODE_Y_COLUMN: &str = "lat";

/// Keep only the columns named in `mapping`, in mapping order, renamed from the first to the
/// second name of each pair.
pub fn select_and_rename(
    collection: &FeatureCollection,
    mapping: &[(&str, &str)],
) -> Result<FeatureCollection> {
    let mut schema = Schema::default();
    let mut source_columns = Vec::with_capacity(mapping.len());
    for (from, to) in mapping {
        let column = collection.schema().require(from)?;
        schema.push(Field::new(
            *to,
            collection.schema().fields()[column].field_type,
        ))?;
        source_columns.push(column);
    }

    let records = collection
        .records()
        .iter()
        .map(|record| {
            FeatureRecord::new(
                source_columns
                    .iter()
                    .map(|column| record.attributes[*column].clone())
                    .collect(),
                record.geometry.clone(),
            )
        })
        .collect();
    FeatureCollection::from_records(schema, records, collection.crs().cloned())
}

/// Concatenate two collections with the same column names, in the same order, and the same CRS.
/// Integer and Float columns are unified to Float.
pub fn union(a: &FeatureCollection, b: &FeatureCollection) -> Result<FeatureCollection> {
    let a_names: Vec<&str> = a.schema().names().collect();
    let b_names: Vec<&str> = b.schema().names().collect();
    if a_names != b_names {
        return Err(PipelineError::SchemaMismatch(format!(
            "cannot union columns {:?} with {:?}",
            a_names, b_names
        )));
    }
    if !collections_share_crs(a, b) {
        return Err(PipelineError::CrsMismatch {
            left: describe_crs(a),
            right: describe_crs(b),
        });
    }

    let mut fields = Vec::with_capacity(a.schema().len());
    for (a_field, b_field) in a.schema().fields().iter().zip(b.schema().fields()) {
        let field_type = a_field
            .field_type
            .widen(b_field.field_type)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "column '{}' is {} in one collection and {} in the other",
                    a_field.name, a_field.field_type, b_field.field_type
                ))
            })?;
        fields.push(Field::new(a_field.name.as_str(), field_type));
    }
    let schema = Schema::new(fields)?;

    let records = a
        .records()
        .iter()
        .chain(b.records())
        .map(|record| {
            let attributes = record
                .attributes
                .iter()
                .zip(schema.fields())
                .map(|(value, field)| {
                    // Widening never fails for values of either source type.
                    value
                        .clone()
                        .coerce(field.field_type)
                        .unwrap_or(AttributeValue::Null)
                })
                .collect();
            FeatureRecord::new(attributes, record.geometry.clone())
        })
        .collect();
    FeatureCollection::from_records(schema, records, a.crs().cloned())
}

/// Remove records equal to an earlier record across all attributes and the geometry. The first
/// occurrence is kept and the order is preserved.
pub fn dedupe(collection: &FeatureCollection) -> FeatureCollection {
    let mut seen: HashMap<&[AttributeValue], Vec<usize>> = HashMap::new();
    let mut kept: Vec<usize> = Vec::new();
    for (row, record) in collection.records().iter().enumerate() {
        let candidates = seen.entry(record.attributes.as_slice()).or_default();
        let is_duplicate = candidates
            .iter()
            .any(|other| collection.records()[*other].geometry == record.geometry);
        if !is_duplicate {
            candidates.push(row);
            kept.push(row);
        }
    }
    let removed = collection.len() - kept.len();
    if removed > 0 {
        log::debug!("Removed {} duplicate records", removed);
    }
    collection.select_rows(kept)
}

/// Which columns of an edge-list row describe one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointColumns {
    pub name: String,
    pub x: String,
    pub y: String,
}

impl EndpointColumns {
    pub fn new(name: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            x: x.into(),
            y: y.into(),
        }
    }
}

/// Turn an edge list (several endpoints per row) into a deduplicated node set: every endpoint
/// column set is renamed to {name, lon, lat}, given point geometries, then all are unioned and
/// deduplicated.
pub fn endpoints_to_nodes(
    segments: &FeatureCollection,
    endpoints: &[EndpointColumns],
) -> Result<FeatureCollection> {
    let node_columns = CoordinateColumns::lon_lat(NODE_X_COLUMN, NODE_Y_COLUMN);
    let mut nodes: Option<FeatureCollection> = None;
    for endpoint in endpoints {
        let renamed = select_and_rename(
            segments,
            &[
                (endpoint.name.as_str(), NODE_NAME_COLUMN),
                (endpoint.x.as_str(), NODE_X_COLUMN),
                (endpoint.y.as_str(), NODE_Y_COLUMN),
            ],
        )?;
        let endpoint_nodes = points_from_columns(&renamed, &node_columns)?;
        nodes = Some(match nodes {
            None => endpoint_nodes,
            Some(nodes) => union(&nodes, &endpoint_nodes)?,
        });
    }
    let nodes = nodes.ok_or_else(|| {
        PipelineError::SchemaMismatch("at least one endpoint column set is required".to_string())
    })?;
    let deduped = dedupe(&nodes);
    log::info!(
        "{} endpoints of {} segments collapse to {} nodes",
        nodes.len(),
        segments.len(),
        deduped.len()
    );
    Ok(deduped)
}
