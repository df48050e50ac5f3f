use serde::Deserialize;

use crate::{
    error::{PipelineError, Result},
    geofile::feature::{AttributeValue, FeatureCollection, FeatureRecord},
};

/// Names of the two numeric columns a point is built from. `x` is the easting or longitude,
/// `y` the northing or latitude; swapping them produces valid but wrong points.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoordinateColumns {
    pub x: String,
    pub y: String,
}

impl CoordinateColumns {
    pub fn lon_lat(lon: impl Into<String>, lat: impl Into<String>) -> Self {
        Self {
            x: lon.into(),
            y: lat.into(),
        }
    }
}

fn coordinate(value: &AttributeValue, row: usize, column: &str) -> Result<f64> {
    match value.as_f64() {
        Some(coordinate) if coordinate.is_finite() => Ok(coordinate),
        _ => Err(PipelineError::InvalidCoordinate {
            row,
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Build a Point geometry for every record from two coordinate columns, replacing any previous
/// geometry. Attributes and CRS tag are carried over unchanged.
pub fn points_from_columns(
    collection: &FeatureCollection,
    columns: &CoordinateColumns,
) -> Result<FeatureCollection> {
    let x_column = collection.schema().require(&columns.x)?;
    let y_column = collection.schema().require(&columns.y)?;

    let records = collection
        .records()
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let x = coordinate(&record.attributes[x_column], row, &columns.x)?;
            let y = coordinate(&record.attributes[y_column], row, &columns.y)?;
            Ok(FeatureRecord::new(
                record.attributes.clone(),
                Some(geo::Geometry::Point(geo::Point::new(x, y))),
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    FeatureCollection::from_records(
        collection.schema().clone(),
        records,
        collection.crs().cloned(),
    )
}
