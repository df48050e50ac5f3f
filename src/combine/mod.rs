pub mod index;

use geo::{Area, BooleanOps, Relate};
use rayon::prelude::*;
use serde::Deserialize;

use crate::{
    crs::normalize::{collections_share_crs, describe_crs},
    error::{PipelineError, Result},
    geofile::{
        feature::{AttributeValue, FeatureCollection, FeatureRecord},
        schema::{Field, FieldType, Schema},
    },
};

use index::EnvelopeIndex;

pub const OVERLAY_SUFFIXES: (&str, &str) = ("_1", "_2");
pub const JOIN_SUFFIXES: (&str, &str) = ("_left", "_right");
pub const JOIN_INDEX_COLUMN: &str = "index_right";

/// Geometric predicate evaluated as `predicate(left, right)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Predicate {
    Within,
    Contains,
    Intersects,
}

impl Predicate {
    /// Boundary-only contact does not count for `Within` and `Contains`.
    pub fn evaluate(&self, left: &geo::Geometry, right: &geo::Geometry) -> bool {
        let matrix = left.relate(right);
        match self {
            Predicate::Within => matrix.is_within(),
            Predicate::Contains => matrix.is_contains(),
            Predicate::Intersects => matrix.is_intersects(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineOptions {
    /// Fail on inputs tagged with different CRSs instead of only warning.
    pub strict_crs: bool,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self { strict_crs: true }
    }
}

/// The combiner never re-projects. Mismatched inputs are an error in strict mode and a warning
/// otherwise.
pub fn ensure_same_crs(
    left: &FeatureCollection,
    right: &FeatureCollection,
    options: CombineOptions,
) -> Result<()> {
    if collections_share_crs(left, right) {
        return Ok(());
    }
    if options.strict_crs {
        return Err(PipelineError::CrsMismatch {
            left: describe_crs(left),
            right: describe_crs(right),
        });
    }
    log::warn!(
        "Combining collections in different CRSs ({} and {}), results are likely wrong",
        describe_crs(left),
        describe_crs(right)
    );
    Ok(())
}

/// One flag per point: whether it lies strictly inside any of `regions`.
pub fn within_mask(
    points: &FeatureCollection,
    regions: &FeatureCollection,
    options: CombineOptions,
) -> Result<Vec<bool>> {
    ensure_same_crs(points, regions, options)?;
    let point_geometries = points.geometries("test containment of")?;
    let region_geometries = regions.geometries("test containment against")?;
    let index = EnvelopeIndex::new(&region_geometries);

    Ok(point_geometries
        .par_iter()
        .map(|point| {
            index.candidates(point).into_iter().any(|region| {
                Predicate::Within.evaluate(point, region_geometries[region])
            })
        })
        .collect())
}

pub(crate) fn geometry_type_name(geometry: &geo::Geometry) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

fn as_multi_polygon(geometry: &geo::Geometry) -> Result<geo::MultiPolygon> {
    match geometry {
        geo::Geometry::Polygon(polygon) => Ok(geo::MultiPolygon::new(vec![polygon.clone()])),
        geo::Geometry::MultiPolygon(multi_polygon) => Ok(multi_polygon.clone()),
        geo::Geometry::Rect(rect) => Ok(geo::MultiPolygon::new(vec![rect.to_polygon()])),
        geo::Geometry::Triangle(triangle) => {
            Ok(geo::MultiPolygon::new(vec![triangle.to_polygon()]))
        }
        other => Err(PipelineError::UnsupportedGeometry {
            operation: "overlay",
            geometry_type: geometry_type_name(other),
        }),
    }
}

/// Schema with the columns of `left` followed by `extra` and the columns of `right`. Names
/// present on the other side, or in `extra`, get the respective suffix, repeated until the name
/// is free.
fn merge_schemas(
    left: &Schema,
    right: &Schema,
    (left_suffix, right_suffix): (&str, &str),
    extra: &[Field],
) -> Result<Schema> {
    let reserved: Vec<&str> = left
        .names()
        .chain(right.names())
        .chain(extra.iter().map(|field| field.name.as_str()))
        .collect();
    let in_extra = |name: &str| extra.iter().any(|field| field.name == name);

    let mut merged = Schema::default();
    for field in left.fields() {
        let name = if right.index_of(&field.name).is_some() || in_extra(&field.name) {
            suffixed_name(&field.name, left_suffix, &reserved, &merged)
        } else {
            field.name.clone()
        };
        merged.push(Field::new(name, field.field_type))?;
    }
    for field in extra {
        merged.push(field.clone())?;
    }
    for field in right.fields() {
        let name = if left.index_of(&field.name).is_some() || in_extra(&field.name) {
            suffixed_name(&field.name, right_suffix, &reserved, &merged)
        } else {
            field.name.clone()
        };
        merged.push(Field::new(name, field.field_type))?;
    }
    Ok(merged)
}

fn suffixed_name(name: &str, suffix: &str, reserved: &[&str], merged: &Schema) -> String {
    let mut candidate = format!("{}{}", name, suffix);
    while reserved.contains(&candidate.as_str()) || merged.index_of(&candidate).is_some() {
        candidate.push_str(suffix);
    }
    candidate
}

fn merged_attributes(
    left: &FeatureRecord,
    extra: &[AttributeValue],
    right: &FeatureRecord,
) -> Vec<AttributeValue> {
    left.attributes
        .iter()
        .chain(extra)
        .chain(&right.attributes)
        .cloned()
        .collect()
}

/// Pairwise intersection of every polygon of `a` with every polygon of `b`. Pairs that do not
/// overlap produce nothing. Attributes of both sides are kept, suffixed `_1`/`_2` on collision.
pub fn overlay_intersection(
    a: &FeatureCollection,
    b: &FeatureCollection,
    options: CombineOptions,
) -> Result<FeatureCollection> {
    ensure_same_crs(a, b, options)?;
    let a_geometries = a.geometries("overlay")?;
    let b_geometries = b.geometries("overlay")?;
    let a_polygons = a_geometries
        .iter()
        .map(|geometry| as_multi_polygon(geometry))
        .collect::<Result<Vec<_>>>()?;
    let b_polygons = b_geometries
        .iter()
        .map(|geometry| as_multi_polygon(geometry))
        .collect::<Result<Vec<_>>>()?;
    let schema = merge_schemas(a.schema(), b.schema(), OVERLAY_SUFFIXES, &[])?;
    let index = EnvelopeIndex::new(&b_geometries);

    let records: Vec<FeatureRecord> = a_polygons
        .par_iter()
        .enumerate()
        .flat_map_iter(|(row, a_polygon)| {
            let a_record = &a.records()[row];
            index
                .candidates(a_geometries[row])
                .into_iter()
                .filter_map(|candidate| {
                    let intersection = a_polygon.intersection(&b_polygons[candidate]);
                    let polygons: Vec<geo::Polygon> = intersection
                        .into_iter()
                        .filter(|polygon| polygon.unsigned_area() > 0.0)
                        .collect();
                    let geometry = match polygons.len() {
                        0 => return None,
                        1 => polygons.into_iter().next().map(geo::Geometry::Polygon)?,
                        _ => geo::Geometry::MultiPolygon(geo::MultiPolygon::new(polygons)),
                    };
                    Some(FeatureRecord::new(
                        merged_attributes(a_record, &[], &b.records()[candidate]),
                        Some(geometry),
                    ))
                })
                .collect::<Vec<_>>()
        })
        .collect();

    log::info!(
        "Overlay of {} and {} polygons gives {} intersections",
        a.len(),
        b.len(),
        records.len()
    );
    FeatureCollection::from_records(schema, records, a.crs().cloned())
}

/// Inner spatial join: one output record per pair `(a_i, b_j)` with `predicate(a_i, b_j)`,
/// carrying the geometry of `a_i`, the attributes of both sides (suffixed `_left`/`_right` on
/// collision) and the row of `b_j` in `index_right`. Records of `a` without a match are dropped.
pub fn spatial_join(
    a: &FeatureCollection,
    b: &FeatureCollection,
    predicate: Predicate,
    options: CombineOptions,
) -> Result<FeatureCollection> {
    ensure_same_crs(a, b, options)?;
    let a_geometries = a.geometries("join")?;
    let b_geometries = b.geometries("join")?;
    let schema = merge_schemas(
        a.schema(),
        b.schema(),
        JOIN_SUFFIXES,
        &[Field::new(JOIN_INDEX_COLUMN, FieldType::Integer)],
    )?;
    let index = EnvelopeIndex::new(&b_geometries);

    let records: Vec<FeatureRecord> = a_geometries
        .par_iter()
        .enumerate()
        .flat_map_iter(|(row, a_geometry)| {
            let a_record = &a.records()[row];
            index
                .candidates(a_geometry)
                .into_iter()
                .filter(|candidate| predicate.evaluate(a_geometry, b_geometries[*candidate]))
                .map(|candidate| {
                    FeatureRecord::new(
                        merged_attributes(
                            a_record,
                            &[AttributeValue::Integer(candidate as i64)],
                            &b.records()[candidate],
                        ),
                        a_record.geometry.clone(),
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();

    log::info!(
        "Spatial join ({:?}) of {} with {} records gives {} pairs",
        predicate,
        a.len(),
        b.len(),
        records.len()
    );
    FeatureCollection::from_records(schema, records, a.crs().cloned())
}
