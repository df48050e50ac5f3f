use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
};

use shapefile::{dbase::FieldValue, Shape};

use crate::{
    crs::crs_utils::{Crs, EpsgCode},
    error::{PipelineError, Result},
};

use super::{
    feature::{AttributeValue, FeatureCollection, FeatureRecord},
    schema::{unify_values, Field, Schema},
    FeatureReader, GeofileFormat,
};

/// Reads an ESRI shapefile bundle: shapes from the `.shp`, attributes from the `.dbf` and the
/// CRS from a sibling `.prj` when it names an EPSG code. Columns are sorted by name.
pub struct ShapefileReader;

impl FeatureReader for ShapefileReader {
    const FORMAT: GeofileFormat = GeofileFormat::Shapefile;

    fn read(filepath: &Path) -> Result<FeatureCollection> {
        let mut reader = shapefile::Reader::from_path(filepath)
            .map_err(|err| PipelineError::load(filepath, err))?;

        let mut geometries = Vec::new();
        let mut rows: Vec<HashMap<String, FieldValue>> = Vec::new();
        for shape_record in reader.iter_shapes_and_records() {
            let (shape, record) =
                shape_record.map_err(|err| PipelineError::load(filepath, err))?;
            let geometry =
                shape_to_geometry(shape).map_err(|err| PipelineError::load(filepath, err))?;
            geometries.push(geometry);
            rows.push(HashMap::from(record));
        }

        let column_names: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
        let mut fields = Vec::with_capacity(column_names.len());
        let mut columns: Vec<Vec<AttributeValue>> = Vec::with_capacity(column_names.len());
        for name in column_names {
            let values = rows
                .iter()
                .map(|row| {
                    row.get(name)
                        .map(dbase_to_attribute)
                        .unwrap_or(AttributeValue::Null)
                })
                .collect();
            let (field_type, values) = unify_values(values);
            fields.push(Field::new(name.as_str(), field_type));
            columns.push(values);
        }
        let schema = Schema::new(fields).map_err(|err| PipelineError::load(filepath, err))?;

        let records = geometries
            .into_iter()
            .enumerate()
            .map(|(row, geometry)| {
                let attributes = columns
                    .iter_mut()
                    .map(|values| std::mem::replace(&mut values[row], AttributeValue::Null))
                    .collect();
                FeatureRecord::new(attributes, geometry)
            })
            .collect();
        FeatureCollection::from_records(schema, records, crs_from_prj(filepath))
    }
}

fn shape_to_geometry(shape: Shape) -> std::result::Result<Option<geo::Geometry>, String> {
    match shape {
        Shape::NullShape => Ok(None),
        shape => geo::Geometry::<f64>::try_from(shape)
            .map(Some)
            .map_err(|err| err.to_string()),
    }
}

fn dbase_to_attribute(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(text)) | FieldValue::Memo(text) => {
            match text.trim() {
                "" => AttributeValue::Null,
                text => AttributeValue::Text(text.to_string()),
            }
        }
        FieldValue::Numeric(Some(value))
        | FieldValue::Double(value)
        | FieldValue::Currency(value) => AttributeValue::Float(*value),
        FieldValue::Float(Some(value)) => AttributeValue::Float(f64::from(*value)),
        FieldValue::Integer(value) => AttributeValue::Integer(i64::from(*value)),
        FieldValue::Logical(Some(value)) => AttributeValue::Boolean(*value),
        FieldValue::Date(Some(date)) => AttributeValue::Text(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::DateTime(datetime) => AttributeValue::Text(format!("{:?}", datetime)),
        _ => AttributeValue::Null,
    }
}

/// The CRS named by the `.prj` next to `filepath`, if any.
fn crs_from_prj(filepath: &Path) -> Option<Crs> {
    let prj_filepath = filepath.with_extension("prj");
    let wkt = fs::read_to_string(&prj_filepath).ok()?;
    match epsg_code_from_wkt(&wkt) {
        Some(code) => Some(Crs::from_epsg(code)),
        None => {
            log::warn!(
                "{:?} does not name an EPSG code, leaving the CRS unset",
                prj_filepath
            );
            None
        }
    }
}

/// EPSG code of a WKT definition. The last EPSG authority belongs to the outermost CRS; ESRI
/// style files without authorities are recognized by their geographic CRS name.
fn epsg_code_from_wkt(wkt: &str) -> Option<EpsgCode> {
    let compact: String = wkt.chars().filter(|c| !c.is_whitespace()).collect();
    if let Some(position) = compact.rfind("[\"EPSG\",") {
        let digits: String = compact[position + "[\"EPSG\",".len()..]
            .trim_start_matches('"')
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        return digits.parse().ok();
    }
    if !compact.starts_with("GEOGCS[") {
        return None;
    }
    let name = compact["GEOGCS[".len()..].split(',').next()?.trim_matches('"');
    match name {
        "GCS_WGS_1984" | "WGS84" | "WGS_84" => Some(4326),
        "GCS_North_American_1983" | "NAD83" => Some(4269),
        "GCS_ETRS_1989" | "ETRS89" => Some(4258),
        _ => None,
    }
}
