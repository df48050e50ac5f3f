use std::{fs, path::Path};

use geojson::{GeoJson, JsonObject, JsonValue};

use crate::{
    crs::crs_utils::Crs,
    error::{PipelineError, Result},
};

use super::{
    feature::{AttributeValue, FeatureCollection, FeatureRecord},
    schema::{unify_values, Field, Schema},
    FeatureReader, GeofileFormat,
};

/// Reads GeoJSON. Properties become attributes; the CRS is taken from the legacy `crs` member
/// and defaults to WGS84.
pub struct GeoJsonReader;

impl FeatureReader for GeoJsonReader {
    const FORMAT: GeofileFormat = GeofileFormat::GeoJson;

    fn read(filepath: &Path) -> Result<FeatureCollection> {
        let contents =
            fs::read_to_string(filepath).map_err(|err| PipelineError::load(filepath, err))?;
        let geojson: GeoJson = contents
            .parse()
            .map_err(|err| PipelineError::load(filepath, err))?;

        let (features, crs) = match geojson {
            GeoJson::FeatureCollection(collection) => {
                let crs = crs_from_foreign_members(collection.foreign_members.as_ref());
                (collection.features, crs)
            }
            GeoJson::Feature(feature) => {
                let crs = crs_from_foreign_members(feature.foreign_members.as_ref());
                (vec![feature], crs)
            }
            GeoJson::Geometry(geometry) => (
                vec![geojson::Feature {
                    geometry: Some(geometry),
                    ..Default::default()
                }],
                None,
            ),
        };
        let crs = crs.unwrap_or_else(Crs::wgs84);

        // Properties may differ between features; the schema is the union in first-seen order.
        let mut column_names: Vec<String> = Vec::new();
        for feature in &features {
            if let Some(properties) = &feature.properties {
                for key in properties.keys() {
                    if !column_names.contains(key) {
                        column_names.push(key.clone());
                    }
                }
            }
        }

        let mut columns: Vec<Vec<AttributeValue>> = column_names
            .iter()
            .map(|name| {
                features
                    .iter()
                    .map(|feature| {
                        feature
                            .properties
                            .as_ref()
                            .and_then(|properties| properties.get(name))
                            .map(json_to_attribute)
                            .unwrap_or(AttributeValue::Null)
                    })
                    .collect()
            })
            .collect();

        let mut fields = Vec::with_capacity(column_names.len());
        for (name, values) in column_names.iter().zip(columns.iter_mut()) {
            let (field_type, unified) = unify_values(std::mem::take(values));
            *values = unified;
            fields.push(Field::new(name.as_str(), field_type));
        }
        let schema = Schema::new(fields).map_err(|err| PipelineError::load(filepath, err))?;

        let mut records = Vec::with_capacity(features.len());
        for (row, feature) in features.into_iter().enumerate() {
            let geometry = feature
                .geometry
                .map(|geometry| geo::Geometry::<f64>::try_from(geometry.value))
                .transpose()
                .map_err(|err| PipelineError::load(filepath, err))?;
            let attributes = columns
                .iter_mut()
                .map(|values| std::mem::replace(&mut values[row], AttributeValue::Null))
                .collect();
            records.push(FeatureRecord::new(attributes, geometry));
        }
        FeatureCollection::from_records(schema, records, Some(crs))
    }
}

fn crs_from_foreign_members(members: Option<&JsonObject>) -> Option<Crs> {
    let name = members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(Crs::new(name))
}

fn json_to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(value) => AttributeValue::Boolean(*value),
        JsonValue::Number(number) => match number.as_i64() {
            Some(value) => AttributeValue::Integer(value),
            None => number
                .as_f64()
                .map(AttributeValue::Float)
                .unwrap_or(AttributeValue::Null),
        },
        JsonValue::String(value) => AttributeValue::Text(value.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Boolean(value) => JsonValue::Bool(*value),
        AttributeValue::Integer(value) => JsonValue::from(*value),
        AttributeValue::Float(value) => serde_json::Number::from_f64(*value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AttributeValue::Text(value) => JsonValue::String(value.clone()),
    }
}

fn crs_member(crs: &Crs) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), JsonValue::from(crs.identifier()));
    let mut crs_object = JsonObject::new();
    crs_object.insert("type".to_string(), JsonValue::from("name"));
    crs_object.insert("properties".to_string(), JsonValue::Object(properties));
    let mut members = JsonObject::new();
    members.insert("crs".to_string(), JsonValue::Object(crs_object));
    members
}

/// Write a collection as a GeoJSON FeatureCollection. A CRS other than WGS84 is recorded in the
/// legacy `crs` member so the file can be read back with the same tag. A collection without a
/// CRS is written without the member and therefore reads back as WGS84.
pub fn write_features_to_geojson(collection: &FeatureCollection, output_filepath: &Path) -> Result<()> {
    let features: Vec<geojson::Feature> = collection
        .records()
        .iter()
        .map(|record| {
            let properties: JsonObject = collection
                .schema()
                .names()
                .zip(record.attributes.iter())
                .map(|(name, value)| (name.to_string(), attribute_to_json(value)))
                .collect();
            geojson::Feature {
                geometry: record
                    .geometry
                    .as_ref()
                    .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
                properties: Some(properties),
                ..Default::default()
            }
        })
        .collect();

    let foreign_members = match collection.crs() {
        Some(crs) if *crs != Crs::wgs84() => Some(crs_member(crs)),
        Some(_) => None,
        None => {
            log::warn!(
                "Writing {:?} without a CRS, readers will assume WGS84",
                output_filepath
            );
            None
        }
    };
    let feature_collection = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    };
    log::info!(
        "Writing {} features to {:?}",
        collection.len(),
        output_filepath
    );
    let geojson_contents = GeoJson::from(feature_collection);
    fs::write(output_filepath, geojson_contents.to_string()).map_err(|err| PipelineError::Write {
        path: output_filepath.to_path_buf(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use testdir::testdir;

    use crate::{
        crs::crs_utils::Crs,
        geofile::{
            feature::{AttributeValue, FeatureCollection, FeatureRecord},
            schema::{Field, FieldType, Schema},
            FeatureReader,
        },
    };

    use super::{write_features_to_geojson, GeoJsonReader};

    #[test]
    fn test_read_heterogeneous_properties() {
        let filepath = testdir!().join("borders.geojson");
        fs::write(
            &filepath,
            r#"{
              "type": "FeatureCollection",
              "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::2056"}},
              "features": [
                {"type": "Feature", "properties": {"name": "Kreis 1", "pop": 5800},
                 "geometry": {"type": "Point", "coordinates": [2683000.0, 1247000.0]}},
                {"type": "Feature", "properties": {"pop": 5900.5, "zone": "inner"},
                 "geometry": {"type": "Point", "coordinates": [2684000.0, 1248000.0]}}
              ]
            }"#,
        )
        .unwrap();

        let collection = GeoJsonReader::read(&filepath).unwrap();
        assert_eq!(collection.crs().unwrap(), &Crs::from_epsg(2056));
        let names: Vec<&str> = collection.schema().names().collect();
        assert_eq!(names, vec!["name", "pop", "zone"]);
        assert_eq!(collection.schema().fields()[1].field_type, FieldType::Float);
        assert_eq!(collection.value(1, "name").unwrap(), Some(&AttributeValue::Null));
        assert_eq!(
            collection.value(0, "pop").unwrap(),
            Some(&AttributeValue::Float(5800.0))
        );
    }

    #[test]
    fn test_read_defaults_to_wgs84() {
        let filepath = testdir!().join("point.geojson");
        fs::write(
            &filepath,
            r#"{"type": "Point", "coordinates": [8.54, 47.37]}"#,
        )
        .unwrap();
        let collection = GeoJsonReader::read(&filepath).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.crs().unwrap(), &Crs::wgs84());
        assert!(collection.schema().is_empty());
    }

    #[test]
    fn test_written_file_keeps_crs_and_attributes() {
        let schema = Schema::new(vec![
            Field::new("name", FieldType::Text),
            Field::new("pop_total", FieldType::Integer),
        ])
        .unwrap();
        let collection = FeatureCollection::from_records(
            schema,
            vec![FeatureRecord::new(
                vec!["Wiedikon".into(), AttributeValue::Integer(120)],
                Some(geo::Geometry::Point(geo::Point::new(2681000.0, 1246000.0))),
            )],
            Some(Crs::from_epsg(2056)),
        )
        .unwrap();

        let filepath = testdir!().join("output.geojson");
        write_features_to_geojson(&collection, &filepath).unwrap();
        let read_back = GeoJsonReader::read(&filepath).unwrap();

        assert_eq!(read_back.crs().unwrap(), &Crs::from_epsg(2056));
        assert_eq!(read_back.records(), collection.records());
        assert_eq!(read_back.schema(), collection.schema());
    }

    #[test]
    fn test_untagged_collection_reads_back_as_wgs84() {
        let schema = Schema::new(vec![Field::new("name", FieldType::Text)]).unwrap();
        let collection = FeatureCollection::from_records(
            schema,
            vec![FeatureRecord::new(
                vec!["Enge".into()],
                Some(geo::Geometry::Point(geo::Point::new(8.53, 47.36))),
            )],
            None,
        )
        .unwrap();

        let filepath = testdir!().join("untagged.geojson");
        write_features_to_geojson(&collection, &filepath).unwrap();
        let contents = fs::read_to_string(&filepath).unwrap();
        assert!(!contents.contains("\"crs\""));

        let read_back = GeoJsonReader::read(&filepath).unwrap();
        assert_eq!(read_back.crs(), Some(&Crs::wgs84()));
        assert_eq!(read_back.records(), collection.records());
    }
}
