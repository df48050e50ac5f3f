pub mod csv_file;
pub mod feature;
pub mod geojson;
pub mod schema;
pub mod shapefile_file;

use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

use self::{
    csv_file::CsvReader,
    feature::{AttributeValue, FeatureCollection, FeatureRecord},
    geojson::GeoJsonReader,
    schema::{DeclaredSchema, FieldType},
    shapefile_file::ShapefileReader,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GeofileFormat {
    Csv,
    GeoJson,
    Shapefile,
}

impl GeofileFormat {
    pub fn name(&self) -> &'static str {
        match self {
            GeofileFormat::Csv => "CSV",
            GeofileFormat::GeoJson => "GeoJSON",
            GeofileFormat::Shapefile => "ESRI Shapefile",
        }
    }

    /// Infer the format from the file extension.
    pub fn from_path(filepath: &Path) -> Result<Self> {
        let extension = filepath
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| extension.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(GeofileFormat::Csv),
            Some("geojson") | Some("json") => Ok(GeofileFormat::GeoJson),
            Some("shp") => Ok(GeofileFormat::Shapefile),
            _ => Err(PipelineError::load(
                filepath,
                "cannot infer the file format from the extension",
            )),
        }
    }
}

/// A parser producing a FeatureCollection from a file on disk.
pub trait FeatureReader {
    const FORMAT: GeofileFormat;

    fn read(filepath: &Path) -> Result<FeatureCollection>;
}

/// Load a file into a FeatureCollection. The format is inferred from the extension when not
/// given; a declared schema is checked against, and applied to, the loaded columns.
pub fn load_features(
    filepath: &Path,
    format: Option<GeofileFormat>,
    declared_schema: Option<&DeclaredSchema>,
) -> Result<FeatureCollection> {
    if !filepath.exists() {
        return Err(PipelineError::load(filepath, "file does not exist"));
    }
    let format = match format {
        Some(format) => format,
        None => GeofileFormat::from_path(filepath)?,
    };
    log::info!("Reading {} file {:?}", format.name(), filepath);
    let collection = match format {
        GeofileFormat::Csv => CsvReader::read(filepath)?,
        GeofileFormat::GeoJson => GeoJsonReader::read(filepath)?,
        GeofileFormat::Shapefile => ShapefileReader::read(filepath)?,
    };
    log::info!(
        "Read {} records with {} columns",
        collection.len(),
        collection.schema().len()
    );
    match declared_schema {
        Some(declared_schema) => conform_to_schema(collection, declared_schema),
        None => Ok(collection),
    }
}

/// Convert the declared columns of `collection` to their declared types. Undeclared columns are
/// kept as loaded.
pub fn conform_to_schema(
    collection: FeatureCollection,
    declared_schema: &DeclaredSchema,
) -> Result<FeatureCollection> {
    let mut schema = collection.schema().clone();
    let crs = collection.crs().cloned();
    let columns: Vec<(usize, &str, FieldType)> = declared_schema
        .iter()
        .map(|(name, field_type)| -> Result<(usize, &str, FieldType)> {
            Ok((schema.require(name)?, name.as_str(), *field_type))
        })
        .collect::<Result<_>>()?;

    let mut records: Vec<FeatureRecord> = collection.into_records();
    for (row, record) in records.iter_mut().enumerate() {
        for (column, name, field_type) in &columns {
            let value = std::mem::replace(
                &mut record.attributes[*column],
                AttributeValue::Null,
            );
            let description = value.to_string();
            record.attributes[*column] = value.coerce(*field_type).ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "'{}' in column '{}' of row {} is not {}",
                    description, name, row, field_type
                ))
            })?;
        }
    }
    for (column, _, field_type) in &columns {
        schema.set_field_type(*column, *field_type);
    }
    FeatureCollection::from_records(schema, records, crs)
}

#[cfg(test)]
#[generic_tests::define]
mod tests {
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    use testdir::testdir;

    use crate::{
        error::PipelineError,
        geofile::{
            feature::AttributeValue,
            schema::{DeclaredSchema, FieldType},
            FeatureReader,
        },
    };

    use super::{load_features, GeofileFormat};

    /// Sample file per reader, each with two records and a "code" column.
    trait SampleFile {
        fn extension() -> &'static str;
        fn write(filepath: &Path);
    }

    impl SampleFile for crate::geofile::csv_file::CsvReader {
        fn extension() -> &'static str {
            "csv"
        }
        fn write(filepath: &Path) {
            fs::write(filepath, "name,code\nWipkingen,0042\nEnge,17\n").unwrap();
        }
    }

    impl SampleFile for crate::geofile::geojson::GeoJsonReader {
        fn extension() -> &'static str {
            "geojson"
        }
        fn write(filepath: &Path) {
            let contents = r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"name": "Wipkingen", "code": "0042"},
                 "geometry": {"type": "Point", "coordinates": [8.529, 47.393]}},
                {"type": "Feature", "properties": {"name": "Enge", "code": "17"},
                 "geometry": {"type": "Point", "coordinates": [8.531, 47.364]}}
            ]}"#;
            fs::write(filepath, contents).unwrap();
        }
    }

    impl SampleFile for crate::geofile::shapefile_file::ShapefileReader {
        fn extension() -> &'static str {
            "shp"
        }
        fn write(filepath: &Path) {
            let table = ::shapefile::dbase::TableWriterBuilder::new()
                .add_character_field("name".try_into().unwrap(), 16)
                .add_character_field("code".try_into().unwrap(), 8);
            let mut writer = ::shapefile::Writer::from_path(filepath, table).unwrap();
            let places = [("Wipkingen", "0042", 8.529, 47.393), ("Enge", "17", 8.531, 47.364)];
            for (name, code, x, y) in places {
                let mut record = ::shapefile::dbase::Record::default();
                record.insert(
                    "name".to_string(),
                    ::shapefile::dbase::FieldValue::Character(Some(name.to_string())),
                );
                record.insert(
                    "code".to_string(),
                    ::shapefile::dbase::FieldValue::Character(Some(code.to_string())),
                );
                writer
                    .write_shape_and_record(&::shapefile::Point::new(x, y), &record)
                    .unwrap();
            }
        }
    }

    fn write_sample<R: SampleFile>(name: &str) -> PathBuf {
        let filepath = testdir!().join(format!("{}.{}", name, R::extension()));
        R::write(&filepath);
        filepath
    }

    #[test]
    fn test_format_inferred_from_extension<R: FeatureReader + SampleFile>() {
        let filepath = write_sample::<R>("sample");
        assert_eq!(GeofileFormat::from_path(&filepath).unwrap(), R::FORMAT);
        let collection = load_features(&filepath, None, None).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn test_missing_file_is_load_error<R: FeatureReader + SampleFile>() {
        let filepath = testdir!().join(format!("missing.{}", R::extension()));
        assert!(matches!(
            load_features(&filepath, Some(R::FORMAT), None),
            Err(PipelineError::Load { .. })
        ));
        assert!(matches!(R::read(&filepath), Err(PipelineError::Load { .. })));
    }

    #[test]
    fn test_declared_schema_is_applied<R: FeatureReader + SampleFile>() {
        let filepath = write_sample::<R>("declared");
        let declared = DeclaredSchema::from([("code".to_string(), FieldType::Integer)]);
        let collection = load_features(&filepath, Some(R::FORMAT), Some(&declared)).unwrap();
        assert_eq!(
            collection.value(0, "code").unwrap(),
            Some(&AttributeValue::Integer(42))
        );
        let code_field = &collection.schema().fields()[collection.schema().require("code").unwrap()];
        assert_eq!(code_field.field_type, FieldType::Integer);
    }

    #[test]
    fn test_declared_schema_rejects_bad_values<R: FeatureReader + SampleFile>() {
        let filepath = write_sample::<R>("bad_values");
        let declared = DeclaredSchema::from([("name".to_string(), FieldType::Float)]);
        assert!(matches!(
            load_features(&filepath, Some(R::FORMAT), Some(&declared)),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_declared_schema_requires_columns<R: FeatureReader + SampleFile>() {
        let filepath = write_sample::<R>("missing_column");
        let declared = DeclaredSchema::from([("population".to_string(), FieldType::Integer)]);
        assert!(matches!(
            load_features(&filepath, Some(R::FORMAT), Some(&declared)),
            Err(PipelineError::ColumnMissing(_))
        ));
    }

    #[instantiate_tests(<crate::geofile::csv_file::CsvReader>)]
    mod csv {}

    #[instantiate_tests(<crate::geofile::geojson::GeoJsonReader>)]
    mod geojson {}

    #[instantiate_tests(<crate::geofile::shapefile_file::ShapefileReader>)]
    mod shp {}
}
