use std::path::Path;

use crate::error::{PipelineError, Result};

use super::{
    feature::{FeatureCollection, FeatureRecord},
    schema::{infer_field_type, parse_cell, Field, Schema},
    FeatureReader, GeofileFormat,
};

/// Reads delimited text with a header row. Column types are inferred, and the resulting
/// collection has neither geometries nor a CRS.
pub struct CsvReader;

impl FeatureReader for CsvReader {
    const FORMAT: GeofileFormat = GeofileFormat::Csv;

    fn read(filepath: &Path) -> Result<FeatureCollection> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(filepath)
            .map_err(|err| PipelineError::load(filepath, err))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| PipelineError::load(filepath, err))?
            .iter()
            .map(String::from)
            .collect();
        let rows: Vec<csv::StringRecord> = reader
            .records()
            .collect::<std::result::Result<_, _>>()
            .map_err(|err| PipelineError::load(filepath, err))?;

        let fields: Vec<Field> = headers
            .iter()
            .enumerate()
            .map(|(column, name)| {
                let field_type =
                    infer_field_type(rows.iter().map(|row| row.get(column).unwrap_or("")));
                Field::new(name.as_str(), field_type)
            })
            .collect();
        let schema =
            Schema::new(fields).map_err(|err| PipelineError::load(filepath, err))?;

        let mut records = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let attributes = schema
                .fields()
                .iter()
                .enumerate()
                .map(|(column, field)| {
                    let cell = row.get(column).unwrap_or("");
                    parse_cell(cell, field.field_type).ok_or_else(|| {
                        PipelineError::load(
                            filepath,
                            format!(
                                "'{}' in column '{}' of row {} is not {}",
                                cell, field.name, row_index, field.field_type
                            ),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            records.push(FeatureRecord::new(attributes, None));
        }
        log::debug!(
            "Read {} rows with columns {:?} from {:?}",
            records.len(),
            headers,
            filepath
        );
        FeatureCollection::from_records(schema, records, None)
    }
}
