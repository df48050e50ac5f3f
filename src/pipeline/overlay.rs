use std::path::{Path, PathBuf};

use crate::{
    combine::{overlay_intersection, within_mask, CombineOptions},
    crs::{
        crs_utils::Crs,
        normalize::{assign, transform},
    },
    error::{PipelineError, Result},
    geocode::{geocode_all, nominatim::NominatimGeocoder, Geocoder},
    geofile::{
        feature::{AttributeValue, FeatureCollection},
        schema::{Field, FieldType},
    },
};

use super::{align_crs, write_output, GeocodePlacesConfig, InputConfig};

pub const OVERLAY_FILENAME: &str = "overlay.geojson";
pub const PLACES_FILENAME: &str = "places.geojson";
pub const INSIDE_MASK_COLUMN: &str = "inside_mask";

pub fn run(
    base: &InputConfig,
    base_crs: Option<&Crs>,
    mask: &InputConfig,
    geocode: Option<&GeocodePlacesConfig>,
    options: CombineOptions,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let (cropped, mask) = cut_to_mask(base, base_crs, mask, options)?;
    let mut outputs = vec![write_output(&cropped, output_dir, OVERLAY_FILENAME)?];
    if let Some(geocode) = geocode {
        let geocoder = NominatimGeocoder::new(&geocode.geocoder)?;
        let places = locate_places(&geocoder, &geocode.places, &mask, options)?;
        outputs.push(write_output(&places, output_dir, PLACES_FILENAME)?);
    }
    Ok(outputs)
}

/// Intersect the polygons of `base` with `mask`, after projecting the mask into the CRS of the
/// base unless `strict_crs` is off. Returns the intersections and the mask as used.
pub fn cut_to_mask(
    base: &InputConfig,
    base_crs: Option<&Crs>,
    mask: &InputConfig,
    options: CombineOptions,
) -> Result<(FeatureCollection, FeatureCollection)> {
    let base = base.load()?;
    let base = match base_crs {
        Some(crs) => assign(&base, crs.clone()),
        None => base,
    };
    let target = base.crs().cloned().ok_or(PipelineError::CrsNotSet)?;
    let mask = align_crs(&mask.load()?, &target, options)?;
    let cropped = overlay_intersection(&base, &mask, options)?;
    Ok((cropped, mask))
}

/// Geocode `queries`, project them into the CRS of `mask` and flag which lie inside it.
pub fn locate_places(
    geocoder: &impl Geocoder,
    queries: &[String],
    mask: &FeatureCollection,
    options: CombineOptions,
) -> Result<FeatureCollection> {
    let target = mask.crs().ok_or(PipelineError::CrsNotSet)?;
    let places = transform(&geocode_all(geocoder, queries)?, target)?;
    let inside = within_mask(&places, mask, options)?;
    log::info!(
        "{} of {} places lie inside the mask",
        inside.iter().filter(|inside| **inside).count(),
        places.len()
    );

    let mut schema = places.schema().clone();
    schema.push(Field::new(INSIDE_MASK_COLUMN, FieldType::Boolean))?;
    let crs = places.crs().cloned();
    let records = places
        .into_records()
        .into_iter()
        .zip(inside)
        .map(|(mut record, inside)| {
            record.attributes.push(AttributeValue::Boolean(inside));
            record
        })
        .collect();
    FeatureCollection::from_records(schema, records, crs)
}
