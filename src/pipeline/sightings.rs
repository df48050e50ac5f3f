use std::path::{Path, PathBuf};

use crate::{
    combine::{spatial_join, within_mask, CombineOptions, Predicate},
    crs::{crs_utils::Crs, normalize::assign},
    error::{PipelineError, Result},
    synthesis::points::{points_from_columns, CoordinateColumns},
};

use super::{align_crs, write_output, InputConfig};

pub const SIGHTINGS_FILENAME: &str = "sightings.geojson";

pub struct SightingsInputs<'a> {
    pub events: &'a InputConfig,
    pub coordinates: &'a CoordinateColumns,
    pub events_crs: &'a Crs,
    pub regions: &'a InputConfig,
    pub regions_crs: Option<&'a Crs>,
    pub predicate: Predicate,
}

/// Build event points, bring them into the CRS of the regions and join each event with the
/// regions matching `predicate`. With `strict_crs` off the events keep their own CRS.
pub fn run(
    inputs: &SightingsInputs,
    options: CombineOptions,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let events = assign(&inputs.events.load()?, inputs.events_crs.clone());
    let events = points_from_columns(&events, inputs.coordinates)?;

    let regions = inputs.regions.load()?;
    let regions = match inputs.regions_crs {
        Some(crs) => assign(&regions, crs.clone()),
        None => regions,
    };
    let regions_crs = regions.crs().cloned().ok_or(PipelineError::CrsNotSet)?;
    let events = align_crs(&events, &regions_crs, options)?;

    let inside = within_mask(&events, &regions, options)?
        .into_iter()
        .filter(|inside| *inside)
        .count();
    log::info!(
        "{} of {} events lie within a region",
        inside,
        events.len()
    );

    let sightings = spatial_join(&events, &regions, inputs.predicate, options)?;
    Ok(vec![write_output(&sightings, output_dir, SIGHTINGS_FILENAME)?])
}
