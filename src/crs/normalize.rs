use geo::{Centroid, MapCoords};

use crate::{
    error::{PipelineError, Result},
    geofile::feature::{FeatureCollection, FeatureRecord},
};

use super::crs_utils::{epsg_code_to_authority_string, utm_epsg_for_lonlat, Crs};

/// Tag `collection` with `crs` without touching any coordinate. Used when the CRS is known
/// out-of-band but was never recorded with the data.
pub fn assign(collection: &FeatureCollection, crs: Crs) -> FeatureCollection {
    if let Some(previous) = collection.crs() {
        if *previous != crs {
            log::warn!(
                "Overriding CRS {} with {} without transforming coordinates",
                previous,
                crs
            );
        }
    }
    collection.clone().with_crs(Some(crs))
}

/// Whether two CRS values describe the same reference frame, by canonical form.
pub fn same_crs(a: &Crs, b: &Crs) -> bool {
    a == b
}

/// Whether two collections are tagged with the same CRS. Two untagged collections match.
pub fn collections_share_crs(a: &FeatureCollection, b: &FeatureCollection) -> bool {
    match (a.crs(), b.crs()) {
        (Some(a), Some(b)) => same_crs(a, b),
        (None, None) => true,
        _ => false,
    }
}

pub fn describe_crs(collection: &FeatureCollection) -> String {
    collection
        .crs()
        .map(|crs| crs.to_string())
        .unwrap_or_else(|| "no CRS".to_string())
}

/// Re-project every geometry of `collection` into `target` and return the result tagged with it.
pub fn transform(collection: &FeatureCollection, target: &Crs) -> Result<FeatureCollection> {
    let source = collection.crs().ok_or(PipelineError::CrsNotSet)?;
    let from = source.to_proj()?;
    let to = target.to_proj()?;

    if same_crs(source, target) {
        log::debug!("{} is already in {}, not transforming", source, target);
        return Ok(collection.clone().with_crs(Some(target.clone())));
    }

    log::info!(
        "Projecting {} features from {} to {}",
        collection.len(),
        source,
        target
    );
    let records: Result<Vec<FeatureRecord>> = collection
        .records()
        .iter()
        .map(|record| {
            let geometry = match &record.geometry {
                Some(geometry) => Some(
                    geometry.try_map_coords(|coord| reproject_coord(coord, &from, &to))?,
                ),
                None => None,
            };
            Ok(FeatureRecord::new(record.attributes.clone(), geometry))
        })
        .collect();
    FeatureCollection::from_records(
        collection.schema().clone(),
        records?,
        Some(target.clone()),
    )
}

/// Transform one coordinate. Geographic CRSs take and return degrees.
fn reproject_coord(coord: geo::Coord, from: &proj4rs::Proj, to: &proj4rs::Proj) -> Result<geo::Coord> {
    let mut point = if from.is_latlong() {
        (coord.x.to_radians(), coord.y.to_radians(), 0.0)
    } else {
        (coord.x, coord.y, 0.0)
    };
    proj4rs::transform::transform(from, to, &mut point).map_err(|err| {
        PipelineError::Projection {
            x: coord.x,
            y: coord.y,
            reason: err.to_string(),
        }
    })?;
    let (x, y) = if to.is_latlong() {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };
    if !x.is_finite() || !y.is_finite() {
        return Err(PipelineError::Projection {
            x: coord.x,
            y: coord.y,
            reason: "result is not finite".to_string(),
        });
    }
    Ok(geo::Coord { x, y })
}

/// Pick the WGS84 UTM zone for a collection in a geographic CRS, based on the centroid of its
/// first geometry.
pub fn estimate_utm_crs(collection: &FeatureCollection) -> Result<Crs> {
    let crs = collection.crs().ok_or(PipelineError::CrsNotSet)?;
    if !crs.is_geographic()? {
        return Err(PipelineError::UnsupportedCrs(format!(
            "{} is not geographic, cannot estimate a UTM zone",
            crs
        )));
    }
    let centroid = collection
        .records()
        .iter()
        .filter_map(|record| record.geometry.as_ref())
        .find_map(|geometry| geometry.centroid())
        .ok_or_else(|| {
            PipelineError::UnsupportedCrs(
                "cannot estimate a UTM zone for a collection without geometries".to_string(),
            )
        })?;
    let code = utm_epsg_for_lonlat(centroid.x(), centroid.y())?;
    Ok(Crs::new(epsg_code_to_authority_string(code)))
}
