use std::path::{Path, PathBuf};

use crate::{
    crs::{crs_utils::Crs, normalize::assign},
    error::Result,
    synthesis::harmonize::{endpoints_to_nodes, EndpointColumns},
};

use super::{write_output, InputConfig};

pub const STATIONS_FILENAME: &str = "stations.geojson";

/// Collapse a segment table into its stations and write them as points.
pub fn run(
    segments: &InputConfig,
    crs: &Crs,
    endpoints: &[EndpointColumns],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let segments = assign(&segments.load()?, crs.clone());
    let stations = endpoints_to_nodes(&segments, endpoints)?;
    log::info!("Found {} stations", stations.len());
    Ok(vec![write_output(&stations, output_dir, STATIONS_FILENAME)?])
}

#[cfg(test)]
mod tests {
    use std::fs;

    use testdir::testdir;

    use crate::geofile::feature::AttributeValue;

    use super::*;

    #[test]
    fn test_shared_stations_written_once() {
        let dir = testdir!();
        let segments_filepath = dir.join("metro.csv");
        fs::write(
            &segments_filepath,
            "station1,station1_lon,station1_lat,station2,station2_lon,station2_lat\n\
             A,0.0,0.0,B,1.0,0.0\n\
             B,1.0,0.0,C,2.0,0.5\n",
        )
        .unwrap();
        let endpoints = [
            EndpointColumns::new("station1", "station1_lon", "station1_lat"),
            EndpointColumns::new("station2", "station2_lon", "station2_lat"),
        ];
        let outputs = run(
            &InputConfig::new(&segments_filepath),
            &Crs::wgs84(),
            &endpoints,
            &dir,
        )
        .unwrap();

        let stations = InputConfig::new(&outputs[0]).load().unwrap();
        let names: Vec<String> = (0..stations.len())
            .map(|row| stations.value(row, "name").unwrap().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(
            stations.value(2, "lat").unwrap(),
            Some(&AttributeValue::Float(0.5))
        );
        assert_eq!(stations.crs(), Some(&Crs::wgs84()));
    }
}
