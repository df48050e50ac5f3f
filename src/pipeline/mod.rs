pub mod overlay;
pub mod sightings;
pub mod stations;

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    combine::{CombineOptions, Predicate},
    crs::{
        crs_utils::Crs,
        normalize::{describe_crs, transform},
    },
    error::{PipelineError, Result},
    geocode::nominatim::GeocoderConfig,
    geofile::{
        feature::FeatureCollection, geojson::write_features_to_geojson, load_features,
        schema::DeclaredSchema, GeofileFormat,
    },
    synthesis::{harmonize::EndpointColumns, points::CoordinateColumns},
};

/// One input file of a run.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub path: PathBuf,
    /// Inferred from the extension when absent.
    #[serde(default)]
    pub format: Option<GeofileFormat>,
    #[serde(default)]
    pub schema: Option<DeclaredSchema>,
}

impl InputConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: None,
            schema: None,
        }
    }

    pub fn load(&self) -> Result<FeatureCollection> {
        load_features(&self.path, self.format, self.schema.as_ref())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct GeocodePlacesConfig {
    pub places: Vec<String>,
    pub geocoder: GeocoderConfig,
}

fn default_predicate() -> Predicate {
    Predicate::Within
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum PipelineConfig {
    /// Edge list with two endpoints per row to a deduplicated set of station points.
    Stations {
        segments: InputConfig,
        crs: Crs,
        endpoints: Vec<EndpointColumns>,
    },
    /// Point events from coordinate columns, joined with the regions they fall in.
    Sightings {
        events: InputConfig,
        coordinates: CoordinateColumns,
        events_crs: Crs,
        regions: InputConfig,
        #[serde(default)]
        regions_crs: Option<Crs>,
        #[serde(default = "default_predicate")]
        predicate: Predicate,
    },
    /// Polygons of `base` cut to `mask`, with optional geocoded places tested against the mask.
    Overlay {
        base: InputConfig,
        #[serde(default)]
        base_crs: Option<Crs>,
        mask: InputConfig,
        #[serde(default)]
        geocode: Option<GeocodePlacesConfig>,
    },
}

fn default_strict_crs() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub output_dir: PathBuf,
    /// Fail when combining collections in different CRSs instead of warning. When off, the runs
    /// also leave their inputs in the CRS they were loaded with.
    #[serde(default = "default_strict_crs")]
    pub strict_crs: bool,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn combine_options(&self) -> CombineOptions {
        CombineOptions {
            strict_crs: self.strict_crs,
        }
    }
}

/// Bring `collection` into `target` before it is combined with another collection. With
/// `strict_crs` off the collection keeps its own CRS and the combiner reports the mismatch.
pub(crate) fn align_crs(
    collection: &FeatureCollection,
    target: &Crs,
    options: CombineOptions,
) -> Result<FeatureCollection> {
    if options.strict_crs {
        return transform(collection, target);
    }
    log::warn!(
        "strict_crs is off, combining {} with {} without reprojecting",
        describe_crs(collection),
        target
    );
    Ok(collection.clone())
}

pub(crate) fn write_output(
    collection: &FeatureCollection,
    output_dir: &Path,
    filename: &str,
) -> Result<PathBuf> {
    let output_filepath = output_dir.join(filename);
    write_features_to_geojson(collection, &output_filepath)?;
    Ok(output_filepath)
}

/// Execute the configured run and return the files written to the output directory.
pub fn run(config: &Config) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.output_dir).map_err(|err| PipelineError::Write {
        path: config.output_dir.clone(),
        reason: err.to_string(),
    })?;
    let options = config.combine_options();
    match &config.pipeline {
        PipelineConfig::Stations {
            segments,
            crs,
            endpoints,
        } => stations::run(segments, crs, endpoints, &config.output_dir),
        PipelineConfig::Sightings {
            events,
            coordinates,
            events_crs,
            regions,
            regions_crs,
            predicate,
        } => sightings::run(
            &sightings::SightingsInputs {
                events,
                coordinates,
                events_crs,
                regions,
                regions_crs: regions_crs.as_ref(),
                predicate: *predicate,
            },
            options,
            &config.output_dir,
        ),
        PipelineConfig::Overlay {
            base,
            base_crs,
            mask,
            geocode,
        } => overlay::run(
            base,
            base_crs.as_ref(),
            mask,
            geocode.as_ref(),
            options,
            &config.output_dir,
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use testdir::testdir;

    use crate::geofile::schema::FieldType;

    use super::*;

    #[test]
    fn test_parse_stations_config() {
        let contents = r#"
output_dir: out
pipeline:
  Stations:
    segments:
      path: data/metro_stations.csv
      schema:
        station1_lon: Float
    crs: "EPSG:4326"
    endpoints:
      - { name: station1, x: station1_lon, y: station1_lat }
      - { name: station2, x: station2_lon, y: station2_lat }
"#;
        let config: Config = serde_yaml::from_str(contents).unwrap();
        assert!(config.strict_crs);
        match config.pipeline {
            PipelineConfig::Stations {
                segments,
                crs,
                endpoints,
            } => {
                assert_eq!(segments.path, PathBuf::from("data/metro_stations.csv"));
                assert_eq!(segments.format, None);
                assert_eq!(
                    segments.schema,
                    Some(DeclaredSchema::from([(
                        "station1_lon".to_string(),
                        FieldType::Float
                    )]))
                );
                assert_eq!(crs, Crs::wgs84());
                assert_eq!(endpoints[1], EndpointColumns::new("station2", "station2_lon", "station2_lat"));
            }
            other => panic!("unexpected pipeline {:?}", other),
        }
    }

    #[test]
    fn test_parse_sightings_config_defaults() {
        let contents = r#"
output_dir: out
strict_crs: false
pipeline:
  Sightings:
    events: { path: ufo.csv, format: Csv }
    coordinates: { x: lng, y: lat }
    events_crs: "EPSG:4269"
    regions: { path: counties.geojson }
"#;
        let config: Config = serde_yaml::from_str(contents).unwrap();
        assert!(!config.combine_options().strict_crs);
        match config.pipeline {
            PipelineConfig::Sightings {
                events,
                predicate,
                regions_crs,
                ..
            } => {
                assert_eq!(events.format, Some(GeofileFormat::Csv));
                assert_eq!(predicate, Predicate::Within);
                assert_eq!(regions_crs, None);
            }
            other => panic!("unexpected pipeline {:?}", other),
        }
    }

    #[test]
    fn test_run_stations_from_config() {
        let dir = testdir!();
        let segments_filepath = dir.join("segments.csv");
        fs::write(
            &segments_filepath,
            "station1,station1_lon,station1_lat,station2,station2_lon,station2_lat\n\
             Baker Street,-0.1571,51.5226,Regent's Park,-0.1466,51.5234\n",
        )
        .unwrap();
        let config = Config {
            output_dir: dir.join("out"),
            strict_crs: true,
            pipeline: PipelineConfig::Stations {
                segments: InputConfig::new(&segments_filepath),
                crs: Crs::wgs84(),
                endpoints: vec![
                    EndpointColumns::new("station1", "station1_lon", "station1_lat"),
                    EndpointColumns::new("station2", "station2_lon", "station2_lat"),
                ],
            },
        };
        let outputs = run(&config).unwrap();
        assert_eq!(outputs, vec![dir.join("out").join(stations::STATIONS_FILENAME)]);
        let stations = InputConfig::new(&outputs[0]).load().unwrap();
        assert_eq!(stations.len(), 2);
    }

    #[test]
    fn test_run_reports_missing_input() {
        let dir = testdir!();
        let config = Config {
            output_dir: dir.join("out"),
            strict_crs: true,
            pipeline: PipelineConfig::Stations {
                segments: InputConfig::new(dir.join("missing.csv")),
                crs: Crs::wgs84(),
                endpoints: vec![EndpointColumns::new("a", "b", "c")],
            },
        };
        assert!(matches!(run(&config), Err(PipelineError::Load { .. })));
    }
}
