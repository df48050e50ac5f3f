pub mod nominatim;

use indicatif::ProgressBar;

use crate::{
    crs::crs_utils::Crs,
    error::Result,
    geofile::{
        feature::{AttributeValue, FeatureCollection, FeatureRecord},
        schema::{Field, FieldType, Schema},
    },
};

pub const QUERY_COLUMN: &str = "query";
pub const ADDRESS_COLUMN: &str = "address";

/// Best match for a free-text place query.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    /// Display name reported by the service.
    pub address: String,
    /// WGS84 longitude/latitude.
    pub location: geo::Point,
}

/// Resolves place names to WGS84 points. Failures are reported as `PipelineError::Geocode`.
pub trait Geocoder {
    fn geocode(&self, query: &str) -> Result<GeocodedPlace>;
}

/// Geocode every query in order. A single failure aborts the whole batch.
///
/// The result has the columns `query` and `address`, one Point per query, and is tagged
/// EPSG:4326.
pub fn geocode_all(geocoder: &impl Geocoder, queries: &[String]) -> Result<FeatureCollection> {
    let schema = Schema::new(vec![
        Field::new(QUERY_COLUMN, FieldType::Text),
        Field::new(ADDRESS_COLUMN, FieldType::Text),
    ])?;
    let mut places = FeatureCollection::new(schema, Some(Crs::wgs84()));

    log::info!("Geocoding {} places", queries.len());
    let bar = ProgressBar::new(queries.len() as u64);
    for query in queries {
        let place = geocoder.geocode(query)?;
        log::debug!("'{}' resolved to {} at {:?}", query, place.address, place.location);
        places.push(FeatureRecord::new(
            vec![
                AttributeValue::from(query.as_str()),
                AttributeValue::from(place.address),
            ],
            Some(geo::Geometry::Point(place.location)),
        ))?;
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(places)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use crate::error::{GeocodeFailure, PipelineError};

    use super::*;

    /// In-memory geocoder over a fixed table of places.
    pub(crate) struct TableGeocoder {
        places: HashMap<String, (f64, f64)>,
        pub(crate) calls: RefCell<Vec<String>>,
    }

    impl TableGeocoder {
        pub(crate) fn new(places: &[(&str, f64, f64)]) -> Self {
            Self {
                places: places
                    .iter()
                    .map(|(name, lon, lat)| (name.to_string(), (*lon, *lat)))
                    .collect(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Geocoder for TableGeocoder {
        fn geocode(&self, query: &str) -> Result<GeocodedPlace> {
            self.calls.borrow_mut().push(query.to_string());
            let (lon, lat) = self.places.get(query).ok_or_else(|| PipelineError::Geocode {
                query: query.to_string(),
                reason: GeocodeFailure::NotFound,
            })?;
            Ok(GeocodedPlace {
                address: format!("{}, Earth", query),
                location: geo::Point::new(*lon, *lat),
            })
        }
    }

    #[test]
    fn test_geocode_all() {
        let geocoder = TableGeocoder::new(&[
            ("Boston", -71.0596, 42.3601),
            ("New York", -74.0060, 40.7128),
        ]);
        let queries = vec!["New York".to_string(), "Boston".to_string()];
        let places = geocode_all(&geocoder, &queries).unwrap();

        assert_eq!(places.len(), 2);
        assert_eq!(places.crs(), Some(&Crs::wgs84()));
        assert_eq!(
            places.value(0, QUERY_COLUMN).unwrap(),
            Some(&AttributeValue::from("New York"))
        );
        assert_eq!(
            places.value(1, ADDRESS_COLUMN).unwrap(),
            Some(&AttributeValue::from("Boston, Earth"))
        );
        assert_eq!(
            places.records()[1].geometry,
            Some(geo::Geometry::Point(geo::Point::new(-71.0596, 42.3601)))
        );
    }

    #[test]
    fn test_one_failure_aborts_the_batch() {
        let geocoder = TableGeocoder::new(&[("Boston", -71.0596, 42.3601)]);
        let queries = vec![
            "Boston".to_string(),
            "Atlantis".to_string(),
            "Boston".to_string(),
        ];
        let result = geocode_all(&geocoder, &queries);
        assert!(matches!(
            result,
            Err(PipelineError::Geocode { query, reason: GeocodeFailure::NotFound })
                if query == "Atlantis"
        ));
        // Nothing after the failed lookup is attempted.
        assert_eq!(geocoder.calls.borrow().len(), 2);
    }

    #[test]
    fn test_no_queries() {
        let geocoder = TableGeocoder::new(&[]);
        let places = geocode_all(&geocoder, &[]).unwrap();
        assert!(places.is_empty());
        assert_eq!(places.schema().len(), 2);
    }
}
