use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use serde::Deserialize;

use crate::error::{GeocodeFailure, PipelineError, Result};

use super::{GeocodedPlace, Geocoder};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

fn default_base_url() -> String {
    DEFAULT_NOMINATIM_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_min_interval_millis() -> u64 {
    1000
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeocoderConfig {
    /// Nominatim's usage policy requires an identifying user agent.
    pub user_agent: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Minimum time between two requests.
    #[serde(default = "default_min_interval_millis")]
    pub min_interval_millis: u64,
}

impl GeocoderConfig {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            min_interval_millis: default_min_interval_millis(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct NominatimPlace {
    display_name: String,
    lat: String,
    lon: String,
}

/// Blocking client for the Nominatim search API.
pub struct NominatimGeocoder {
    client: reqwest::blocking::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Cell<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| PipelineError::Geocode {
                query: String::new(),
                reason: GeocodeFailure::Service(format!("could not build HTTP client, {}", err)),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            min_interval: Duration::from_millis(config.min_interval_millis),
            last_request: Cell::new(None),
        })
    }

    fn wait_for_turn(&self) {
        if let Some(last_request) = self.last_request.get() {
            let elapsed = last_request.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }

    fn search(&self, query: &str) -> std::result::Result<GeocodedPlace, GeocodeFailure> {
        self.wait_for_turn();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .map_err(request_failure)?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeFailure::RateLimited);
        }
        let places: Vec<NominatimPlace> = response
            .error_for_status()
            .map_err(request_failure)?
            .json()
            .map_err(request_failure)?;
        let place = places.into_iter().next().ok_or(GeocodeFailure::NotFound)?;
        parse_place(place)
    }
}

fn request_failure(err: reqwest::Error) -> GeocodeFailure {
    if err.is_timeout() {
        GeocodeFailure::Timeout
    } else {
        GeocodeFailure::Service(err.to_string())
    }
}

fn parse_place(place: NominatimPlace) -> std::result::Result<GeocodedPlace, GeocodeFailure> {
    let lon: f64 = place.lon.trim().parse().map_err(|_| {
        GeocodeFailure::Service(format!("invalid longitude '{}' in response", place.lon))
    })?;
    let lat: f64 = place.lat.trim().parse().map_err(|_| {
        GeocodeFailure::Service(format!("invalid latitude '{}' in response", place.lat))
    })?;
    Ok(GeocodedPlace {
        address: place.display_name,
        location: geo::Point::new(lon, lat),
    })
}

impl Geocoder for NominatimGeocoder {
    fn geocode(&self, query: &str) -> Result<GeocodedPlace> {
        self.search(query).map_err(|reason| PipelineError::Geocode {
            query: query.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    use rstest::rstest;

    use super::*;

    /// Serve a single HTTP response on a local port and return the search URL pointing at it.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut request = [0u8; 4096];
                let _ = stream.read(&mut request);
                thread::sleep(delay);
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/search", address)
    }

    fn local_geocoder(base_url: String, timeout_seconds: u64) -> NominatimGeocoder {
        let config = GeocoderConfig {
            base_url,
            timeout_seconds,
            min_interval_millis: 0,
            ..GeocoderConfig::new("gis-pipeline-tests")
        };
        NominatimGeocoder::new(&config).unwrap()
    }

    #[test]
    fn test_search_returns_first_place() {
        let base_url = serve_once(
            "200 OK",
            r#"[{"lat": "47.3642", "lon": "8.5314", "display_name": "Bahnhof Enge, Zurich"}]"#,
            Duration::ZERO,
        );
        let place = local_geocoder(base_url, 5).geocode("Bahnhof Enge").unwrap();
        assert_eq!(place.location, geo::Point::new(8.5314, 47.3642));
        assert_eq!(place.address, "Bahnhof Enge, Zurich");
    }

    #[rstest]
    #[case("200 OK", "[]", GeocodeFailure::NotFound)]
    #[case("429 Too Many Requests", "{}", GeocodeFailure::RateLimited)]
    fn test_search_failure_classification(
        #[case] status: &'static str,
        #[case] body: &'static str,
        #[case] expected: GeocodeFailure,
    ) {
        let base_url = serve_once(status, body, Duration::ZERO);
        match local_geocoder(base_url, 5).geocode("Atlantis") {
            Err(PipelineError::Geocode { query, reason }) => {
                assert_eq!(query, "Atlantis");
                assert_eq!(reason, expected);
            }
            other => panic!("expected a geocode failure, got {:?}", other),
        }
    }

    #[test]
    fn test_slow_service_times_out() {
        let base_url = serve_once("200 OK", "[]", Duration::from_secs(3));
        assert!(matches!(
            local_geocoder(base_url, 1).geocode("Bahnhof Enge"),
            Err(PipelineError::Geocode {
                reason: GeocodeFailure::Timeout,
                ..
            })
        ));
    }

    #[test]
    fn test_server_error_is_service_failure() {
        let base_url = serve_once("500 Internal Server Error", "{}", Duration::ZERO);
        assert!(matches!(
            local_geocoder(base_url, 5).geocode("Bahnhof Enge"),
            Err(PipelineError::Geocode {
                reason: GeocodeFailure::Service(_),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_response() {
        let body = r#"[{"place_id": 1, "lat": "42.3554334", "lon": "-71.060511",
            "display_name": "Boston, Suffolk County, Massachusetts, United States"}]"#;
        let places: Vec<NominatimPlace> = serde_json::from_str(body).unwrap();
        let place = parse_place(places.into_iter().next().unwrap()).unwrap();
        assert_eq!(place.location, geo::Point::new(-71.060511, 42.3554334));
        assert!(place.address.starts_with("Boston"));
    }

    #[test]
    fn test_parse_invalid_coordinates() {
        let place = NominatimPlace {
            display_name: "Nowhere".to_string(),
            lat: "north".to_string(),
            lon: "0".to_string(),
        };
        assert!(matches!(parse_place(place), Err(GeocodeFailure::Service(_))));
    }

    #[test]
    fn test_config_defaults() {
        let config: GeocoderConfig = serde_yaml::from_str("user_agent: gis-pipeline-tests").unwrap();
        assert_eq!(config, GeocoderConfig::new("gis-pipeline-tests"));
        assert_eq!(config.base_url, DEFAULT_NOMINATIM_URL);
    }

    #[test]
    fn test_minimum_interval_between_requests() {
        let mut config = GeocoderConfig::new("gis-pipeline-tests");
        config.min_interval_millis = 50;
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        let start = Instant::now();
        geocoder.wait_for_turn();
        geocoder.wait_for_turn();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
