use std::fmt;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

pub type EpsgCode = u32;

pub const WGS84_EPSG: EpsgCode = 4326;

// Parameters that do not change the coordinate mapping.
const NON_SEMANTIC_PROJ_PARAMS: [&str; 3] = ["+no_defs", "+type=crs", "+wktext"];

/// A coordinate reference system identifier, e.g. "EPSG:4326" or a PROJ string.
///
/// Two values are equal iff their canonical representations match. The canonical form is
/// derived from the identifier on every comparison and never cached.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct Crs {
    identifier: String,
}

impl Crs {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub fn from_epsg(code: EpsgCode) -> Self {
        Self::new(epsg_code_to_authority_string(code))
    }

    pub fn wgs84() -> Self {
        Self::from_epsg(WGS84_EPSG)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The EPSG code named by the identifier, if it names one.
    pub fn epsg_code(&self) -> Option<EpsgCode> {
        parse_authority_code(&self.identifier)
    }

    /// Resolve the identifier to a PROJ definition string.
    pub fn proj_definition(&self) -> Result<String> {
        let identifier = self.identifier.trim();
        if identifier.starts_with('+') {
            return Ok(identifier.to_string());
        }
        if is_crs84_alias(identifier) {
            return epsg_proj_definition(WGS84_EPSG)
                .ok_or_else(|| PipelineError::UnsupportedCrs(self.identifier.clone()));
        }
        parse_authority_code(identifier)
            .and_then(epsg_proj_definition)
            .ok_or_else(|| PipelineError::UnsupportedCrs(self.identifier.clone()))
    }

    /// Canonical textual form: the PROJ definition with non-semantic parameters dropped,
    /// lower-cased and sorted.
    pub fn canonical(&self) -> Result<String> {
        let definition = self.proj_definition()?;
        let mut params: Vec<String> = definition
            .split_whitespace()
            .map(|param| param.to_ascii_lowercase())
            .filter(|param| !NON_SEMANTIC_PROJ_PARAMS.contains(&param.as_str()))
            .collect();
        if params.is_empty() {
            return Err(PipelineError::UnsupportedCrs(self.identifier.clone()));
        }
        params.sort();
        params.dedup();
        Ok(params.join(" "))
    }

    pub fn to_proj(&self) -> Result<proj4rs::Proj> {
        let definition = self.proj_definition()?;
        proj4rs::Proj::from_proj_string(&definition).map_err(|err| {
            log::debug!("Could not initialise {}: {}", self.identifier, err);
            PipelineError::UnsupportedCrs(self.identifier.clone())
        })
    }

    pub fn is_geographic(&self) -> Result<bool> {
        Ok(self.to_proj()?.is_latlong())
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        match (self.canonical(), other.canonical()) {
            (Ok(a), Ok(b)) => a == b,
            // Unresolvable identifiers are only equal to themselves, verbatim.
            _ => self.identifier.trim() == other.identifier.trim(),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

fn is_crs84_alias(identifier: &str) -> bool {
    let upper = identifier.to_ascii_uppercase();
    matches!(upper.as_str(), "WGS84" | "CRS84" | "OGC:CRS84")
        || (upper.starts_with("URN:OGC:DEF:CRS:OGC:") && upper.ends_with(":CRS84"))
}

/// Parse "EPSG:<code>" and "urn:ogc:def:crs:EPSG:[version]:<code>".
fn parse_authority_code(identifier: &str) -> Option<EpsgCode> {
    let identifier = identifier.trim();
    let upper = identifier.to_ascii_uppercase();
    let code = if let Some(rest) = upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:") {
        rest.rsplit(':').next()?
    } else {
        upper.strip_prefix("EPSG:")?
    };
    code.trim().parse().ok()
}

/// PROJ definitions of the EPSG codes this crate can resolve.
pub fn epsg_proj_definition(code: EpsgCode) -> Option<String> {
    let definition = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        4269 => "+proj=longlat +datum=NAD83 +no_defs".to_string(),
        4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
        3857 => concat!(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1",
            " +units=m +no_defs"
        )
        .to_string(),
        2056 => concat!(
            "+proj=somerc +lat_0=46.9524055555556 +lon_0=7.43958333333333 +k_0=1",
            " +x_0=2600000 +y_0=1200000 +ellps=bessel",
            " +towgs84=674.374,15.056,405.346,0,0,0,0 +units=m +no_defs"
        )
        .to_string(),
        21781 => concat!(
            "+proj=somerc +lat_0=46.9524055555556 +lon_0=7.43958333333333 +k_0=1",
            " +x_0=600000 +y_0=200000 +ellps=bessel",
            " +towgs84=674.374,15.056,405.346,0,0,0,0 +units=m +no_defs"
        )
        .to_string(),
        27700 => concat!(
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000",
            " +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489",
            " +units=m +no_defs"
        )
        .to_string(),
        32601..=32660 => format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            code - 32600
        ),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        ),
        26901..=26923 => format!(
            "+proj=utm +zone={} +datum=NAD83 +units=m +no_defs",
            code - 26900
        ),
        _ => return None,
    };
    Some(definition)
}

/// EPSG code of the WGS84 UTM zone containing the lon/lat coordinate (degrees).
pub fn utm_epsg_for_lonlat(lon: f64, lat: f64) -> Result<EpsgCode> {
    if !(-180.0..=180.0).contains(&lon) || !(-80.0..=84.0).contains(&lat) {
        return Err(PipelineError::UnsupportedCrs(format!(
            "UTM zone for ({}, {})",
            lon, lat
        )));
    }
    let zone = (((lon + 180.0) / 6.0).floor() as EpsgCode + 1).min(60);
    if lat >= 0.0 {
        Ok(32600 + zone)
    } else {
        Ok(32700 + zone)
    }
}
