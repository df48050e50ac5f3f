extern crate log;
pub mod combine;
pub mod crs;
pub mod error;
pub mod geocode;
pub mod geofile;
pub mod pipeline;
pub mod synthesis;
