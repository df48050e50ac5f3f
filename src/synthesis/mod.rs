pub mod harmonize;
pub mod points;
