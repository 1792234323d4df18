use chrono::NaiveDate;
use geo::{MultiLineString, MultiPolygon};
use serde::Serialize;

/// One row of the adoption dataset (one locality, one year).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AdoptionRecord {
    pub locality: Option<String>,
    pub year: Option<NaiveDate>, // None when the source date did not parse
    pub adoption_total: Option<f64>,
    pub area_total: Option<f64>,
    pub area_adopted: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    // Indicators below are only shown in tooltips.
    pub bio_inputs: Option<String>,
    pub circular_economy: Option<String>,
    pub renewable_energy: Option<String>,
}

/// An administrative department with its outline in lon/lat degrees.
#[derive(Debug, Clone)]
pub struct RegionBoundary {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

/// A road feature; only its paths are used.
#[derive(Debug, Clone)]
pub struct Route {
    pub geometry: MultiLineString<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub locality: String,
    pub total: f64,
}

/// Per-locality statistics shown in the narrative panel.
///
/// A mean is `None` when every value of that field is missing for the
/// locality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalitySummary {
    pub locality: String,
    pub record_count: usize,
    pub mean_area_adopted: Option<f64>,
    pub mean_area_total: Option<f64>,
    pub mean_adoption_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTotal {
    pub year: NaiveDate,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaPoint {
    pub area_total: f64,
    pub area_adopted: f64,
}
