use crate::error::DataError;
use crate::types::AdoptionRecord;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

pub const COL_LOCALITY: &str = "localidad";
pub const COL_YEAR: &str = "Año";
pub const COL_ADOPTION_TOTAL: &str = "bpa_total";
pub const COL_AREA_TOTAL: &str = "superficie";
pub const COL_AREA_ADOPTED: &str = "superficie_bpa";
pub const COL_LON: &str = "lon";
pub const COL_LAT: &str = "lat";

const COL_BIO_INPUTS: &str = "bioinsumos";
const COL_CIRCULAR_ECONOMY: &str = "economia_circular";
const COL_RENEWABLE_ENERGY: &str = "efic_energ_y_energia_renov";

/// Column positions resolved once from the header row.
struct Columns {
    locality: usize,
    year: usize,
    adoption_total: usize,
    area_total: usize,
    area_adopted: usize,
    lon: usize,
    lat: usize,
    bio_inputs: Option<usize>,
    circular_economy: Option<usize>,
    renewable_energy: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord, path: &Path) -> Result<Self, DataError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            find(name).ok_or_else(|| {
                DataError::format(path, format!("required column '{}' not found", name))
            })
        };

        Ok(Self {
            locality: require(COL_LOCALITY)?,
            year: require(COL_YEAR)?,
            adoption_total: require(COL_ADOPTION_TOTAL)?,
            area_total: require(COL_AREA_TOTAL)?,
            area_adopted: require(COL_AREA_ADOPTED)?,
            lon: require(COL_LON)?,
            lat: require(COL_LAT)?,
            bio_inputs: find(COL_BIO_INPUTS),
            circular_economy: find(COL_CIRCULAR_ECONOMY),
            renewable_energy: find(COL_RENEWABLE_ENERGY),
        })
    }
}

/// Loads the adoption dataset from a CSV file.
pub fn load(path: &Path, date_format: &str) -> Result<Vec<AdoptionRecord>, DataError> {
    let file = File::open(path)
        .map_err(|e| DataError::format(path, format!("failed to open CSV: {}", e)))?;
    let records = load_from_reader(file, path, date_format)?;
    info!("Loaded {} adoption records from {:?}", records.len(), path);
    Ok(records)
}

/// Same as [`load`] for an already opened source; `origin` only labels errors.
pub fn load_from_reader<R: Read>(
    reader: R,
    origin: &Path,
    date_format: &str,
) -> Result<Vec<AdoptionRecord>, DataError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| DataError::format(origin, format!("failed to read header: {}", e)))?
        .clone();
    let cols = Columns::resolve(&headers, origin)?;

    let mut records = Vec::new();
    let mut bad_dates = 0usize;

    for result in rdr.records() {
        let row = result.map_err(|e| DataError::format(origin, e.to_string()))?;
        // Header is line 1.
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let field = |idx: usize| row.get(idx).unwrap_or("");

        let number = |idx: usize, name: &str| {
            parse_number(field(idx)).map_err(|raw| {
                DataError::format(
                    origin,
                    format!("line {}: column '{}' is not a number: '{}'", line, name, raw),
                )
            })
        };

        let year_raw = field(cols.year);
        let year = parse_date(year_raw, date_format);
        if year.is_none() && !year_raw.is_empty() {
            bad_dates += 1;
        }

        records.push(AdoptionRecord {
            locality: text(field(cols.locality)),
            year,
            adoption_total: number(cols.adoption_total, COL_ADOPTION_TOTAL)?,
            area_total: number(cols.area_total, COL_AREA_TOTAL)?,
            area_adopted: number(cols.area_adopted, COL_AREA_ADOPTED)?,
            longitude: number(cols.lon, COL_LON)?,
            latitude: number(cols.lat, COL_LAT)?,
            bio_inputs: cols.bio_inputs.and_then(|i| text(field(i))),
            circular_economy: cols.circular_economy.and_then(|i| text(field(i))),
            renewable_energy: cols.renewable_energy.and_then(|i| text(field(i))),
        });
    }

    if bad_dates > 0 {
        warn!(
            "{} of {} rows in {:?} have a '{}' value not matching {}; their year is unknown",
            bad_dates,
            records.len(),
            origin,
            COL_YEAR,
            date_format
        );
    }

    Ok(records)
}

/// Parses a date cell; anything not matching `format` yields `None`.
pub fn parse_date(raw: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, format).ok()
}

/// Blank and NaN cells are missing; anything else must be a number.
fn parse_number(raw: &str) -> Result<Option<f64>, String> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| raw.to_string())
}

fn text(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
