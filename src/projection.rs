//! Reprojection of source geometries to WGS84 longitude/latitude.
//!
//! Shapefile archives describe their CRS with an ESRI WKT `.prj` sidecar;
//! `proj4wkt` turns it into a proj string for `proj4rs`.

use geo::{Coord, MapCoords};
use proj4rs::proj::Proj;
use std::path::Path;

use crate::error::DataError;

const WGS84: &str = "+proj=longlat +datum=WGS84";

/// Converts coordinates from a source CRS into lon/lat degrees.
pub struct Projector {
    // None when the source is already geographic.
    transform: Option<(Proj, Proj)>,
}

impl Projector {
    pub fn geographic() -> Self {
        Self { transform: None }
    }

    pub fn from_proj_string(defn: &str) -> Result<Self, String> {
        if is_geographic_proj(defn) {
            return Ok(Self::geographic());
        }
        let src = Proj::from_proj_string(defn)
            .map_err(|e| format!("invalid proj string '{}': {:?}", defn, e))?;
        let dst = Proj::from_proj_string(WGS84).map_err(|e| format!("{:?}", e))?;
        Ok(Self {
            transform: Some((src, dst)),
        })
    }

    pub fn from_wkt(wkt: &str) -> Result<Self, String> {
        let defn = proj4wkt::wkt_to_projstring(wkt.trim())
            .map_err(|e| format!("unsupported .prj definition: {:?}", e))?;
        Self::from_proj_string(&defn)
    }

    #[cfg(test)]
    fn is_identity(&self) -> bool {
        self.transform.is_none()
    }

    pub fn to_lon_lat(&self, c: Coord<f64>) -> Result<Coord<f64>, String> {
        let out = match &self.transform {
            None => c,
            Some((src, dst)) => {
                let mut point = (c.x, c.y, 0.0);
                proj4rs::transform::transform(src, dst, &mut point)
                    .map_err(|e| format!("cannot reproject ({}, {}): {:?}", c.x, c.y, e))?;
                Coord {
                    x: point.0.to_degrees(),
                    y: point.1.to_degrees(),
                }
            }
        };
        if !in_geographic_bounds(out) {
            return Err(format!(
                "coordinate ({}, {}) is not a valid longitude/latitude; the source CRS is probably not declared",
                out.x, out.y
            ));
        }
        Ok(out)
    }

    /// Reprojects every coordinate of a geometry, failing on the first
    /// coordinate that lands outside geographic bounds.
    pub fn reproject<G>(&self, geometry: &G, origin: &Path) -> Result<G::Output, DataError>
    where
        G: MapCoords<f64, f64>,
    {
        geometry
            .try_map_coords(|c| self.to_lon_lat(c))
            .map_err(|reason| DataError::format(origin, reason))
    }
}

pub fn in_geographic_bounds(c: Coord<f64>) -> bool {
    (-180.0..=180.0).contains(&c.x) && (-90.0..=90.0).contains(&c.y)
}

fn is_geographic_proj(defn: &str) -> bool {
    defn.split_whitespace()
        .any(|t| matches!(t, "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use geo::{polygon, BoundingRect};

    pub(crate) const POSGAR_FAJA_4: &str = r#"PROJCS["POSGAR_2007_Argentina_4",GEOGCS["GCS_POSGAR_2007",DATUM["D_POSGAR_2007",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",4500000.0],PARAMETER["False_Northing",0.0],PARAMETER["Central_Meridian",-63.0],PARAMETER["Scale_Factor",1.0],PARAMETER["Latitude_Of_Origin",-90.0],UNIT["Meter",1.0]]"#;

    const WGS84_GEOG: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    #[test]
    fn gauss_kruger_wkt_is_projected() {
        let projector = Projector::from_wkt(POSGAR_FAJA_4).unwrap();
        assert!(!projector.is_identity());
    }

    #[test]
    fn geographic_wkt_is_identity() {
        let projector = Projector::from_wkt(WGS84_GEOG).unwrap();
        assert!(projector.is_identity());
    }

    #[test]
    fn malformed_wkt_is_rejected() {
        assert!(Projector::from_wkt("PROJCS[\"broken\"").is_err());
        assert!(Projector::from_wkt("").is_err());
    }

    #[test]
    fn invalid_proj_string_is_rejected() {
        assert!(Projector::from_proj_string("+proj=nonsense +x_0=1").is_err());
    }

    #[test]
    fn central_meridian_point_lands_on_meridian() {
        let projector = Projector::from_wkt(POSGAR_FAJA_4).unwrap();
        let c = projector
            .to_lon_lat(Coord { x: 4_500_000.0, y: 6_560_000.0 })
            .unwrap();

        assert!((c.x + 63.0).abs() < 1e-6, "lon was {}", c.x);
        assert!(c.y > -31.5 && c.y < -30.5, "lat was {}", c.y);
    }

    #[test]
    fn configured_proj_string_matches_prj() {
        let from_prj = Projector::from_wkt(POSGAR_FAJA_4).unwrap();
        let configured = Projector::from_proj_string(
            "+proj=tmerc +lat_0=-90 +lon_0=-63 +k=1 +x_0=4500000 +y_0=0 +ellps=GRS80 +units=m",
        )
        .unwrap();

        let c = Coord { x: 4_420_000.0, y: 6_580_000.0 };
        let a = from_prj.to_lon_lat(c).unwrap();
        let b = configured.to_lon_lat(c).unwrap();
        assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
    }

    #[test]
    fn reprojected_polygon_is_within_geographic_bounds() {
        let projector = Projector::from_wkt(POSGAR_FAJA_4).unwrap();
        let square = polygon![
            (x: 4_380_000.0, y: 6_540_000.0),
            (x: 4_450_000.0, y: 6_540_000.0),
            (x: 4_450_000.0, y: 6_620_000.0),
            (x: 4_380_000.0, y: 6_620_000.0),
        ];

        let out = projector.reproject(&square, Path::new("t.shp")).unwrap();
        let bbox = out.bounding_rect().unwrap();
        assert!(in_geographic_bounds(bbox.min()));
        assert!(in_geographic_bounds(bbox.max()));
        assert!(bbox.max().x < -63.0);
    }

    #[test]
    fn projected_coordinates_without_crs_are_rejected() {
        let projector = Projector::geographic();
        assert!(projector
            .to_lon_lat(Coord { x: 4_400_000.0, y: 6_500_000.0 })
            .is_err());
        assert!(projector.to_lon_lat(Coord { x: -64.0, y: -30.0 }).is_ok());
    }
}
