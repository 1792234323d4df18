use crate::config::{AppConfig, MarkerConfig};
use crate::state::Datasets;
use crate::types::{AdoptionRecord, RegionBoundary, Route};
use anyhow::{anyhow, Context, Result};
use geo::{BoundingRect, Contains, Coord, Point, Rect};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::info;

const METERS_PER_DEGREE: f64 = 111_320.0;
// Scatter radius in meters is adoption_total * RADIUS_PER_PRACTICE * RADIUS_SCALE.
const RADIUS_PER_PRACTICE: f64 = 30.0;
const RADIUS_SCALE: f64 = 3.6;
const MARGIN: f64 = 0.05;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const OUTLINE: Rgba<u8> = Rgba([80, 80, 80, 200]);
const ROUTE: Rgba<u8> = Rgba([120, 120, 120, 160]);
const POINT_FILL: Rgba<u8> = Rgba([0, 0, 255, 140]);
const POINT_STROKE: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MARKER: Rgba<u8> = Rgba([220, 30, 30, 255]);

/// Linear lon/lat → pixel mapping over a bounding box, with the x axis
/// shrunk by cos(lat) so shapes keep their proportions.
struct Viewport {
    bounds: Rect<f64>,
    width: u32,
    height: u32,
    px_per_deg_x: f64,
    px_per_deg_y: f64,
}

impl Viewport {
    fn fit(bounds: Rect<f64>, width: u32) -> Result<Self> {
        let w = bounds.width();
        let h = bounds.height();
        if w <= 0.0 || h <= 0.0 || width == 0 {
            return Err(anyhow!("nothing to draw: empty map extent"));
        }
        let mid_lat = (bounds.min().y + bounds.max().y) / 2.0;
        let aspect = mid_lat.to_radians().cos().max(0.01);
        let px_per_deg_x = width as f64 / w;
        let px_per_deg_y = px_per_deg_x / aspect;
        let height = (h * px_per_deg_y).ceil().max(1.0) as u32;
        Ok(Self {
            bounds,
            width,
            height,
            px_per_deg_x,
            px_per_deg_y,
        })
    }

    fn to_pixel(&self, c: Coord<f64>) -> (f64, f64) {
        let x = (c.x - self.bounds.min().x) * self.px_per_deg_x;
        let y = (self.bounds.max().y - c.y) * self.px_per_deg_y;
        (x, y)
    }

    fn to_coord(&self, px: u32, py: u32) -> Coord<f64> {
        Coord {
            x: self.bounds.min().x + (px as f64 + 0.5) / self.px_per_deg_x,
            y: self.bounds.max().y - (py as f64 + 0.5) / self.px_per_deg_y,
        }
    }

    fn meters_to_pixels(&self, meters: f64) -> f64 {
        meters / METERS_PER_DEGREE * self.px_per_deg_y
    }
}

/// Draws the map layers (highlighted departments, routes, adoption points and
/// the marker) into a single PNG.
pub fn render_overview(config: &AppConfig, data: &Datasets) -> Result<()> {
    let targets = data.targets();
    let image = draw(&targets, &data.routes, &data.records, &config.map.marker, config.output.width)?;

    let path = &config.output.map_png;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    save(&image, path)?;
    info!("Wrote {}x{} overview to {:?}", image.width(), image.height(), path);
    Ok(())
}

fn save(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to save overview {:?}", path))
}

fn draw(
    targets: &[&RegionBoundary],
    routes: &[Route],
    records: &[AdoptionRecord],
    marker: &MarkerConfig,
    width: u32,
) -> Result<RgbaImage> {
    let bounds = extent(targets, records, marker)
        .ok_or_else(|| anyhow!("nothing to draw: no boundaries or located records"))?;
    let view = Viewport::fit(bounds, width)?;
    let mut img = RgbaImage::from_pixel(view.width, view.height, BACKGROUND);

    fill_polygons(&mut img, &view, targets);
    for route in routes {
        for line in route.geometry.iter() {
            draw_path(&mut img, &view, line.coords().copied(), ROUTE);
        }
    }
    for boundary in targets {
        for polygon in boundary.geometry.iter() {
            draw_path(&mut img, &view, polygon.exterior().coords().copied(), OUTLINE);
        }
    }
    for record in records {
        let (Some(lon), Some(lat)) = (record.longitude, record.latitude) else {
            continue;
        };
        let meters = record.adoption_total.unwrap_or(0.0) * RADIUS_PER_PRACTICE * RADIUS_SCALE;
        let radius = view.meters_to_pixels(meters).max(1.0);
        draw_circle(&mut img, &view, Coord { x: lon, y: lat }, radius, POINT_FILL, Some(POINT_STROKE));
    }
    draw_circle(&mut img, &view, Coord { x: marker.lon, y: marker.lat }, 6.0, MARKER, None);

    Ok(img)
}

fn extent(
    targets: &[&RegionBoundary],
    records: &[AdoptionRecord],
    marker: &MarkerConfig,
) -> Option<Rect<f64>> {
    let mut coords: Vec<Coord<f64>> = targets
        .iter()
        .filter_map(|b| b.geometry.bounding_rect())
        .flat_map(|r| [r.min(), r.max()])
        .collect();
    coords.extend(records.iter().filter_map(|r| match (r.longitude, r.latitude) {
        (Some(x), Some(y)) => Some(Coord { x, y }),
        _ => None,
    }));
    if coords.is_empty() {
        return None;
    }
    coords.push(Coord { x: marker.lon, y: marker.lat });

    let (mut min, mut max) = (coords[0], coords[0]);
    for c in &coords {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    let pad_x = ((max.x - min.x) * MARGIN).max(0.01);
    let pad_y = ((max.y - min.y) * MARGIN).max(0.01);
    Some(Rect::new(
        Coord { x: min.x - pad_x, y: min.y - pad_y },
        Coord { x: max.x + pad_x, y: max.y + pad_y },
    ))
}

fn fill_polygons(img: &mut RgbaImage, view: &Viewport, targets: &[&RegionBoundary]) {
    let fills: Vec<_> = targets
        .iter()
        .filter_map(|b| Some((b, b.fill_color()?, b.geometry.bounding_rect()?)))
        .collect();
    let width = img.width() as usize;

    // One row per task; each pixel tests the departments whose bbox covers it.
    img.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(py, row)| {
            for px in 0..width {
                let c = view.to_coord(px as u32, py as u32);
                for (boundary, color, bbox) in &fills {
                    if !bbox.contains(&c) || !boundary.geometry.contains(&Point::from(c)) {
                        continue;
                    }
                    let i = px * 4;
                    let mut pixel = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                    blend(&mut pixel, Rgba(*color));
                    row[i..i + 4].copy_from_slice(&pixel.0);
                }
            }
        });
}

fn draw_path(img: &mut RgbaImage, view: &Viewport, coords: impl Iterator<Item = Coord<f64>>, color: Rgba<u8>) {
    let mut prev: Option<(f64, f64)> = None;
    for c in coords {
        let p = view.to_pixel(c);
        if let Some(q) = prev {
            let steps = (p.0 - q.0).abs().max((p.1 - q.1).abs()).ceil().max(1.0) as u32;
            for s in 0..=steps {
                let t = s as f64 / steps as f64;
                put(img, q.0 + (p.0 - q.0) * t, q.1 + (p.1 - q.1) * t, color);
            }
        }
        prev = Some(p);
    }
}

fn draw_circle(
    img: &mut RgbaImage,
    view: &Viewport,
    center: Coord<f64>,
    radius: f64,
    fill: Rgba<u8>,
    stroke: Option<Rgba<u8>>,
) {
    let (cx, cy) = view.to_pixel(center);
    let r = radius.ceil() as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            let d = ((dx * dx + dy * dy) as f64).sqrt();
            if d > radius {
                continue;
            }
            let color = match stroke {
                Some(s) if d > radius - 1.0 => s,
                _ => fill,
            };
            put(img, cx + dx as f64, cy + dy as f64, color);
        }
    }
}

fn put(img: &mut RgbaImage, x: f64, y: f64, color: Rgba<u8>) {
    if x < 0.0 || y < 0.0 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    if x >= img.width() || y >= img.height() {
        return;
    }
    blend(img.get_pixel_mut(x, y), color);
}

/// Source-over alpha compositing.
fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let a = src.0[3] as f64 / 255.0;
    for i in 0..3 {
        dst.0[i] = (src.0[i] as f64 * a + dst.0[i] as f64 * (1.0 - a)).round() as u8;
    }
    let out_a = a + dst.0[3] as f64 / 255.0 * (1.0 - a);
    dst.0[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundaries::tests::boundary;

    fn located(lon: f64, lat: f64, total: f64) -> AdoptionRecord {
        AdoptionRecord {
            locality: Some("X".into()),
            adoption_total: Some(total),
            longitude: Some(lon),
            latitude: Some(lat),
            ..Default::default()
        }
    }

    #[test]
    fn blend_is_source_over() {
        let mut px = Rgba([255, 255, 255, 255]);
        blend(&mut px, Rgba([0, 0, 0, 255]));
        assert_eq!(px, Rgba([0, 0, 0, 255]));

        let mut px = Rgba([255, 255, 255, 255]);
        blend(&mut px, Rgba([0, 0, 255, 0]));
        assert_eq!(px, Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn viewport_maps_corners() {
        let rect = Rect::new(Coord { x: -65.0, y: -31.0 }, Coord { x: -64.0, y: -30.0 });
        let view = Viewport::fit(rect, 100).unwrap();

        assert_eq!(view.to_pixel(Coord { x: -65.0, y: -30.0 }), (0.0, 0.0));
        let (x, y) = view.to_pixel(Coord { x: -64.0, y: -31.0 });
        assert!((x - 100.0).abs() < 1e-9);
        assert!((y - view.height as f64).abs() < 1.0);
        // 30° south: a degree of longitude is shorter than one of latitude
        assert!(view.height > view.width);
    }

    #[test]
    fn degenerate_extent_is_an_error() {
        let rect = Rect::new(Coord { x: -64.0, y: -30.0 }, Coord { x: -64.0, y: -30.0 });
        assert!(Viewport::fit(rect, 100).is_err());
    }

    #[test]
    fn draw_fills_targets_and_points() {
        let totoral = boundary("TOTORAL", -64.0, -31.0);
        let targets = vec![&totoral];
        let records = vec![located(-63.75, -30.75, 4.0)];
        let img = draw(&targets, &[], &records, &MarkerConfig::default(), 200).unwrap();

        assert_eq!(img.width(), 200);
        let view = Viewport::fit(extent(&targets, &records, &MarkerConfig::default()).unwrap(), 200).unwrap();

        // centre of the record is painted with the point colour
        let (x, y) = view.to_pixel(Coord { x: -63.75, y: -30.75 });
        let px = img.get_pixel(x as u32, y as u32);
        assert!(px.0[2] > px.0[0]);

        // inside the polygon but away from the point: faint red tint
        let (x, y) = view.to_pixel(Coord { x: -63.95, y: -30.95 });
        let px = img.get_pixel(x as u32, y as u32);
        assert_eq!(px.0[0], 255);
        assert!(px.0[1] < 255);
    }

    #[test]
    fn nothing_to_draw_is_an_error() {
        assert!(draw(&[], &[], &[], &MarkerConfig::default(), 100).is_err());
    }
}
