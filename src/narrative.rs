use crate::types::{LocalitySummary, RankEntry};
use std::fmt::Write;

const NO_DATA: &str = "sin datos";

/// The narrative panel shown below the charts for the selected locality.
pub fn render_panel(summary: &LocalitySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Narrativa territorial: {}", title_case(&summary.locality));
    let _ = writeln!(
        out,
        "Esta localidad presenta un total de {} registros BPA entre 2019 y 2024.",
        summary.record_count
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "- Superficie BPA promedio: {}", with_unit(summary.mean_area_adopted, " ha"));
    let _ = writeln!(out, "- Superficie total promedio: {}", with_unit(summary.mean_area_total, " ha"));
    let _ = writeln!(out, "- BPA aplicadas promedio: {}", with_unit(summary.mean_adoption_total, ""));
    out
}

/// Plain-text version of the ranking chart.
pub fn render_ranking(ranking: &[RankEntry]) -> String {
    let width = ranking.iter().map(|e| e.locality.chars().count()).max().unwrap_or(0);
    let mut out = String::new();
    let _ = writeln!(out, "Top {} localidades por BPA total", ranking.len());
    for (i, entry) in ranking.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {:<width$}  {}",
            i + 1,
            entry.locality,
            format_number(entry.total),
            width = width
        );
    }
    out
}

fn with_unit(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.2}{}", v, unit),
        None => NO_DATA.to_string(),
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// "VILLA DEL TOTORAL" -> "Villa Del Totoral". A letter following any
/// non-letter starts a new word, so "VILLA-NUEVA" -> "Villa-Nueva".
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_is_letter = c.is_alphabetic();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> LocalitySummary {
        LocalitySummary {
            locality: "SAN JOSÉ DE LA DORMIDA".into(),
            record_count: 7,
            mean_area_adopted: Some(120.456),
            mean_area_total: None,
            mean_adoption_total: Some(3.0),
        }
    }

    #[test]
    fn panel_formats_means_and_missing_values() {
        let panel = render_panel(&summary());

        assert!(panel.contains("Narrativa territorial: San José De La Dormida"));
        assert!(panel.contains("7 registros BPA"));
        assert!(panel.contains("Superficie BPA promedio: 120.46 ha"));
        assert!(panel.contains("Superficie total promedio: sin datos"));
        assert!(panel.contains("BPA aplicadas promedio: 3.00"));
    }

    #[test]
    fn ranking_lists_entries_in_order() {
        let text = render_ranking(&[
            RankEntry { locality: "B".into(), total: 9.0 },
            RankEntry { locality: "AA".into(), total: 8.5 },
        ]);
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "Top 2 localidades por BPA total");
        assert_eq!(lines[1], " 1. B   9");
        assert_eq!(lines[2], " 2. AA  8.50");
    }

    #[test]
    fn title_case_handles_accents() {
        assert_eq!(title_case("ISCHILÍN"), "Ischilín");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn title_case_starts_words_after_any_non_letter() {
        assert_eq!(title_case("VILLA-NUEVA"), "Villa-Nueva");
        assert_eq!(title_case("COL. CAROYA"), "Col. Caroya");
        assert_eq!(title_case("O'HIGGINS"), "O'Higgins");
        assert_eq!(title_case("RUTA 9NORTE"), "Ruta 9Norte");
    }
}
