//! Group-by aggregations over the adoption records.
//!
//! Missing numeric values never count as zero: sums skip them and means are
//! taken over the values that are present.

use crate::error::DataError;
use crate::types::{AdoptionRecord, AreaPoint, LocalitySummary, RankEntry, YearTotal};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Top `top_n` localities by summed `adoption_total`, highest first.
///
/// Equal totals keep the order in which the localities first appear. An empty
/// record set yields an empty ranking.
pub fn rank(records: &[AdoptionRecord], top_n: usize) -> Vec<RankEntry> {
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut ranking: Vec<RankEntry> = Vec::new();

    for record in records {
        let Some(locality) = record.locality.as_deref() else {
            continue;
        };
        let idx = *order.entry(locality).or_insert_with(|| {
            ranking.push(RankEntry {
                locality: locality.to_string(),
                total: 0.0,
            });
            ranking.len() - 1
        });
        if let Some(v) = record.adoption_total {
            ranking[idx].total += v;
        }
    }

    // sort_by is stable, so ties stay in first-occurrence order.
    ranking.sort_by(|a, b| b.total.total_cmp(&a.total));
    ranking.truncate(top_n);
    ranking
}

/// Record count and field means for one locality (exact match).
pub fn summarize(
    records: &[AdoptionRecord],
    locality: &str,
) -> Result<LocalitySummary, DataError> {
    let rows: Vec<&AdoptionRecord> = records
        .iter()
        .filter(|r| r.locality.as_deref() == Some(locality))
        .collect();

    if rows.is_empty() {
        return Err(DataError::UnknownLocality(locality.to_string()));
    }

    Ok(LocalitySummary {
        locality: locality.to_string(),
        record_count: rows.len(),
        mean_area_adopted: mean(rows.iter().map(|r| r.area_adopted)),
        mean_area_total: mean(rows.iter().map(|r| r.area_total)),
        mean_adoption_total: mean(rows.iter().map(|r| r.adoption_total)),
    })
}

/// Sorted, deduplicated locality names; missing names are left out.
pub fn distinct_localities(records: &[AdoptionRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.locality.as_deref())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Adoption totals per recorded date, oldest first. Rows with an unknown
/// date are not plotted.
pub fn yearly_totals(records: &[AdoptionRecord]) -> Vec<YearTotal> {
    let mut totals = BTreeMap::new();
    for record in records {
        if let (Some(year), Some(v)) = (record.year, record.adoption_total) {
            *totals.entry(year).or_insert(0.0) += v;
        }
    }
    totals
        .into_iter()
        .map(|(year, total)| YearTotal { year, total })
        .collect()
}

/// Total area against adopted area for each row of `locality` that has both.
pub fn area_points(records: &[AdoptionRecord], locality: &str) -> Vec<AreaPoint> {
    records
        .iter()
        .filter(|r| r.locality.as_deref() == Some(locality))
        .filter_map(|r| match (r.area_total, r.area_adopted) {
            (Some(area_total), Some(area_adopted)) => Some(AreaPoint {
                area_total,
                area_adopted,
            }),
            _ => None,
        })
        .collect()
}

fn mean(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(locality: &str, adoption_total: Option<f64>) -> AdoptionRecord {
        AdoptionRecord {
            locality: Some(locality.to_string()),
            adoption_total,
            ..Default::default()
        }
    }

    fn scenario() -> Vec<AdoptionRecord> {
        vec![rec("A", Some(5.0)), rec("B", Some(9.0)), rec("A", Some(3.0))]
    }

    #[test]
    fn rank_sums_and_orders_descending() {
        let ranking = rank(&scenario(), 2);
        assert_eq!(
            ranking,
            vec![
                RankEntry { locality: "B".into(), total: 9.0 },
                RankEntry { locality: "A".into(), total: 8.0 },
            ]
        );
    }

    #[test]
    fn rank_truncates_and_stays_sorted() {
        let records: Vec<_> = (0..30)
            .map(|i| rec(&format!("L{}", i % 13), Some(f64::from(i * 7 % 11))))
            .collect();
        let ranking = rank(&records, 10);

        assert!(ranking.len() <= 10);
        assert!(ranking.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[test]
    fn rank_ties_keep_first_occurrence() {
        let records = vec![
            rec("C", Some(4.0)),
            rec("A", Some(4.0)),
            rec("B", Some(1.0)),
            rec("A", None),
        ];
        let names: Vec<_> = rank(&records, 10).into_iter().map(|e| e.locality).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn rank_skips_missing_localities_and_values() {
        let mut records = scenario();
        records.push(AdoptionRecord {
            locality: None,
            adoption_total: Some(100.0),
            ..Default::default()
        });
        records.push(rec("B", None));

        let ranking = rank(&records, 5);
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].total, 9.0);
    }

    #[test]
    fn rank_of_nothing_is_empty() {
        assert!(rank(&[], 10).is_empty());
        assert!(rank(&scenario(), 0).is_empty());
    }

    #[test]
    fn summarize_counts_only_matching_rows() {
        let summary = summarize(&scenario(), "A").unwrap();
        assert_eq!(summary.record_count, 2);
        assert_eq!(summary.mean_adoption_total, Some(4.0));
        assert_eq!(summary.mean_area_total, None);
    }

    #[test]
    fn summarize_is_case_sensitive() {
        let err = summarize(&scenario(), "a").unwrap_err();
        assert!(matches!(err, DataError::UnknownLocality(ref l) if l == "a"));
    }

    #[test]
    fn summarize_ignores_missing_values() {
        let records = vec![
            AdoptionRecord {
                locality: Some("X".into()),
                area_total: Some(10.0),
                ..Default::default()
            },
            AdoptionRecord {
                locality: Some("X".into()),
                area_total: None,
                area_adopted: Some(2.0),
                ..Default::default()
            },
        ];
        let summary = summarize(&records, "X").unwrap();

        assert_eq!(summary.record_count, 2);
        assert_eq!(summary.mean_area_total, Some(10.0));
        assert_eq!(summary.mean_area_adopted, Some(2.0));
        assert_eq!(summary.mean_adoption_total, None);
    }

    #[test]
    fn distinct_localities_sorted_unique() {
        let mut records = vec![rec("b", None), rec("A", None), rec("b", None), rec("C", None)];
        records.push(AdoptionRecord::default());

        assert_eq!(distinct_localities(&records), vec!["A", "C", "b"]);
    }

    #[test]
    fn yearly_totals_drop_unknown_dates() {
        let d = |y| NaiveDate::from_ymd_opt(y, 1, 1);
        let mut records = scenario();
        records[0].year = d(2021);
        records[1].year = d(2019);
        records[2].year = None;
        records.push(AdoptionRecord {
            locality: Some("C".into()),
            year: d(2021),
            adoption_total: Some(2.0),
            ..Default::default()
        });

        let series = yearly_totals(&records);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].year, NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
        assert_eq!(series[0].total, 9.0);
        assert_eq!(series[1].total, 7.0);
    }

    #[test]
    fn area_points_need_both_areas() {
        let records = vec![
            AdoptionRecord {
                locality: Some("X".into()),
                area_total: Some(100.0),
                area_adopted: Some(40.0),
                ..Default::default()
            },
            AdoptionRecord {
                locality: Some("X".into()),
                area_total: Some(80.0),
                ..Default::default()
            },
            AdoptionRecord {
                locality: Some("Y".into()),
                area_total: Some(5.0),
                area_adopted: Some(5.0),
                ..Default::default()
            },
        ];
        assert_eq!(
            area_points(&records, "X"),
            vec![AreaPoint { area_total: 100.0, area_adopted: 40.0 }]
        );
    }
}
