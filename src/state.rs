//! Application state: datasets loaded once per process and the per-session
//! dashboard view over them.

use crate::aggregate;
use crate::boundaries;
use crate::config::AppConfig;
use crate::error::DataError;
use crate::records;
use crate::types::{AdoptionRecord, LocalitySummary, RankEntry, RegionBoundary, Route};
use std::sync::Arc;
use tracing::info;

/// Everything read from disk. Immutable once loaded; share it with `Arc`.
#[derive(Debug)]
pub struct Datasets {
    pub records: Vec<AdoptionRecord>,
    /// All departments in the file, not only the highlighted ones.
    pub boundaries: Vec<RegionBoundary>,
    pub routes: Vec<Route>,
    pub localities: Vec<String>,
}

impl Datasets {
    pub fn load(config: &AppConfig) -> Result<Self, DataError> {
        let input = &config.input;
        let source_crs = input.source_crs.as_deref();

        let records = records::load(&input.records_csv, &input.date_format)?;
        let boundaries = boundaries::load(&input.boundaries, &input.name_column, source_crs)?;
        let routes = match &input.routes {
            Some(path) => boundaries::load_routes(path, source_crs)?,
            None => Vec::new(),
        };

        let datasets = Self::new(records, boundaries, routes);
        info!(
            "Datasets ready: {} records, {} localities, {} boundaries ({} highlighted), {} routes",
            datasets.records.len(),
            datasets.localities.len(),
            datasets.boundaries.len(),
            datasets.targets().len(),
            datasets.routes.len()
        );
        Ok(datasets)
    }

    pub fn new(
        records: Vec<AdoptionRecord>,
        boundaries: Vec<RegionBoundary>,
        routes: Vec<Route>,
    ) -> Self {
        let localities = aggregate::distinct_localities(&records);
        Self {
            records,
            boundaries,
            routes,
            localities,
        }
    }

    pub fn targets(&self) -> Vec<&RegionBoundary> {
        boundaries::targets(&self.boundaries)
    }
}

/// One user's view of the dashboard.
///
/// The ranking is computed once when the view is created; changing the
/// selection only recomputes the summary.
#[derive(Debug, Clone)]
pub struct Dashboard {
    data: Arc<Datasets>,
    ranking: Vec<RankEntry>,
    selected: Option<String>,
    summary: Option<LocalitySummary>,
}

impl Dashboard {
    pub fn new(data: Arc<Datasets>, top_n: usize) -> Self {
        let ranking = aggregate::rank(&data.records, top_n);
        Self {
            data,
            ranking,
            selected: None,
            summary: None,
        }
    }

    pub fn ranking(&self) -> &[RankEntry] {
        &self.ranking
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn summary(&self) -> Option<&LocalitySummary> {
        self.summary.as_ref()
    }

    /// Selects a locality and returns its summary. An unknown locality is an
    /// error and leaves the current selection untouched.
    pub fn select(&mut self, locality: &str) -> Result<&LocalitySummary, DataError> {
        if self.selected.as_deref() != Some(locality) || self.summary.is_none() {
            let summary = aggregate::summarize(&self.data.records, locality)?;
            self.selected = Some(locality.to_string());
            self.summary = Some(summary);
        }
        self.summary
            .as_ref()
            .ok_or_else(|| DataError::UnknownLocality(locality.to_string()))
    }
}
