use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::model::{LayerInfo, ZoneId};

// ---------------------------------------------------------------------------
// View filter: which zones and dates are shown
// ---------------------------------------------------------------------------

/// Zone and date selection for plots.
///
/// A pixel passes when its zone is selected (or it is unzoned and
/// `show_unzoned` is set). A layer passes when it is undated or its date
/// falls inside the inclusive range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewFilter {
    pub zones: BTreeSet<ZoneId>,
    pub show_unzoned: bool,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ViewFilter {
    /// Everything selected: all zones and the full date span of `layers`.
    pub fn select_all(zone_ids: &[ZoneId], layers: &[LayerInfo]) -> Self {
        let dates: Vec<NaiveDate> = layers.iter().filter_map(|l| l.date).collect();
        Self {
            zones: zone_ids.iter().copied().collect(),
            show_unzoned: true,
            date_from: dates.iter().min().copied(),
            date_to: dates.iter().max().copied(),
        }
    }

    pub fn zone_passes(&self, zone: Option<ZoneId>) -> bool {
        match zone {
            Some(z) => self.zones.contains(&z),
            None => self.show_unzoned,
        }
    }

    pub fn layer_passes(&self, layer: &LayerInfo) -> bool {
        let Some(date) = layer.date else {
            return true;
        };
        self.date_from.map_or(true, |from| date >= from) && self.date_to.map_or(true, |to| date <= to)
    }

    pub fn toggle_zone(&mut self, zone: ZoneId) {
        if !self.zones.remove(&zone) {
            self.zones.insert(zone);
        }
    }
}

/// Indices of items whose zone passes the filter.
pub fn filtered_indices<I>(zones: I, filter: &ViewFilter) -> Vec<usize>
where
    I: IntoIterator<Item = Option<ZoneId>>,
{
    zones
        .into_iter()
        .enumerate()
        .filter(|(_, z)| filter.zone_passes(*z))
        .map(|(i, _)| i)
        .collect()
}

/// Indices of layers inside the date range.
pub fn visible_layers(layers: &[LayerInfo], filter: &ViewFilter) -> Vec<usize> {
    layers
        .iter()
        .enumerate()
        .filter(|(_, l)| filter.layer_passes(l))
        .map(|(i, _)| i)
        .collect()
}
