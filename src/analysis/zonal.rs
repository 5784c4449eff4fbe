use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use super::AnalysisError;
use crate::data::model::{LayerInfo, RasterStack, ZoneId, ZoneRaster};
use crate::data::table::{Column, Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZonalStat {
    #[default]
    Mean,
    Min,
    Max,
    Sum,
    Sd,
    Count,
}

/// Running aggregate of one zone in one layer (Welford update for the
/// variance).
#[derive(Debug, Clone, Copy, Default)]
struct Acc {
    n: usize,
    mean: f64,
    m2: f64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Acc {
    fn push(&mut self, v: f64) {
        if self.n == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.n += 1;
        self.sum += v;
        let delta = v - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (v - self.mean);
    }

    fn value(&self, stat: ZonalStat) -> f64 {
        if stat == ZonalStat::Count {
            return self.n as f64;
        }
        if self.n == 0 {
            return f64::NAN;
        }
        match stat {
            ZonalStat::Mean => self.mean,
            ZonalStat::Min => self.min,
            ZonalStat::Max => self.max,
            ZonalStat::Sum => self.sum,
            ZonalStat::Sd if self.n < 2 => f64::NAN,
            ZonalStat::Sd => (self.m2 / (self.n - 1) as f64).max(0.0).sqrt(),
            ZonalStat::Count => self.n as f64,
        }
    }
}

/// A statistic per zone (rows, sorted by id) and layer (columns).
#[derive(Debug, Clone)]
pub struct ZonalTable {
    pub stat: ZonalStat,
    pub zone_ids: Vec<ZoneId>,
    pub layers: Vec<LayerInfo>,
    pub values: Array2<f64>,
    /// Zoned cells per zone, independent of missing values.
    pub cell_counts: Vec<usize>,
}

impl ZonalTable {
    pub fn zone_index(&self, zone: ZoneId) -> Option<usize> {
        self.zone_ids.binary_search(&zone).ok()
    }

    /// The statistic over time for one zone.
    pub fn series(&self, zone: ZoneId) -> Option<ArrayView1<'_, f64>> {
        self.zone_index(zone).map(|i| self.values.row(i))
    }

    pub fn get(&self, zone: ZoneId, layer: usize) -> Option<f64> {
        self.zone_index(zone)
            .and_then(|i| self.values.get((i, layer)).copied())
    }

    /// Long-format table: one row per zone and date.
    pub fn to_table(&self) -> Table {
        let mut zone = Vec::new();
        let mut date = Vec::new();
        let mut doy = Vec::new();
        let mut value = Vec::new();
        for (i, z) in self.zone_ids.iter().enumerate() {
            for (k, layer) in self.layers.iter().enumerate() {
                zone.push(*z);
                date.push(layer.label());
                doy.push(layer.doy().map(f64::from).unwrap_or(f64::NAN));
                value.push(self.values[[i, k]]);
            }
        }
        let stat = serde_json::to_value(self.stat)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "value".to_string());
        Table::new(vec![
            Column::Int("zone".into(), zone),
            Column::Text("date".into(), date),
            Column::Float("doy".into(), doy),
            Column::Float(stat, value),
        ])
    }
}

/// Aggregate every layer of `stack` by the zones of `zones`, ignoring
/// missing cells.
pub fn zonal(stack: &RasterStack, zones: &ZoneRaster, stat: ZonalStat) -> Result<ZonalTable, AnalysisError> {
    if zones.rows() != stack.rows() || zones.cols() != stack.cols() {
        return Err(AnalysisError::ShapeMismatch(format!(
            "zones are {}x{}, stack is {}x{}",
            zones.rows(),
            zones.cols(),
            stack.rows(),
            stack.cols()
        )));
    }

    let nl = stack.nlayers();
    let mut acc: BTreeMap<ZoneId, (usize, Vec<Acc>)> = BTreeMap::new();
    for ((row, col), zone) in zones.zones.indexed_iter() {
        let Some(zone) = zone else { continue };
        let entry = acc
            .entry(*zone)
            .or_insert_with(|| (0, vec![Acc::default(); nl]));
        entry.0 += 1;
        for (k, &v) in stack.pixel(row, col).iter().enumerate() {
            if v.is_finite() {
                entry.1[k].push(v);
            }
        }
    }

    let zone_ids: Vec<ZoneId> = acc.keys().copied().collect();
    let mut values = Array2::<f64>::zeros((zone_ids.len(), nl));
    let mut cell_counts = Vec::with_capacity(zone_ids.len());
    for (i, (count, layers)) in acc.values().enumerate() {
        cell_counts.push(*count);
        for (k, a) in layers.iter().enumerate() {
            values[[i, k]] = a.value(stat);
        }
    }

    Ok(ZonalTable {
        stat,
        zone_ids,
        layers: stack.layers.clone(),
        values,
        cell_counts,
    })
}
