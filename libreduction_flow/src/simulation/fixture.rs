use bitvec::prelude::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::OperationError;
use crate::workspace::{Instrument, MatrixWorkspace, ParameterValue, SampleLogs, UNIT_TOF};

/// Detector IDs of monitors start here, detectors count from 1
pub const MONITOR_ID_OFFSET: i32 = 100000;

/// A Gaussian peak on a TOF axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakShape {
    pub centre: f64,
    pub sigma: f64,
    pub height: f64,
}

impl PeakShape {
    fn at(&self, x: f64) -> f64 {
        if self.sigma <= 0.0 {
            return 0.0;
        }
        let z = (x - self.centre) / self.sigma;
        self.height * (-0.5 * z * z).exp()
    }
}

/// SyntheticWorkspace describes a fake measurement in YAML. The `Load` operation of the
/// simulated engine reads these in place of NeXus files.
///
/// Monitors come first in the generated workspace, followed by the detectors. Every spectrum
/// carries the same flat background plus its peak.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticWorkspace {
    pub instrument: String,
    pub parameters: BTreeMap<String, ParameterValue>,
    pub logs: SampleLogs,
    pub monitors: usize,
    pub detectors: usize,
    pub bins: usize,
    pub tof_start: f64,
    pub bin_width: f64,
    pub l2: f64,
    pub background: f64,
    pub peak: Option<PeakShape>,
    pub monitor_peak: Option<PeakShape>,
    /// Per detector intensity weights, for data with a spatial profile
    pub detector_weights: Vec<f64>,
}

impl Default for SyntheticWorkspace {
    fn default() -> Self {
        Self {
            instrument: String::from("IN4"),
            parameters: BTreeMap::new(),
            logs: SampleLogs::new(),
            monitors: 1,
            detectors: 4,
            bins: 64,
            tof_start: 1000.0,
            bin_width: 10.0,
            l2: 2.0,
            background: 1.0,
            peak: None,
            monitor_peak: None,
            detector_weights: vec![],
        }
    }
}

impl SyntheticWorkspace {
    pub fn read_file(path: &Path) -> Result<Self, OperationError> {
        let yaml_str = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    pub fn write_file(&self, path: &Path) -> Result<(), OperationError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml_str)?;
        Ok(())
    }

    /// Generate the histogram data
    pub fn build(&self) -> Result<MatrixWorkspace, OperationError> {
        let n = self.monitors + self.detectors;
        let edges: Vec<f64> = (0..=self.bins)
            .map(|j| self.tof_start + j as f64 * self.bin_width)
            .collect();
        let mut x = Array2::<f64>::zeros((n, self.bins + 1));
        let mut y = Array2::<f64>::zeros((n, self.bins));
        for i in 0..n {
            let is_monitor = i < self.monitors;
            let peak = if is_monitor {
                self.monitor_peak.or(self.peak)
            } else {
                self.peak
            };
            let weight = if is_monitor {
                1.0
            } else {
                self.detector_weights
                    .get(i - self.monitors)
                    .copied()
                    .unwrap_or(1.0)
            };
            for j in 0..=self.bins {
                x[[i, j]] = edges[j];
            }
            for j in 0..self.bins {
                let mid = 0.5 * (edges[j] + edges[j + 1]);
                let signal = peak.map(|p| p.at(mid)).unwrap_or(0.0);
                y[[i, j]] = weight * (self.background + signal);
            }
        }
        let mut ws = MatrixWorkspace::from_xy(x, y)?;
        ws.detector_ids = (0..n)
            .map(|i| {
                if i < self.monitors {
                    MONITOR_ID_OFFSET + i as i32 + 1
                } else {
                    (i - self.monitors) as i32 + 1
                }
            })
            .collect();
        ws.l2 = (0..n)
            .map(|i| if i < self.monitors { 0.0 } else { self.l2 })
            .collect();
        ws.monitors = (0..n).map(|i| i < self.monitors).collect::<BitVec>();
        ws.unit = String::from(UNIT_TOF);
        ws.logs = self.logs.clone();
        ws.instrument = Instrument {
            name: self.instrument.clone(),
            parameters: self.parameters.clone(),
        };
        Ok(ws)
    }
}
