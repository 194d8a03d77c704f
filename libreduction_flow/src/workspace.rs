use bitvec::prelude::*;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use super::error::WorkspaceError;

pub const UNIT_TOF: &str = "TOF";
pub const UNIT_WAVELENGTH: &str = "Wavelength";
pub const UNIT_EMPTY: &str = "Empty";

pub const COLUMN_WORKSPACE_INDEX: &str = "WorkspaceIndex";
pub const COLUMN_PEAK_CENTRE: &str = "PeakCentre";
pub const COLUMN_SIGMA: &str = "Sigma";
pub const COLUMN_HEIGHT: &str = "Height";
pub const COLUMN_FIT_STATUS: &str = "FitStatus";
pub const COLUMN_FITTED_PEAK_CENTRE: &str = "FittedPeakCentre";
pub const FIT_SUCCESS: &str = "success";
pub const FIT_FAILED: &str = "failed";

/// A single entry in the sample logs of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogValue {
    Number(f64),
    Text(String),
}

impl LogValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) => t.trim().parse().ok(),
        }
    }
}

impl Display for LogValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => write!(f, "{t}"),
        }
    }
}

pub type SampleLogs = BTreeMap<String, LogValue>;

/// Instrument parameter file entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl Instrument {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    pub fn number_parameter(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name)? {
            ParameterValue::Number(n) => Some(*n),
            ParameterValue::Int(i) => Some(*i as f64),
            ParameterValue::Text(t) => t.trim().parse().ok(),
            ParameterValue::Bool(_) => None,
        }
    }

    pub fn int_parameter(&self, name: &str) -> Option<i64> {
        match self.parameters.get(name)? {
            ParameterValue::Int(i) => Some(*i),
            ParameterValue::Text(t) => t.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool_parameter(&self, name: &str) -> Option<bool> {
        match self.parameters.get(name)? {
            ParameterValue::Bool(b) => Some(*b),
            ParameterValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

/// How a number refers to a spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    DetectorId,
    WorkspaceIndex,
    SpectrumNumber,
}

/// Histogram data: one row of bin edges and counts per spectrum.
///
/// `x` is `spectra x (bins + 1)`, `y` is `spectra x bins`. A single valued workspace is the
/// degenerate 1 x 1 case.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixWorkspace {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
    pub spectrum_numbers: Vec<i32>,
    pub detector_ids: Vec<i32>,
    pub l2: Vec<f64>,
    pub monitors: BitVec,
    pub masked: BitVec,
    pub unit: String,
    pub logs: SampleLogs,
    pub instrument: Instrument,
}

impl MatrixWorkspace {
    /// Create a workspace from bin edges and counts with plain default metadata
    pub fn from_xy(x: Array2<f64>, y: Array2<f64>) -> Result<Self, WorkspaceError> {
        if x.nrows() != y.nrows() || x.ncols() != y.ncols() + 1 {
            return Err(WorkspaceError::ShapeMismatch {
                x: x.dim(),
                y: y.dim(),
            });
        }
        let n = y.nrows();
        Ok(Self {
            x,
            y,
            spectrum_numbers: (1..=n as i32).collect(),
            detector_ids: (1..=n as i32).collect(),
            l2: vec![0.0; n],
            monitors: bitvec![0; n],
            masked: bitvec![0; n],
            unit: String::from(UNIT_TOF),
            logs: SampleLogs::new(),
            instrument: Instrument::default(),
        })
    }

    pub fn single_valued(value: f64) -> Self {
        Self {
            x: ndarray::array![[0.0, 1.0]],
            y: Array2::from_elem((1, 1), value),
            spectrum_numbers: vec![1],
            detector_ids: vec![0],
            l2: vec![0.0],
            monitors: bitvec![0; 1],
            masked: bitvec![0; 1],
            unit: String::from(UNIT_EMPTY),
            logs: SampleLogs::new(),
            instrument: Instrument::default(),
        }
    }

    /// Copy all the per-run metadata (logs, instrument, unit) from another workspace
    pub fn with_metadata_of(mut self, parent: &MatrixWorkspace) -> Self {
        self.logs = parent.logs.clone();
        self.instrument = parent.instrument.clone();
        self.unit = parent.unit.clone();
        self
    }

    pub fn histogram_count(&self) -> usize {
        self.y.nrows()
    }

    pub fn bin_count(&self) -> usize {
        self.y.ncols()
    }

    pub fn read_x(&self, index: usize) -> ArrayView1<f64> {
        self.x.row(index)
    }

    pub fn read_y(&self, index: usize) -> ArrayView1<f64> {
        self.y.row(index)
    }

    /// The single value of a single valued workspace (first bin of the first spectrum)
    pub fn value(&self) -> Option<f64> {
        self.y.get((0, 0)).copied()
    }

    pub fn first_bin_width(&self) -> f64 {
        match (self.x.get((0, 0)), self.x.get((0, 1))) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }

    pub fn is_monitor(&self, index: usize) -> bool {
        self.monitors.get(index).map(|b| *b).unwrap_or(false)
    }

    pub fn is_masked(&self, index: usize) -> bool {
        self.masked.get(index).map(|b| *b).unwrap_or(false)
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.count_ones()
    }

    pub fn log_number(&self, name: &str) -> Option<f64> {
        self.logs.get(name).and_then(|v| v.as_f64())
    }

    /// Build a new workspace out of a subset of the spectra (in the order given)
    pub fn select_spectra(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(ndarray::Axis(0), indices),
            y: self.y.select(ndarray::Axis(0), indices),
            spectrum_numbers: indices.iter().map(|&i| self.spectrum_numbers[i]).collect(),
            detector_ids: indices.iter().map(|&i| self.detector_ids[i]).collect(),
            l2: indices.iter().map(|&i| self.l2[i]).collect(),
            monitors: indices.iter().map(|&i| self.monitors[i]).collect(),
            masked: indices.iter().map(|&i| self.masked[i]).collect(),
            unit: self.unit.clone(),
            logs: self.logs.clone(),
            instrument: self.instrument.clone(),
        }
    }

    /// Convert a detector ID, spectrum number or workspace index into a workspace index
    pub fn workspace_index(&self, value: i64, index_type: IndexType) -> Result<usize, WorkspaceError> {
        match index_type {
            IndexType::WorkspaceIndex => {
                if value >= 0 && (value as usize) < self.histogram_count() {
                    Ok(value as usize)
                } else {
                    Err(WorkspaceError::IndexOutOfRange(value))
                }
            }
            IndexType::SpectrumNumber => self
                .spectrum_numbers
                .iter()
                .position(|&n| n as i64 == value)
                .ok_or(WorkspaceError::NoSuchSpectrum(value)),
            IndexType::DetectorId => self
                .detector_ids
                .iter()
                .position(|&id| id as i64 == value)
                .ok_or(WorkspaceError::NoSuchDetector(value)),
        }
    }

    /// Convert a list of numbers of the same kind into workspace indices
    pub fn workspace_indices(
        &self,
        values: &[i64],
        index_type: IndexType,
    ) -> Result<Vec<usize>, WorkspaceError> {
        values
            .iter()
            .map(|&v| self.workspace_index(v, index_type))
            .collect()
    }

    fn estimated_bytes(&self) -> usize {
        (self.x.len() + self.y.len() + self.l2.len()) * std::mem::size_of::<f64>()
            + (self.spectrum_numbers.len() + self.detector_ids.len()) * std::mem::size_of::<i32>()
    }
}

/// A cell of a table workspace
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

/// Column oriented table, used for EPP tables, beam positions and diagnostics reports
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableWorkspace {
    columns: Vec<Column>,
}

impl TableWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column, replacing any existing column of the same name
    pub fn add_column(&mut self, name: &str, cells: Vec<Cell>) {
        if let Some(column) = self.columns.iter_mut().find(|c| c.name == name) {
            column.cells = cells;
        } else {
            self.columns.push(Column {
                name: name.to_string(),
                cells,
            });
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.cells.len()).max().unwrap_or(0)
    }

    pub fn cell(&self, column: &str, row: usize) -> Option<&Cell> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .and_then(|c| c.cells.get(row))
    }

    pub fn float(&self, column: &str, row: usize) -> Option<f64> {
        match self.cell(column, row)? {
            Cell::Float(f) => Some(*f),
            Cell::Int(i) => Some(*i as f64),
            Cell::Text(t) => t.parse().ok(),
        }
    }

    pub fn text(&self, column: &str, row: usize) -> Option<&str> {
        match self.cell(column, row)? {
            Cell::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    fn estimated_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.cells.len() * std::mem::size_of::<Cell>())
            .sum()
    }
}

/// One row of an elastic peak position table
#[derive(Debug, Clone, PartialEq)]
pub struct EppRow {
    pub peak_centre: f64,
    pub sigma: f64,
    pub height: f64,
    pub fit_status: String,
}

impl EppRow {
    pub fn read(table: &TableWorkspace, row: usize) -> Option<Self> {
        Some(Self {
            peak_centre: table.float(COLUMN_PEAK_CENTRE, row)?,
            sigma: table.float(COLUMN_SIGMA, row)?,
            height: table.float(COLUMN_HEIGHT, row).unwrap_or(0.0),
            fit_status: table.text(COLUMN_FIT_STATUS, row)?.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        self.fit_status == FIT_SUCCESS
    }

    /// Assemble the standard EPP table layout
    pub fn to_table(rows: &[EppRow]) -> TableWorkspace {
        let mut table = TableWorkspace::new();
        table.add_column(
            COLUMN_WORKSPACE_INDEX,
            (0..rows.len()).map(|i| Cell::Int(i as i64)).collect(),
        );
        table.add_column(
            COLUMN_PEAK_CENTRE,
            rows.iter().map(|r| Cell::Float(r.peak_centre)).collect(),
        );
        table.add_column(
            COLUMN_SIGMA,
            rows.iter().map(|r| Cell::Float(r.sigma)).collect(),
        );
        table.add_column(
            COLUMN_HEIGHT,
            rows.iter().map(|r| Cell::Float(r.height)).collect(),
        );
        table.add_column(
            COLUMN_FIT_STATUS,
            rows.iter().map(|r| Cell::Text(r.fit_status.clone())).collect(),
        );
        table
    }
}

/// Everything a registry can hold
#[derive(Debug, Clone, PartialEq)]
pub enum Workspace {
    Matrix(MatrixWorkspace),
    Table(TableWorkspace),
}

impl Workspace {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Matrix(_) => "MatrixWorkspace",
            Self::Table(_) => "TableWorkspace",
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixWorkspace> {
        match self {
            Self::Matrix(m) => Some(m),
            Self::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableWorkspace> {
        match self {
            Self::Table(t) => Some(t),
            Self::Matrix(_) => None,
        }
    }

    /// Rough memory footprint of the data held
    pub fn estimated_bytes(&self) -> usize {
        match self {
            Self::Matrix(m) => m.estimated_bytes(),
            Self::Table(t) => t.estimated_bytes(),
        }
    }
}

impl From<MatrixWorkspace> for Workspace {
    fn from(value: MatrixWorkspace) -> Self {
        Self::Matrix(value)
    }
}

impl From<TableWorkspace> for Workspace {
    fn from(value: TableWorkspace) -> Self {
        Self::Table(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn three_spectra() -> MatrixWorkspace {
        let x = array![[0.0, 1.0, 2.0], [0.0, 1.0, 2.0], [0.0, 1.0, 2.0]];
        let y = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let mut ws = MatrixWorkspace::from_xy(x, y).unwrap();
        ws.detector_ids = vec![100, 101, 102];
        ws.spectrum_numbers = vec![10, 11, 12];
        ws.monitors.set(0, true);
        ws
    }

    #[test]
    fn test_index_conversion() {
        let ws = three_spectra();
        assert_eq!(ws.workspace_index(101, IndexType::DetectorId).unwrap(), 1);
        assert_eq!(ws.workspace_index(12, IndexType::SpectrumNumber).unwrap(), 2);
        assert_eq!(ws.workspace_index(2, IndexType::WorkspaceIndex).unwrap(), 2);
        assert!(matches!(
            ws.workspace_index(7, IndexType::DetectorId),
            Err(WorkspaceError::NoSuchDetector(7))
        ));
        assert!(ws.workspace_index(3, IndexType::WorkspaceIndex).is_err());
    }

    #[test]
    fn test_select_spectra_keeps_metadata_aligned() {
        let ws = three_spectra();
        let selected = ws.select_spectra(&[2, 0]);
        assert_eq!(selected.histogram_count(), 2);
        assert_eq!(selected.detector_ids, vec![102, 100]);
        assert_eq!(selected.read_y(0)[1], 6.0);
        assert!(!selected.is_monitor(0));
        assert!(selected.is_monitor(1));
    }

    #[test]
    fn test_bad_shape_rejected() {
        let x = array![[0.0, 1.0]];
        let y = array![[1.0, 2.0]];
        assert!(MatrixWorkspace::from_xy(x, y).is_err());
    }

    #[test]
    fn test_epp_table() {
        let rows = vec![
            EppRow {
                peak_centre: 5.0,
                sigma: 0.5,
                height: 10.0,
                fit_status: String::from(FIT_SUCCESS),
            },
            EppRow {
                peak_centre: 0.0,
                sigma: 0.0,
                height: 0.0,
                fit_status: String::from(FIT_FAILED),
            },
        ];
        let table = EppRow::to_table(&rows);
        assert_eq!(table.row_count(), 2);
        assert!(EppRow::read(&table, 0).unwrap().is_success());
        assert!(!EppRow::read(&table, 1).unwrap().is_success());
        assert!(EppRow::read(&table, 2).is_none());
    }
}
