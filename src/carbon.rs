//! Carbon-intensity time series.
//!
//! A [`CarbonModel`] is an immutable, cheaply clonable view over a sequence of
//! per-tick intensities. Windowing and rebasing share the underlying buffer,
//! so one model can back many policies and many concurrent runs without
//! copying or synchronization.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, SchedulingError};

/// Hourly rows skipped at the start of a carbon trace file (two years).
pub const TRACE_OFFSET_HOURS: usize = 17_544;

/// Hourly rows loaded from a carbon trace file (thirty days).
pub const TRACE_HORIZON_HOURS: usize = 720;

/// Trace values are stored in g/kWh; the model works in kg/kWh.
const TRACE_SCALE: f64 = 1000.0;

/// Fidelity of the carbon signal a policy sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CarbonError {
    /// Perfect knowledge of future intensity.
    #[default]
    Oracle,
    /// Intensity replaced by a long-run average.
    Average,
    /// User-supplied synthetic series.
    Custom,
}

impl fmt::Display for CarbonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CarbonError::Oracle => "ORACLE",
            CarbonError::Average => "AVERAGE",
            CarbonError::Custom => "CUSTOM",
        };
        f.write_str(s)
    }
}

/// An indexed, cyclical view over a carbon-intensity series.
///
/// # Examples
///
/// ```
/// use deferrable_sim::carbon::CarbonModel;
///
/// let model = CarbonModel::from_values("demo", vec![4.0, 2.0]);
/// let ticks = model.stretched(2);
/// assert_eq!(ticks.values(), &[2.0, 2.0, 1.0, 1.0]);
/// assert_eq!(ticks.value_at(5), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct CarbonModel {
    name: Arc<str>,
    data: Arc<[f64]>,
    /// Visible range is `data[offset..offset + len]`.
    offset: usize,
    len: usize,
    start_index: usize,
    error: CarbonError,
}

#[derive(Debug, Deserialize)]
struct TraceRow {
    carbon_intensity_avg: Option<f64>,
}

impl CarbonModel {
    /// Creates a model from raw per-sample values.
    ///
    /// # Panics
    ///
    /// Panics if any value is negative or not finite.
    pub fn from_values(name: &str, values: Vec<f64>) -> Self {
        assert!(
            values.iter().all(|v| v.is_finite() && *v >= 0.0),
            "carbon intensities must be finite and non-negative"
        );
        Self {
            name: Arc::from(name),
            len: values.len(),
            data: Arc::from(values),
            offset: 0,
            start_index: 0,
            error: CarbonError::Oracle,
        }
    }

    /// Tags the model with its trace start index and fidelity.
    pub fn with_origin(mut self, start_index: usize, error: CarbonError) -> Self {
        self.start_index = start_index;
        self.error = error;
        self
    }

    /// Built-in synthetic model: 48 hours at 100 g/kWh, tiled over 30 periods.
    pub fn custom(start_index: usize) -> Self {
        let period = [100.0 / TRACE_SCALE; 48];
        let values = period.iter().copied().cycle().take(period.len() * 30).collect();
        Self::from_values("custom", values).with_origin(start_index, CarbonError::Custom)
    }

    /// Loads a model from a CSV trace with a `carbon_intensity_avg` column.
    ///
    /// Reads [`TRACE_HORIZON_HOURS`] hourly rows starting at
    /// `TRACE_OFFSET_HOURS + start_index` and converts g/kWh to kg/kWh.
    /// Blank or non-numeric cells repeat the previous reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, lacks the intensity
    /// column, or has no rows in the requested range.
    pub fn from_csv_path(
        path: &Path,
        name: &str,
        start_index: usize,
        error: CarbonError,
    ) -> Result<Self, Error> {
        let mut rdr = csv::Reader::from_path(path).map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let headers = rdr.headers().map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if !headers.iter().any(|h| h == "carbon_intensity_avg") {
            return Err(Error::MissingColumn {
                path: path.to_path_buf(),
                column: "carbon_intensity_avg".to_string(),
            });
        }

        let first = TRACE_OFFSET_HOURS + start_index;
        let mut values = Vec::with_capacity(TRACE_HORIZON_HOURS);
        let mut last = 0.0;
        for (row, record) in rdr.deserialize::<TraceRow>().enumerate() {
            let record = record.map_err(|source| Error::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let value = record
                .carbon_intensity_avg
                .filter(|v| v.is_finite())
                .unwrap_or(last);
            last = value;
            if row < first {
                continue;
            }
            if values.len() == TRACE_HORIZON_HOURS {
                break;
            }
            values.push(value.max(0.0) / TRACE_SCALE);
        }

        if values.is_empty() {
            return Err(Error::EmptyTrace {
                path: path.to_path_buf(),
            });
        }
        debug!(trace = name, start_index, hours = values.len(), "loaded carbon trace");
        Ok(Self::from_values(name, values).with_origin(start_index, error))
    }

    /// Returns a model over `[start, end)`, re-indexed from zero.
    ///
    /// The result shares this model's buffer; no samples are copied.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `start > end` or the series ends before `end`.
    pub fn windowed(&self, start: usize, end: usize) -> Result<Self, SchedulingError> {
        if start > end || end > self.len {
            return Err(SchedulingError::OutOfRange {
                start,
                end,
                len: self.len,
            });
        }
        Ok(Self {
            offset: self.offset + start,
            len: end - start,
            ..self.clone()
        })
    }

    /// Returns a model whose index 0 is absolute index `start`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `start` lies past the end of the series.
    pub fn rebased(&self, start: usize) -> Result<Self, SchedulingError> {
        self.windowed(start, self.len)
    }

    /// Repeats every sample `factor` times, dividing it by `factor`.
    ///
    /// The integral of intensity over time is unchanged, which turns hourly
    /// data into per-tick data without altering the carbon mass of a job.
    ///
    /// # Panics
    ///
    /// Panics if `factor` is zero.
    pub fn stretched(&self, factor: usize) -> Self {
        assert!(factor > 0, "stretch factor must be > 0");
        let scale = factor as f64;
        let values = self
            .values()
            .iter()
            .flat_map(|v| std::iter::repeat_n(v / scale, factor))
            .collect();
        self.derive(values)
    }

    /// Cyclic lookup: `index` wraps modulo the series length.
    ///
    /// Returns `0.0` for an empty model.
    pub fn value_at(&self, index: usize) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.data[self.offset + index % self.len]
    }

    /// Linear-interpolated quantile of the samples in `[start, end)`,
    /// truncated to the available data.
    ///
    /// Returns `None` when the range holds no samples.
    pub fn quantile(&self, start: usize, end: usize, q: f64) -> Option<f64> {
        let end = end.min(self.len);
        if start >= end {
            return None;
        }
        let mut sorted = self.values()[start..end].to_vec();
        sorted.sort_by(f64::total_cmp);
        let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
    }

    /// Mean intensity over the whole series.
    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.values().iter().sum::<f64>() / self.len as f64
    }

    /// Sample standard deviation over the whole series.
    pub fn std(&self) -> f64 {
        let n = self.len;
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let ss: f64 = self.values().iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    }

    pub fn values(&self) -> &[f64] {
        &self.data[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn error(&self) -> CarbonError {
        self.error
    }

    fn derive(&self, values: Vec<f64>) -> Self {
        Self {
            name: Arc::clone(&self.name),
            len: values.len(),
            data: Arc::from(values),
            offset: 0,
            start_index: self.start_index,
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn model(values: &[f64]) -> CarbonModel {
        CarbonModel::from_values("test", values.to_vec())
    }

    #[test]
    fn windowed_reindexes_from_zero() {
        let m = model(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let w = m.windowed(1, 4).expect("window in range");
        assert_eq!(w.values(), &[2.0, 3.0, 4.0]);
        assert_eq!(w.value_at(0), 2.0);
        // source model untouched
        assert_eq!(m.len(), 5);
    }

    #[test]
    fn windowed_past_end_is_out_of_range() {
        let m = model(&[1.0, 2.0, 3.0]);
        let err = m.windowed(1, 4).expect_err("end beyond data");
        assert_eq!(
            err,
            SchedulingError::OutOfRange {
                start: 1,
                end: 4,
                len: 3
            }
        );
        assert!(m.windowed(2, 1).is_err());
    }

    #[test]
    fn rebased_shifts_origin() {
        let m = model(&[9.0, 8.0, 7.0]);
        let r = m.rebased(1).expect("in range");
        assert_eq!(r.values(), &[8.0, 7.0]);
        assert!(m.rebased(3).expect("empty tail is allowed").is_empty());
        assert!(m.rebased(4).is_err());
    }

    #[test]
    fn views_share_the_buffer() {
        let m = model(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).stretched(100);
        let r = m.rebased(150).expect("in range");
        let w = r.windowed(50, 250).expect("in range");
        assert!(Arc::ptr_eq(&m.data, &r.data));
        assert!(Arc::ptr_eq(&m.data, &w.data));

        // absolute ticks 200..400 are hours 2 and 3
        assert_eq!(w.len(), 200);
        assert_eq!(w.value_at(0), 0.03);
        assert_eq!(w.value_at(100), 0.04);
        // wraps inside the view, not the buffer
        assert_eq!(w.value_at(200), 0.03);
        assert_eq!(w.quantile(0, 200, 1.0), Some(0.04));
        assert!((w.mean() - 0.035).abs() < 1e-12);
        assert!(w.windowed(0, 201).is_err());
    }

    #[test]
    fn stretched_preserves_integral() {
        let m = model(&[3.0, 6.0, 0.0]);
        let s = m.stretched(3);
        assert_eq!(s.len(), 9);
        assert_eq!(&s.values()[..3], &[1.0, 1.0, 1.0]);
        let before: f64 = m.values().iter().sum();
        let after: f64 = s.values().iter().sum();
        assert!((before - after).abs() < 1e-12);
    }

    #[test]
    fn value_at_is_cyclic() {
        let m = model(&[1.0, 2.0, 3.0]);
        assert_eq!(m.value_at(3), 1.0);
        assert_eq!(m.value_at(7), 2.0);
        assert_eq!(model(&[]).value_at(4), 0.0);
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let m = model(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(m.quantile(0, 5, 0.0), Some(1.0));
        assert_eq!(m.quantile(0, 5, 0.5), Some(3.0));
        // pos = 0.3 * 4 = 1.2 -> 2.0 + 0.2 * (3.0 - 2.0)
        let q = m.quantile(0, 5, 0.3).expect("non-empty");
        assert!((q - 2.2).abs() < 1e-12);
        // truncated to available data
        assert_eq!(m.quantile(3, 100, 1.0), Some(5.0));
        assert_eq!(m.quantile(5, 10, 0.3), None);
    }

    #[test]
    fn mean_and_std() {
        let m = model(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(m.mean(), 5.0);
        assert!((m.std() - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn custom_model_is_flat() {
        let m = CarbonModel::custom(3);
        assert_eq!(m.len(), 48 * 30);
        assert_eq!(m.start_index(), 3);
        assert_eq!(m.error(), CarbonError::Custom);
        assert!(m.values().iter().all(|v| (*v - 0.1).abs() < 1e-12));
    }

    #[test]
    fn transforms_keep_origin_tags() {
        let m = model(&[1.0, 2.0]).with_origin(11, CarbonError::Average);
        let s = m.stretched(2).rebased(1).expect("in range");
        assert_eq!(s.start_index(), 11);
        assert_eq!(s.error(), CarbonError::Average);
        assert_eq!(s.name(), "test");
    }

    #[test]
    fn csv_trace_loads_after_offset() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "datetime,carbon_intensity_avg").expect("write header");
        for i in 0..(TRACE_OFFSET_HOURS + 4) {
            writeln!(file, "t{i},{}", i % 7 * 100).expect("write row");
        }
        let m = CarbonModel::from_csv_path(file.path(), "XX", 1, CarbonError::Oracle)
            .expect("trace should load");
        assert_eq!(m.len(), 3);
        let expected = ((TRACE_OFFSET_HOURS + 1) % 7 * 100) as f64 / 1000.0;
        assert_eq!(m.value_at(0), expected);
        assert_eq!(m.start_index(), 1);
    }

    #[test]
    fn csv_trace_without_column_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "datetime,other\nx,1").expect("write");
        let err = CarbonModel::from_csv_path(file.path(), "XX", 0, CarbonError::Oracle)
            .expect_err("column missing");
        assert!(matches!(err, Error::MissingColumn { .. }));
    }
}
