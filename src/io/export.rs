//! JSON and CSV export for generated datasets.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::dataset::SampleResult;
use crate::error::Error;
use crate::scheduling::PolicyKey;

/// Column header for the per-sample CSV summary.
const SUMMARY_HEADER: &str = "sample,sched_policy,carbon_policy,carbon_start_index,num_tasks,\
                              waiting_time_h,base_wait_h,pol_wait_h,mean_d_power,\
                              scheduled_jobs,pol_scheduled_jobs,\
                              base_on_demand_cpu_h,pol_on_demand_cpu_h";

/// Path of the JSON dataset for `key` inside `dir`.
pub fn dataset_path(dir: &Path, key: PolicyKey) -> PathBuf {
    dir.join(format!("{key}_dataset.json"))
}

/// Path of the CSV summary for `key` inside `dir`.
pub fn summary_path(dir: &Path, key: PolicyKey) -> PathBuf {
    dir.join(format!("{key}_summary.csv"))
}

/// Writes `rows` as a JSON array to `<dir>/<key>_dataset.json`, creating
/// `dir` if needed.
///
/// # Errors
///
/// Returns `Write` if the directory or file cannot be created, or `Json`
/// if serialization fails.
pub fn write_dataset(dir: &Path, key: PolicyKey, rows: &[SampleResult]) -> Result<PathBuf, Error> {
    fs::create_dir_all(dir).map_err(|source| Error::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dataset_path(dir, key);
    let file = File::create(&path).map_err(|source| Error::Write {
        path: path.clone(),
        source,
    })?;
    let mut buf = BufWriter::new(file);
    serde_json::to_writer(&mut buf, rows)?;
    buf.flush().map_err(|source| Error::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Reads a dataset written by [`write_dataset`].
///
/// # Errors
///
/// Returns `Io` if the file cannot be opened, or `Json` if it is malformed.
pub fn read_dataset(path: &Path) -> Result<Vec<SampleResult>, Error> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes the per-sample summary for `key` next to its dataset.
///
/// # Errors
///
/// Returns `Write` if the file cannot be created or written.
pub fn export_summary_csv(dir: &Path, key: PolicyKey, rows: &[SampleResult]) -> Result<PathBuf, Error> {
    let path = summary_path(dir, key);
    let write_err = |source| Error::Write {
        path: path.clone(),
        source,
    };
    let file = File::create(&path).map_err(write_err)?;
    write_summary_csv(rows, BufWriter::new(file)).map_err(write_err)?;
    Ok(path)
}

/// Writes one summary row per sample as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_summary_csv(rows: &[SampleResult], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(SUMMARY_HEADER.split(',').map(str::trim))?;

    for (i, r) in rows.iter().enumerate() {
        let mean_d_power = if r.d_power.is_empty() {
            0.0
        } else {
            r.d_power.iter().sum::<f64>() / r.d_power.len() as f64
        };
        wtr.write_record(&[
            i.to_string(),
            r.sched_policy.clone(),
            r.carbon_policy.clone(),
            r.carbon_start_index.to_string(),
            r.num_tasks.to_string(),
            format!("{:.4}", r.waiting_time),
            format!("{:.4}", r.base_wait),
            format!("{:.4}", r.pol_wait),
            format!("{mean_d_power:.4}"),
            r.scheduled_jobs.to_string(),
            r.pol_scheduled_jobs.to_string(),
            format!("{:.4}", r.base_on_demand),
            format!("{:.4}", r.pol_on_demand),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
