//! Run recording.
//!
//! Each run is a directory containing:
//! - `run.json` — metadata (id, timing, configuration, machine info)
//! - `stokes.txt` — one simulated sample per line, four floats (optional)
//! - `acf.txt` — verbose per-lag cross-covariance blocks (when lags > 0)
//! - `acf_plot.txt` — one line per lag: the lag, then for each of the 16
//!   matrix entries the expected value followed by the simulated value

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::field::Stokes;
use crate::simulation::{SimulationReport, StokesSink};

// ---------------------------------------------------------------------------
// Machine info
// ---------------------------------------------------------------------------

/// Host description stored with each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub os: String,
    pub arch: String,
    pub cores: usize,
}

pub fn detect_machine_info() -> MachineInfo {
    MachineInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        cores: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
    }
}

// ---------------------------------------------------------------------------
// Run metadata (run.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub samples_written: u64,
    pub config: SimulationConfig,
    pub machine: MachineInfo,
    pub polnoise_version: String,
}

// ---------------------------------------------------------------------------
// Run writer
// ---------------------------------------------------------------------------

/// Writes the files of one run.
pub struct RunWriter {
    run_dir: PathBuf,
    stokes_writer: Option<BufWriter<File>>,
    samples_written: u64,
    started_at: SystemTime,
    started_instant: Instant,
    run_id: String,
    machine: MachineInfo,
}

impl RunWriter {
    /// Create `{output_dir}/{timestamp}-{label}`; with `record_stokes` every
    /// sample is appended to `stokes.txt`.
    pub fn new(output_dir: &Path, label: &str, record_stokes: bool) -> Result<Self> {
        let started_at = SystemTime::now();
        let since_epoch = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let run_id = Uuid::new_v4().to_string();

        let dir_name = format!("{}-{}-{}", format_iso8601_compact(since_epoch), label, &run_id[..8]);
        let run_dir = output_dir.join(dir_name);
        fs::create_dir_all(&run_dir)?;

        let stokes_writer = if record_stokes {
            Some(BufWriter::new(File::create(run_dir.join("stokes.txt"))?))
        } else {
            None
        };

        Ok(Self {
            run_dir,
            stokes_writer,
            samples_written: 0,
            started_at,
            started_instant: Instant::now(),
            run_id,
            machine: detect_machine_info(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Write the lag tables (if any) and `run.json`.
    pub fn finish(mut self, config: &SimulationConfig, report: &SimulationReport) -> Result<PathBuf> {
        if let Some(w) = self.stokes_writer.as_mut() {
            w.flush()?;
        }

        if !report.lags.is_empty() {
            write_acf(&self.run_dir.join("acf.txt"), report)?;
            write_acf_plot(&self.run_dir.join("acf_plot.txt"), report)?;
        }

        let ended_at = SystemTime::now();
        let meta = RunMeta {
            version: 1,
            id: self.run_id.clone(),
            started_at: format_iso8601(self.started_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            ended_at: format_iso8601(ended_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            duration_ms: self.started_instant.elapsed().as_millis() as u64,
            samples_written: self.samples_written,
            config: config.clone(),
            machine: self.machine.clone(),
            polnoise_version: crate::VERSION.to_string(),
        };
        fs::write(self.run_dir.join("run.json"), serde_json::to_string_pretty(&meta)?)?;

        Ok(self.run_dir)
    }
}

impl StokesSink for RunWriter {
    fn write_stokes(&mut self, s: &Stokes) -> Result<()> {
        if let Some(w) = self.stokes_writer.as_mut() {
            writeln!(w, "{} {} {} {}", s[0], s[1], s[2], s[3])?;
            self.samples_written += 1;
        }
        Ok(())
    }
}

fn format_matrix(m: &[[f64; 4]; 4]) -> String {
    m.iter()
        .map(|row| row.iter().map(|v| format!("{v:>14.6e}")).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_acf(path: &Path, report: &SimulationReport) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for entry in &report.lags {
        writeln!(out, "============================================================")?;
        writeln!(out, "lag={}", entry.lag)?;
        if let Some(simulated) = &entry.simulated {
            writeln!(out, "mean=\n{}", format_matrix(simulated))?;
        }
        writeln!(out, "expected=\n{}", format_matrix(&entry.expected))?;
    }
    out.flush()?;
    Ok(())
}

fn write_acf_plot(path: &Path, report: &SimulationReport) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for entry in &report.lags {
        let mut line = entry.lag.to_string();
        for i in 0..4 {
            for j in 0..4 {
                line.push_str(&format!(" {}", entry.expected[i][j]));
                if let Some(simulated) = &entry.simulated {
                    line.push_str(&format!(" {}", simulated[i][j]));
                }
            }
        }
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// `2026-02-15T013000Z`, for directory names.
fn format_iso8601_compact(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_fields(since_epoch.as_secs());
    format!("{y:04}-{mo:02}-{d:02}T{h:02}{mi:02}{s:02}Z")
}

/// `2026-02-15T01:30:00Z`.
fn format_iso8601(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_fields(since_epoch.as_secs());
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

/// Calendar fields of a Unix time (proleptic Gregorian, no leap seconds).
fn utc_fields(secs: u64) -> (i64, u32, u32, u32, u32, u32) {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    // shift the epoch to 0000-03-01 so leap days fall at the end of each year
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);

    (
        year,
        month,
        day,
        (rem / 3600) as u32,
        ((rem / 60) % 60) as u32,
        (rem % 60) as u32,
    )
}
