use crate::core::Sample;
use crate::error::Result;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Column header of the persisted log, written once per file.
pub const CSV_HEADER: &str = "collision_number,elapsed_time,x,z,vx,vz,wall_clock_timestamp,particle_index";

/// One persisted log row.
///
/// `collision_number = 0` marks the initial sample of a run; subsequent
/// rows are one per collision in increasing elapsed time; the last row of
/// a given `particle_index` is the state at the run's total simulation
/// time. `particle_index` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub collision_number: u32,
    pub elapsed_time: f64,
    pub x: f64,
    pub z: f64,
    pub vx: f64,
    pub vz: f64,
    pub wall_clock_timestamp: String,
    pub particle_index: u64,
}

impl Record {
    /// Build a log row from a run sample.
    pub fn from_sample(sample: &Sample, particle_index: u64, timestamp: String) -> Self {
        Self {
            collision_number: sample.collision_number,
            elapsed_time: sample.time,
            x: sample.x,
            z: sample.z,
            vx: sample.vx,
            vz: sample.vz,
            wall_clock_timestamp: timestamp,
            particle_index,
        }
    }
}

/// Wall-clock timestamp for log rows: Unix seconds with millisecond
/// fraction. Not part of the deterministic payload.
pub fn wall_clock_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("{}.{:03}", d.as_secs(), d.subsec_millis()),
        Err(_) => "0.000".to_string(),
    }
}

/// Explicit append-only record sink passed into each run collection.
///
/// Appends within one particle's run must arrive in elapsed-time order;
/// ordering between different particles is irrelevant. `flush` makes all
/// appended records durable.
pub trait RecordSink {
    fn append(&mut self, record: &Record) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// CSV file sink. Opens in append mode; the header row is written only
/// when the file is created by this call.
#[derive(Debug)]
pub struct CsvSink {
    writer: BufWriter<std::fs::File>,
}

impl CsvSink {
    /// Open (or create) the log file at `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let existed = path.as_ref().exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        if !existed {
            writeln!(writer, "{CSV_HEADER}")?;
        }
        Ok(Self { writer })
    }
}

impl RecordSink for CsvSink {
    fn append(&mut self, r: &Record) -> Result<()> {
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{},{}",
            r.collision_number,
            r.elapsed_time,
            r.x,
            r.z,
            r.vx,
            r.vz,
            r.wall_clock_timestamp,
            r.particle_index
        )?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// In-memory sink for tests and programmatic consumers.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Record>,
}

impl RecordSink for MemorySink {
    fn append(&mut self, record: &Record) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
