// src/monitoring/report.rs
//! Report sinks
//!
//! Monitoring records flow to one or more sinks. File-backed sinks buffer
//! and flush on demand; the in-memory sink exists for assertions in tests
//! and for programmatic consumers of a finished run.

use crate::monitoring::monitor::ReportRecord;
use crate::utils::errors::Result;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

/// Destination for monitoring records
pub trait ReportSink {
    fn report(&self, record: &ReportRecord) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// CSV file sink, one row per record, header written up front
pub struct CsvSink {
    writer: RefCell<BufWriter<File>>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Rc<Self>> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(
            writer,
            "time,service,queue_length,utilization,workers,arrival_rate,\
             rejection_rate,reliability,throughput,mean_response_time"
        )?;
        Ok(Rc::new(Self {
            writer: RefCell::new(writer),
        }))
    }
}

impl ReportSink for CsvSink {
    fn report(&self, record: &ReportRecord) -> Result<()> {
        writeln!(
            self.writer.borrow_mut(),
            "{},{},{},{:.4},{},{:.4},{:.4},{:.4},{:.4},{:.2}",
            record.time,
            record.service,
            record.queue_length,
            record.utilization,
            record.workers,
            record.arrival_rate,
            record.rejection_rate,
            record.reliability,
            record.throughput,
            record.mean_response_time,
        )?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.borrow_mut().flush()?;
        Ok(())
    }
}

/// JSON-lines file sink, one serialized record per line
pub struct JsonLinesSink {
    writer: RefCell<BufWriter<File>>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Rc<Self>> {
        Ok(Rc::new(Self {
            writer: RefCell::new(BufWriter::new(File::create(path)?)),
        }))
    }
}

impl ReportSink for JsonLinesSink {
    fn report(&self, record: &ReportRecord) -> Result<()> {
        let mut writer = self.writer.borrow_mut();
        serde_json::to_writer(&mut *writer, record)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        writeln!(writer)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.borrow_mut().flush()?;
        Ok(())
    }
}

/// In-memory sink collecting every record
#[derive(Default)]
pub struct MemorySink {
    records: RefCell<Vec<ReportRecord>>,
}

impl MemorySink {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn records(&self) -> Vec<ReportRecord> {
        self.records.borrow().clone()
    }
}

impl ReportSink for MemorySink {
    fn report(&self, record: &ReportRecord) -> Result<()> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }
}
