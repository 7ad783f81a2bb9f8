//! Offline replay of recorded battery traces.
//!
//! Feeds a JSON trace (or the built-in demonstration run) through the slave
//! estimator with an in-memory flash and prints the per-super-cell
//! State-of-Safety verdicts.

mod trace;

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use packwatch_core::{FlashStorage, StorageError, SUPERS_PER_MODULE, TEMP_SENSORS};
use packwatch_slave::{BatteryDriver, Slave, SlaveInterface};
use trace::{Trace, demo_trace};

#[derive(Parser)]
#[command(name = "packwatch-replay")]
#[command(about = "Replay a recorded battery trace through the State-of-Safety estimator")]
#[command(version)]
struct Cli {
    /// Path to a JSON trace file; the built-in demonstration trace when
    /// absent.
    trace: Option<PathBuf>,

    /// Print the diagnostics recorded during the run.
    #[arg(long)]
    diagnostics: bool,

    /// Output the results as JSON.
    #[arg(long)]
    json: bool,
}

/// Driver replaying a resolved trace. The replay loop owns the cursor.
struct ReplayDriver {
    times_ms: Vec<u32>,
    voltages: Vec<[u16; SUPERS_PER_MODULE]>,
    currents: Vec<i32>,
    cursor: Rc<Cell<usize>>,
    flash: Vec<u8>,
    write_pos: usize,
}

impl FlashStorage for ReplayDriver {
    fn flash_read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let start = address as usize;
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.flash.get(start + i).copied().unwrap_or(0);
        }
        Ok(())
    }

    fn flash_write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let end = self.write_pos + data.len();
        if self.flash.len() < end {
            self.flash.resize(end, 0);
        }
        self.flash[self.write_pos..end].copy_from_slice(data);
        self.write_pos = end;
        Ok(())
    }
}

impl BatteryDriver for ReplayDriver {
    fn timestamp_ms(&mut self) -> u32 {
        self.times_ms[self.cursor.get()]
    }

    fn cell_voltages(&mut self) -> [u16; SUPERS_PER_MODULE] {
        self.voltages[self.cursor.get()]
    }

    fn module_current(&mut self) -> i32 {
        self.currents[self.cursor.get()]
    }

    fn temperatures(&mut self) -> [u16; TEMP_SENSORS] {
        [0; TEMP_SENSORS]
    }
}

#[derive(Serialize)]
struct Report {
    samples: usize,
    completed_tps: i16,
    sos: Vec<u8>,
    verdicts: Vec<&'static str>,
    diagnostics: Vec<String>,
}

fn verdict_label(byte: u8) -> &'static str {
    match byte {
        1 => "NORMAL",
        2 => "ATTENTION",
        3 => "CRITICAL",
        _ => "UNKNOWN",
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let trace = match &cli.trace {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Trace::from_json(&text)?
        }
        None => demo_trace(),
    };
    let times_ms = trace.resolve_times()?;
    let samples = trace.len();

    let cursor = Rc::new(Cell::new(0));
    let driver = ReplayDriver {
        times_ms,
        voltages: trace.voltages,
        currents: trace.currents,
        cursor: cursor.clone(),
        flash: Vec::new(),
        write_pos: 0,
    };

    let mut slave = Slave::new();
    slave
        .setup_interface(SlaveInterface::new(Box::new(driver), 0x700))
        .map_err(|e| anyhow::anyhow!("setup failed: {e}"))?;
    slave
        .initialise()
        .map_err(|e| anyhow::anyhow!("initialise failed with code {:#04x}: {e}", e.code()))?;

    for index in 0..samples {
        cursor.set(index);
        slave.event_trigger();
    }

    // Collected before terminate tears the session down.
    let diagnostics: Vec<String> = slave
        .diagnostics()
        .map(|log| {
            log.iter()
                .map(|d| format!("{:?} [{}] at t={}µs: {}", d.code, d.source, d.time_us, d.message))
                .collect()
        })
        .unwrap_or_default();

    slave.terminate();
    let sos = *slave.sos();

    let report = Report {
        samples,
        completed_tps: slave.completed_tps(),
        sos: sos.to_vec(),
        verdicts: sos.iter().map(|&b| verdict_label(b)).collect(),
        diagnostics,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "replayed {} samples, {} transition period(s) completed",
        report.samples, report.completed_tps
    );
    for (k, verdict) in report.verdicts.iter().enumerate() {
        println!("super-cell {k:2}: {verdict}");
    }
    if cli.diagnostics {
        println!();
        if report.diagnostics.is_empty() {
            println!("no diagnostics recorded");
        } else {
            for line in &report.diagnostics {
                println!("{line}");
            }
        }
    }
    Ok(())
}
