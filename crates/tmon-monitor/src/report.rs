//! Console output of poll rounds.

use std::io::{self, Write};

use serde::Serialize;

use tmon_core::{Sensor, SensorStatus};

/// Output format of [`ConsoleReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// One line per sensor: `kitchen (192.168.1.10) : 23 °C`
    #[default]
    Text,

    /// One JSON object per round: `{"round":1,"sensors":[...]}`
    Json,
}

/// Receives the registry snapshot after every poll round.
pub trait Reporter: Send {
    fn report(&mut self, round: u64, sensors: &[Sensor]) -> io::Result<()>;
}

#[derive(Serialize)]
struct RoundReport<'a> {
    round: u64,
    sensors: &'a [Sensor],
}

/// Writes rounds to a stream, stdout in the binary.
pub struct ConsoleReporter<W> {
    writer: W,
    format: ReportFormat,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout(format: ReportFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(writer: W, format: ReportFormat) -> Self {
        Self { writer, format }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Reporter for ConsoleReporter<W> {
    fn report(&mut self, round: u64, sensors: &[Sensor]) -> io::Result<()> {
        match self.format {
            ReportFormat::Text => {
                for sensor in sensors {
                    writeln!(self.writer, "{}", text_line(sensor))?;
                }
            }
            ReportFormat::Json => {
                serde_json::to_writer(&mut self.writer, &RoundReport { round, sensors })?;
                writeln!(self.writer)?;
            }
        }
        self.writer.flush()
    }
}

/// Renders one sensor, marking values that are not current.
fn text_line(sensor: &Sensor) -> String {
    let marker = match sensor.status {
        SensorStatus::Fresh => return sensor.to_string(),
        SensorStatus::Unpolled => "no reading yet",
        SensorStatus::Stale { .. } => "stale",
        SensorStatus::Vanished => "vanished",
    };
    format!("{sensor} [{marker}]")
}
