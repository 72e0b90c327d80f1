use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use tmon_core::Celsius;

use super::{ProbeError, TemperatureProbe};

/// Reads one feature of one chip through the lm-sensors `sensors` utility.
///
/// Runs `sensors -u <chip>` and parses its raw output, e.g.:
///
/// ```text
/// coretemp-isa-0000
/// Adapter: ISA adapter
/// Package id 0:
///   temp1_input: 45.000
///   temp1_max: 80.000
/// Core 0:
///   temp2_input: 43.000
/// ```
///
/// With `sensor_id = "Package id 0"` the reading is `45`.
#[derive(Debug, Clone)]
pub struct LmSensorsProbe {
    program: String,
    chip: String,
    sensor_id: String,
}

impl LmSensorsProbe {
    pub fn new(program: impl Into<String>, chip: impl Into<String>, sensor_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            chip: chip.into(),
            sensor_id: sensor_id.into(),
        }
    }
}

#[async_trait]
impl TemperatureProbe for LmSensorsProbe {
    async fn read_temperature(&self) -> Result<Celsius, ProbeError> {
        let output = Command::new(&self.program)
            .arg("-u")
            .arg(&self.chip)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(chip = %self.chip, bytes = stdout.len(), "sensors output received");

        parse_sensors_output(&stdout, &self.sensor_id)
    }

    fn describe(&self) -> String {
        format!("{} -u {} [{}]", self.program, self.chip, self.sensor_id)
    }
}

/// Extracts the reading for `sensor_id` from `sensors -u` output.
///
/// Finds the line `<sensor_id>:` and takes the first `_input` line after it.
/// The value is truncated toward zero, so `21.7` reads as `21`.
pub fn parse_sensors_output(output: &str, sensor_id: &str) -> Result<Celsius, ProbeError> {
    let header = format!("{sensor_id}:");
    let mut lines = output
        .lines()
        .skip_while(|line| line.trim_end() != header);

    if lines.next().is_none() {
        return Err(ProbeError::SensorNotFound {
            sensor_id: sensor_id.to_string(),
        });
    }

    let input_line = lines
        .find(|line| line.contains("_input"))
        .ok_or_else(|| ProbeError::NoInput {
            sensor_id: sensor_id.to_string(),
        })?;

    let value = input_line.rsplit(':').next().unwrap_or_default().trim();
    let reading: f64 = value.parse().map_err(|e: std::num::ParseFloatError| ProbeError::Parse {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    Celsius::from_fractional(reading).map_err(|e| ProbeError::Parse {
        value: value.to_string(),
        reason: e.to_string(),
    })
}
