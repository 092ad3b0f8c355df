//! Run parameters: the input timing of one attempt.

use std::{fmt, str::FromStr};

/// Number of comma-separated fields in a run command.
const FIELD_COUNT: usize = 7;

const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "initial-fire-delay-ms",
    "initial-skip-ms",
    "step-count",
    "per-step-press-ms",
    "per-step-skip-ms",
    "pre-throw-skip-ms",
    "throw-press-ms",
];

/// Errors from parsing run parameters.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunParamsError {
    #[error("expected {FIELD_COUNT} comma-separated fields, got {0}")]
    FieldCount(usize),

    #[error("{field}: not an integer: {value:?}")]
    NotAnInteger { field: &'static str, value: String },

    #[error("{field}: must not be negative")]
    Negative { field: &'static str },
}

/// Timing parameters for one attempt, as understood by the device firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunParams {
    /// Initial fire press before running; `None` if the button is not pressed at all.
    pub initial_fire_ms: Option<u32>,
    pub initial_skip_ms: u32,
    pub steps: u32,
    pub step_press_ms: u32,
    pub step_skip_ms: u32,
    pub pre_throw_skip_ms: u32,
    /// How long the joystick is held left; sets the throwing angle.
    pub throw_ms: u32,
}

impl FromStr for RunParams {
    type Err = RunParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: Vec<&str> = s.split(',').map(str::trim).collect();
        if raw.len() != FIELD_COUNT {
            return Err(RunParamsError::FieldCount(raw.len()));
        }

        let mut values = [0i64; FIELD_COUNT];
        for (i, (value, field)) in raw.iter().zip(FIELD_NAMES).enumerate() {
            values[i] = value
                .parse()
                .map_err(|_| RunParamsError::NotAnInteger {
                    field,
                    value: (*value).to_string(),
                })?;
        }

        let initial_fire_ms = match values[0] {
            -1 => None,
            v => Some(non_negative(v, FIELD_NAMES[0])?),
        };
        let field = |i: usize| non_negative(values[i], FIELD_NAMES[i]);

        Ok(Self {
            initial_fire_ms,
            initial_skip_ms: field(1)?,
            steps: field(2)?,
            step_press_ms: field(3)?,
            step_skip_ms: field(4)?,
            pre_throw_skip_ms: field(5)?,
            throw_ms: field(6)?,
        })
    }
}

fn non_negative(value: i64, field: &'static str) -> Result<u32, RunParamsError> {
    u32::try_from(value).map_err(|_| RunParamsError::Negative { field })
}

impl fmt::Display for RunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.initial_fire_ms {
            Some(ms) => write!(f, "{ms}")?,
            None => f.write_str("-1")?,
        }
        write!(
            f,
            ",{},{},{},{},{},{}",
            self.initial_skip_ms,
            self.steps,
            self.step_press_ms,
            self.step_skip_ms,
            self.pre_throw_skip_ms,
            self.throw_ms
        )
    }
}

/// A request to record one attempt.
///
/// The parameter text is opaque to the engine: it is logged verbatim and
/// echoed to the device as `r <params>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// The run parameters exactly as typed or generated.
    pub params: String,

    /// Extra replay filename components between the outcome tag and the version,
    /// e.g. `["s30", "p55"]`.
    pub disambiguators: Vec<String>,
}

impl RunRequest {
    pub fn new(params: impl Into<String>) -> Self {
        Self {
            params: params.into(),
            disambiguators: Vec::new(),
        }
    }

    /// The line sent to the device for this run.
    pub fn device_line(&self) -> String {
        format!("r {}", self.params)
    }
}
