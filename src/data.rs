//! Data exchanged with the AlpyneServer: the model schema, engine settings
//! and status snapshots.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::constants::EngineState;
use crate::units::{TimeUnits, UnitValue};

/// One named, typed data element of the model (a parameter, an output, a
/// configuration/observation/action field, or an engine setting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub units: Option<String>,
}

impl fmt::Display for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}={}",
            self.name,
            self.type_.as_deref().unwrap_or("?"),
            self.value
        )?;
        if let Some(units) = &self.units {
            write!(f, " {}", units)?;
        }
        Ok(())
    }
}

/// Description of everything the exported model accepts and exposes.
///
/// - inputs: parameters of the top-level agent
/// - outputs: analysis objects on the top-level agent
/// - engine_settings: units, seed, start/stop time and date
/// - configuration / observation / action: fields of the RL experiment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimSchema {
    #[serde(default)]
    pub inputs: Vec<FieldData>,
    #[serde(default)]
    pub outputs: Vec<FieldData>,
    #[serde(default)]
    pub engine_settings: Vec<FieldData>,
    #[serde(default)]
    pub configuration: Vec<FieldData>,
    #[serde(default)]
    pub observation: Vec<FieldData>,
    #[serde(default)]
    pub action: Vec<FieldData>,
}

fn defaults_of(fields: &[FieldData]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| (field.name.clone(), field.value.clone()))
        .collect()
}

impl SimSchema {
    /// Default configuration as declared in the exported experiment.
    pub fn configuration_template(&self) -> Map<String, Value> {
        defaults_of(&self.configuration)
    }

    pub fn action_template(&self) -> Map<String, Value> {
        defaults_of(&self.action)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.outputs.iter().map(|field| field.name.clone()).collect()
    }

    /// Engine settings declared by the experiment, before any overrides.
    pub fn engine_settings_template(&self) -> Result<EngineSettings, serde_json::Error> {
        serde_json::from_value(Value::Object(defaults_of(&self.engine_settings)))
    }

    /// One-line summary of field names per section.
    pub fn summary(&self) -> String {
        let names = |fields: &[FieldData]| {
            fields
                .iter()
                .map(|field| field.name.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "Schema(cfg=[{}], obs=[{}], act=[{}], ops=[{}])",
            names(&self.configuration),
            names(&self.observation),
            names(&self.action),
            names(&self.outputs)
        )
    }
}

impl fmt::Display for SimSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: [(&str, &[FieldData]); 6] = [
            ("Inputs", &self.inputs),
            ("Outputs", &self.outputs),
            ("Engine Settings", &self.engine_settings),
            ("Configuration", &self.configuration),
            ("Observation", &self.observation),
            ("Action", &self.action),
        ];
        write!(f, "[Schema]")?;
        for (title, fields) in sections {
            write!(f, "\n{}", title)?;
            for field in fields {
                write!(f, "\n\t- {}", field)?;
            }
        }
        Ok(())
    }
}

/// Date formats the server's JSON mapper accepts. Matched as prefixes.
const DATE_PATTERNS: [&str; 4] = [
    r"^\d{4}-\d{2}-\d{2}",
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}.\d{6}",
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}.\d{6}-\d{2,4}",
    r"^[A-Za-z]{3}, \d{2} \d{2} \d{4} \d{2}:\d{2}:\d{2}[ A-Z]{0,4}",
];

/// Format used when sending dates to the server.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

static DATE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DATE_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

pub fn recognized_date_format(date: &str) -> bool {
    DATE_REGEXES.iter().any(|re| re.is_match(date))
}

/// An engine date as the server sends it: epoch milliseconds or a formatted string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineDate {
    Millis(i64),
    Text(String),
}

impl EngineDate {
    /// Only text dates can be malformed.
    pub fn is_recognized(&self) -> bool {
        match self {
            EngineDate::Millis(_) => true,
            EngineDate::Text(text) => recognized_date_format(text),
        }
    }
}

impl fmt::Display for EngineDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineDate::Millis(ms) => write!(f, "{}", ms),
            EngineDate::Text(text) => f.write_str(text),
        }
    }
}

/// Engine settings for a run; `None` fields fall back to the experiment's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    #[serde(default)]
    pub units: Option<TimeUnits>,
    #[serde(default, alias = "start_time")]
    pub start_time: Option<f64>,
    #[serde(default, alias = "start_date")]
    pub start_date: Option<EngineDate>,
    #[serde(default, alias = "stop_time")]
    pub stop_time: Option<f64>,
    #[serde(default, alias = "stop_date")]
    pub stop_date: Option<EngineDate>,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl EngineSettings {
    /// Warn about dates the server is unlikely to parse. Never fails.
    pub fn check_dates(&self) {
        for (label, date) in [("Start", &self.start_date), ("Stop", &self.stop_date)] {
            if let Some(date) = date {
                if !date.is_recognized() {
                    warn!(
                        "{} date '{}' does not match any recognized pattern; this may cause issues",
                        label, date
                    );
                }
            }
        }
    }
}

impl fmt::Display for EngineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineSettings{{units={}, seed={}, startTime={}, startDate={}, stopTime={}, stopDate={}}}",
            self.units.map(|u| u.name()).unwrap_or("None"),
            display_opt(&self.seed),
            display_opt(&self.start_time),
            display_opt(&self.start_date),
            display_opt(&self.stop_time),
            display_opt(&self.stop_date),
        )
    }
}

fn display_opt<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "None".to_string())
}

/// User-level overrides applied on top of the experiment's engine settings.
///
/// Times may be given in any time unit; they are converted into the engine's
/// model time units before being sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOverrides {
    pub units: Option<TimeUnits>,
    pub seed: Option<i64>,
    pub start_time: Option<UnitValue>,
    pub stop_time: Option<UnitValue>,
    pub start_date: Option<NaiveDateTime>,
    pub stop_date: Option<NaiveDateTime>,
}

impl EngineOverrides {
    pub fn apply(&self, base: &EngineSettings) -> EngineSettings {
        let mut settings = base.clone();
        if self.units.is_some() {
            settings.units = self.units;
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
        let model_units = settings.units;
        let to_model_time = |value: &UnitValue| match model_units {
            Some(units) => value.as_time(units).unwrap_or(value.value),
            None => value.value,
        };
        if let Some(start) = &self.start_time {
            settings.start_time = Some(to_model_time(start));
        }
        if let Some(stop) = &self.stop_time {
            settings.stop_time = Some(to_model_time(stop));
        }
        if let Some(date) = self.start_date {
            settings.start_date = Some(EngineDate::Text(date.format(DATE_FORMAT).to_string()));
        }
        if let Some(date) = self.stop_date {
            settings.stop_date = Some(EngineDate::Text(date.format(DATE_FORMAT).to_string()));
        }
        settings
    }
}

/// Experiment-level snapshot returned after a reset, an action, or a lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimStatus {
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub observation: Map<String, Value>,
    /// Whether the experiment's stop condition was met
    #[serde(default, alias = "stop")]
    pub done: bool,
    #[serde(default)]
    pub state: Option<EngineState>,
    #[serde(default)]
    pub sequence_id: Option<i64>,
    #[serde(default)]
    pub episode_num: Option<i64>,
    #[serde(default)]
    pub step_num: Option<i64>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl SimStatus {
    pub fn state(&self) -> EngineState {
        self.state.unwrap_or_default()
    }

    /// The run cannot advance further (finished, failed, or stop condition met).
    pub fn is_terminal(&self) -> bool {
        self.done
            || self
                .state()
                .intersects(EngineState::FINISHED | EngineState::ERROR)
    }
}

impl fmt::Display for SimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SimStatus(state={}, done={}, episode={}, step={}, sequence={}, time={}, date={}, observation={}",
            self.state(),
            self.done,
            display_opt(&self.episode_num),
            display_opt(&self.step_num),
            display_opt(&self.sequence_id),
            display_opt(&self.time),
            display_opt(&self.date),
            Value::Object(self.observation.clone()),
        )?;
        if let Some(message) = &self.message {
            if !message.is_empty() {
                write!(f, ", message={}", message)?;
            }
        }
        write!(f, ")")
    }
}

/// Engine-level snapshot (clock, event counts, effective settings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub state: Option<EngineState>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub event_count: Option<u64>,
    #[serde(default)]
    pub step_count: Option<u64>,
    #[serde(default)]
    pub next_step_time: Option<f64>,
    #[serde(default)]
    pub next_event_time: Option<f64>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub settings: Option<EngineSettings>,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineStatus(state={}, time={}, date={}, events={}, steps={}, progress={})",
            self.state.unwrap_or_default(),
            display_opt(&self.time),
            display_opt(&self.date),
            display_opt(&self.event_count),
            display_opt(&self.step_count),
            display_opt(&self.progress),
        )
    }
}
