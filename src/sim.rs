//! Client handle for one exported AnyLogic model.
//!
//! [`AnyLogicSim`] owns the server process (when it started it), the HTTP
//! transport and the model schema fetched at startup. Configuration and
//! action values given by the caller are overlaid on the defaults the
//! experiment declares, so callers only name the fields they change.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::constants::{EngineState, JavaLogLevel};
use crate::data::{EngineOverrides, EngineSettings, EngineStatus, SimSchema, SimStatus};
use crate::error::{LockTimeout, ModelError};
use crate::http::HttpClient;
use crate::outputs::Outputs;
use crate::server::{find_free_port, resolve_model_jar, ResolvedModel, ServerProcess};

/// Operations a driver needs from a simulation run.
#[async_trait]
pub trait Simulation: Send + Sync {
    /// Description of the model's inputs, outputs and RL spaces.
    fn schema(&self) -> &SimSchema;

    /// Start a new episode with the given configuration values.
    async fn reset(&self, config: Map<String, Value>) -> anyhow::Result<SimStatus>;

    /// Submit an action and advance to the next stopping point.
    async fn take_action(&self, action: Map<String, Value>) -> anyhow::Result<SimStatus>;

    /// Current values of the named outputs, or of every output when `None`.
    async fn outputs(&self, names: Option<&[String]>) -> anyhow::Result<Outputs>;
}

/// Per-run options for [`AnyLogicSim`].
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Applied on top of the experiment's engine settings at every reset
    pub engine_overrides: EngineOverrides,
    /// Configuration values used when a reset does not name them
    pub config_defaults: Map<String, Value>,
    /// How long reset/take_action wait for the engine to settle
    pub lock_timeout: Duration,
    /// Wait for the engine to settle after reset/take_action
    pub auto_wait: bool,
    /// Local port for the server; 0 picks a free one
    pub port: u16,
    /// Overrides the configured server log level
    pub java_log_level: Option<JavaLogLevel>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            engine_overrides: EngineOverrides::default(),
            config_defaults: Map::new(),
            lock_timeout: Duration::from_secs(30),
            auto_wait: true,
            port: 0,
            java_log_level: None,
        }
    }
}

pub struct AnyLogicSim {
    http: HttpClient,
    schema: SimSchema,
    options: SimOptions,
    server: Option<ServerProcess>,
    model: Option<ResolvedModel>,
}

impl AnyLogicSim {
    /// Start a server for the model at `model_path` and connect to it.
    ///
    /// `model_path` may be a `model.jar`, its directory, or the exported `.zip`.
    pub async fn launch(
        model_path: impl AsRef<Path>,
        options: SimOptions,
        config: &SimConfig,
    ) -> anyhow::Result<Self> {
        let model = resolve_model_jar(model_path.as_ref())?;
        let port = if options.port == 0 {
            find_free_port().context("Failed to find a free port for the server")?
        } else {
            options.port
        };
        let log_level = options.java_log_level.unwrap_or(config.java_log_level);

        let server = ServerProcess::spawn(
            &config.java_path,
            &config.server_lib,
            model.model_dir(),
            port,
            log_level,
        )
        .await?;

        let base_url = format!("http://{}:{}", config.host, port);
        let http = HttpClient::new(base_url, config.http_timeout);
        let schema = match fetch_schema(&http).await {
            Ok(schema) => schema,
            Err(e) => {
                warn!("Server did not answer its version endpoint: {}", e);
                server.shutdown().await;
                model.cleanup();
                return Err(ModelError::startup(
                    "Failed to properly start the app. Check the logs.",
                )
                .into());
            }
        };
        info!("Connected to model: {}", schema.summary());

        Ok(Self {
            http,
            schema,
            options,
            server: Some(server),
            model: Some(model),
        })
    }

    /// Attach to a server that is already running at `base_url`.
    pub async fn connect(
        base_url: impl Into<String>,
        options: SimOptions,
        config: &SimConfig,
    ) -> anyhow::Result<Self> {
        let http = HttpClient::new(base_url, config.http_timeout);
        let schema = fetch_schema(&http).await.map_err(|e| {
            warn!("Server did not answer its version endpoint: {}", e);
            ModelError::startup("Failed to properly start the app. Check the logs.")
        })?;
        info!("Connected to model at {}: {}", http.root_url(), schema.summary());

        Ok(Self {
            http,
            schema,
            options,
            server: None,
            model: None,
        })
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    /// Engine settings the next reset will send.
    pub fn engine_settings(&self) -> anyhow::Result<EngineSettings> {
        let base = self
            .schema
            .engine_settings_template()
            .map_err(|e| ModelError::parse(format!("Invalid engine settings in schema: {}", e)))?;
        Ok(self.options.engine_overrides.apply(&base))
    }

    pub async fn status(&self) -> anyhow::Result<SimStatus> {
        let response = self.http.get("/rl", None).await?;
        decode(response.body, "status")
    }

    pub async fn engine_status(&self) -> anyhow::Result<EngineStatus> {
        let response = self.http.get("/engine", None).await?;
        decode(response.body, "engine status")
    }

    /// Block until the engine is in any of the states in `flag`.
    pub async fn lock(&self, flag: EngineState, timeout: Duration) -> anyhow::Result<SimStatus> {
        let mut params = Map::new();
        params.insert("state".to_string(), json!(flag.names()));
        params.insert("timeout".to_string(), json!(timeout.as_millis() as u64));

        match self.http.get("/engine/lock", Some(&params)).await {
            Ok(response) => decode(response.body, "lock status"),
            Err(e) if e.status_code == Some(408) => {
                let status = serde_json::from_str::<SimStatus>(&e.message).unwrap_or_default();
                Err(LockTimeout {
                    wanted: flag.to_string(),
                    timeout_secs: timeout.as_secs(),
                    status: Box::new(status),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn settle(&self) -> anyhow::Result<SimStatus> {
        if self.options.auto_wait {
            self.lock(EngineState::settled(), self.options.lock_timeout).await
        } else {
            self.status().await
        }
    }

    /// Stop the run, shut the server down and remove any extracted model files.
    pub async fn close(mut self) {
        if let Err(e) = self.http.delete("/").await {
            debug!("Server did not acknowledge shutdown request: {}", e);
        }
        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }
        if let Some(model) = self.model.take() {
            model.cleanup();
        }
    }
}

#[async_trait]
impl Simulation for AnyLogicSim {
    fn schema(&self) -> &SimSchema {
        &self.schema
    }

    async fn reset(&self, config: Map<String, Value>) -> anyhow::Result<SimStatus> {
        let mut configuration = self.schema.configuration_template();
        configuration.extend(self.options.config_defaults.clone());
        configuration.extend(config);

        let settings = self.engine_settings()?;
        settings.check_dates();

        let response = self
            .http
            .put(
                "/rl",
                &json!({"configuration": configuration, "engineSettings": settings}),
            )
            .await?;
        if !matches!(response.status, 200 | 201) {
            return Err(ModelError::rejected(response.status, "Reset request was not accepted").into());
        }

        self.settle().await
    }

    async fn take_action(&self, action: Map<String, Value>) -> anyhow::Result<SimStatus> {
        let mut merged = self.schema.action_template();
        merged.extend(action);

        let response = self.http.patch("/rl", &json!({"action": merged})).await?;
        if !matches!(response.status, 200 | 202) {
            return Err(ModelError::rejected(response.status, "Action request was not accepted").into());
        }

        self.settle().await
    }

    async fn outputs(&self, names: Option<&[String]>) -> anyhow::Result<Outputs> {
        let names = match names {
            Some(names) => names.to_vec(),
            None => self.schema.output_names(),
        };
        let mut params = Map::new();
        params.insert("names".to_string(), json!(names));

        let response = self.http.get("/outputs", Some(&params)).await?;
        match response.body {
            Some(body) => decode(Some(body), "outputs"),
            None => Ok(Outputs::new()),
        }
    }
}

async fn fetch_schema(http: &HttpClient) -> anyhow::Result<SimSchema> {
    let response = http.get("/version", None).await?;
    decode(response.body, "version")
}

fn decode<T: serde::de::DeserializeOwned>(body: Option<Value>, what: &str) -> anyhow::Result<T> {
    let body = body.ok_or_else(|| ModelError::parse(format!("Empty {} response", what)))?;
    serde_json::from_value(body)
        .map_err(|e| ModelError::parse(format!("Failed to parse {}: {}", what, e)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::EngineDate;
    use crate::outputs::OutputValue;
    use crate::testing::{MockBehavior, MockServer, START_DATE_MILLIS, STOP_DATE_MILLIS};
    use crate::units::{TimeUnits, UnitValue};

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    async fn connect(server: &MockServer, options: SimOptions) -> AnyLogicSim {
        AnyLogicSim::connect(server.url(), options, &SimConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_fetches_schema() {
        let server = MockServer::start().await;
        let sim = connect(&server, SimOptions::default()).await;
        assert_eq!(sim.schema().output_names(), vec!["costPerProduct", "totalProcessed"]);
        assert_eq!(server.calls_to("GET", "/version").len(), 1);
    }

    #[tokio::test]
    async fn test_reset_merges_template_defaults_and_values() {
        let server = MockServer::start().await;
        let options = SimOptions {
            engine_overrides: EngineOverrides {
                seed: Some(1),
                stop_time: Some(UnitValue::time(180.0, TimeUnits::Day)),
                ..Default::default()
            },
            config_defaults: obj(json!({"sizeBufferQueues": 90})),
            ..Default::default()
        };
        let sim = connect(&server, options).await;

        let status = sim.reset(obj(json!({"arrivalRate": 1.5}))).await.unwrap();
        assert_eq!(status.state(), EngineState::PAUSED);

        let puts = server.calls_to("PUT", "/rl");
        assert_eq!(puts.len(), 1);
        let body = puts[0].body.clone().unwrap();
        assert_eq!(body["configuration"]["arrivalRate"], json!(1.5));
        assert_eq!(body["configuration"]["sizeBufferQueues"], json!(90));
        assert_eq!(body["engineSettings"]["seed"], json!(1));
        // 180 days in the model's hour units
        assert_eq!(body["engineSettings"]["stopTime"], json!(4320.0));

        let locks = server.calls_to("GET", "/engine/lock");
        assert_eq!(locks.len(), 1);
        let states: Vec<&str> = locks[0]
            .query
            .iter()
            .filter(|(k, _)| k == "state")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(states, vec!["PAUSED", "FINISHED", "ERROR"]);
        assert!(locks[0].query.contains(&("timeout".to_string(), "30000".to_string())));
    }

    #[tokio::test]
    async fn test_reset_with_millis_engine_dates() {
        let server = MockServer::start_with(MockBehavior {
            numeric_dates: true,
            ..Default::default()
        })
        .await;
        let sim = connect(&server, SimOptions::default()).await;
        let settings = sim.engine_settings().unwrap();
        assert_eq!(settings.start_date, Some(EngineDate::Millis(START_DATE_MILLIS)));

        let status = sim.reset(Map::new()).await.unwrap();
        assert_eq!(status.state(), EngineState::PAUSED);

        let puts = server.calls_to("PUT", "/rl");
        assert_eq!(puts.len(), 1);
        let body = puts[0].body.clone().unwrap();
        assert_eq!(body["engineSettings"]["startDate"], json!(START_DATE_MILLIS));
        assert_eq!(body["engineSettings"]["stopDate"], json!(STOP_DATE_MILLIS));
    }

    #[tokio::test]
    async fn test_take_action_sends_full_action() {
        let server = MockServer::start().await;
        let sim = connect(&server, SimOptions::default()).await;
        sim.reset(Map::new()).await.unwrap();

        let status = sim
            .take_action(obj(json!({"numResourceA": 10, "processDelay": 2.0})))
            .await
            .unwrap();
        assert!(status.is_terminal());
        assert_eq!(status.observation["utilizationA"], json!(0.82));

        let patches = server.calls_to("PATCH", "/rl");
        let action = &patches[0].body.as_ref().unwrap()["action"];
        assert_eq!(action["numResourceA"], json!(10));
        assert_eq!(action["numResourceB"], json!(1));
        assert_eq!(action["processDelay"], json!(2.0));
        assert_eq!(action["conveyorSpeed"], json!(1.0));
    }

    #[tokio::test]
    async fn test_without_auto_wait_status_is_polled() {
        let server = MockServer::start().await;
        let sim = connect(
            &server,
            SimOptions {
                auto_wait: false,
                ..Default::default()
            },
        )
        .await;
        sim.reset(Map::new()).await.unwrap();
        assert!(server.calls_to("GET", "/engine/lock").is_empty());
        assert_eq!(server.calls_to("GET", "/rl").len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_reset_is_an_error() {
        let server = MockServer::start_with(MockBehavior {
            reject_reset: true,
            ..Default::default()
        })
        .await;
        let sim = connect(&server, SimOptions::default()).await;
        let err = sim.reset(Map::new()).await.unwrap_err();
        let model_err = err.downcast_ref::<ModelError>().unwrap();
        assert_eq!(model_err.status_code, Some(409));
    }

    #[tokio::test]
    async fn test_lock_timeout_carries_status() {
        let server = MockServer::start_with(MockBehavior {
            lock_times_out: true,
            ..Default::default()
        })
        .await;
        let sim = connect(&server, SimOptions::default()).await;
        let err = sim
            .lock(EngineState::FINISHED, Duration::from_secs(1))
            .await
            .unwrap_err();
        let timeout = err.downcast_ref::<LockTimeout>().unwrap();
        assert_eq!(timeout.wanted, "FINISHED");
        assert_eq!(timeout.status.state(), EngineState::IDLE);
    }

    #[tokio::test]
    async fn test_outputs_default_to_all_schema_outputs() {
        let server = MockServer::start().await;
        let sim = connect(&server, SimOptions::default()).await;
        let outputs = sim.outputs(None).await.unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["totalProcessed"].as_f64(), Some(12.0));
        match &outputs["costPerProduct"] {
            OutputValue::StatisticsDiscrete(s) => assert!(s.max.is_infinite()),
            other => panic!("Expected StatisticsDiscrete, got {:?}", other),
        }

        let only = sim.outputs(Some(&["totalProcessed".to_string()])).await.unwrap();
        assert_eq!(only.len(), 1);
    }

    #[tokio::test]
    async fn test_engine_status_and_close() {
        let server = MockServer::start().await;
        let sim = connect(&server, SimOptions::default()).await;
        let engine = sim.engine_status().await.unwrap();
        assert_eq!(engine.event_count, Some(1200));
        let settings = engine.settings.unwrap();
        assert_eq!(settings.stop_time, Some(4320.0));
        assert_eq!(settings.start_date, Some(EngineDate::Millis(START_DATE_MILLIS)));

        sim.close().await;
        assert_eq!(server.calls_to("DELETE", "/").len(), 1);
    }

    #[tokio::test]
    async fn test_launch_with_missing_model_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let result = AnyLogicSim::launch(
            dir.path().join("ModelExported/model.jar"),
            SimOptions::default(),
            &SimConfig::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
