//! In-process stand-in for the AlpyneServer used by the unit tests.
//!
//! Serves a small ABCA-like model: reset moves the engine to PAUSED, the
//! first action finishes the run. Every request is recorded so tests can
//! assert on what the client sent.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: &'static str,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Clone, Default)]
pub struct MockBehavior {
    /// Answer PUT /rl with 409 instead of 201
    pub reject_reset: bool,
    /// Answer lock requests with 408
    pub lock_times_out: bool,
    /// Report engine dates as epoch milliseconds
    pub numeric_dates: bool,
}

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    engine_state: Arc<Mutex<&'static str>>,
    behavior: MockBehavior,
}

impl MockState {
    fn record(&self, method: &'static str, path: &'static str, query: Option<String>, body: Option<Value>) {
        let query = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                method,
                path,
                query,
                body,
            });
        }
    }

    fn state(&self) -> &'static str {
        self.engine_state.lock().map(|s| *s).unwrap_or("ERROR")
    }

    fn set_state(&self, state: &'static str) {
        if let Ok(mut current) = self.engine_state.lock() {
            *current = state;
        }
    }

    fn status(&self) -> Value {
        let state = self.state();
        let (step, util) = match state {
            "FINISHED" => (1, 0.82),
            _ => (0, 0.0),
        };
        json!({
            "successful": true,
            "message": null,
            "observation": {"utilizationA": util, "queueLength": 0},
            "done": state == "FINISHED",
            "state": state,
            "sequenceId": step + 1,
            "episodeNum": 1,
            "stepNum": step
        })
    }
}

pub const START_DATE_MILLIS: i64 = 1_704_067_200_000;
pub const STOP_DATE_MILLIS: i64 = 1_704_427_200_000;

pub fn version_body() -> Value {
    json!({
        "inputs": [
            {"name": "arrivalRate", "type": "double", "value": 1.0, "units": "per day"}
        ],
        "outputs": [
            {"name": "costPerProduct", "type": "StatisticsDiscrete", "value": null},
            {"name": "totalProcessed", "type": "int", "value": 0}
        ],
        "engineSettings": [
            {"name": "units", "type": "TimeUnits", "value": "HOUR"},
            {"name": "startTime", "type": "double", "value": 0.0},
            {"name": "stopTime", "type": "double", "value": 100.0},
            {"name": "seed", "type": "long", "value": 0}
        ],
        "configuration": [
            {"name": "arrivalRate", "type": "double", "value": 0.5},
            {"name": "sizeBufferQueues", "type": "int", "value": 10}
        ],
        "observation": [
            {"name": "utilizationA", "type": "double", "value": 0.0},
            {"name": "queueLength", "type": "int", "value": 0}
        ],
        "action": [
            {"name": "numResourceA", "type": "int", "value": 1},
            {"name": "numResourceB", "type": "int", "value": 1},
            {"name": "processDelay", "type": "double", "value": 1.0},
            {"name": "conveyorSpeed", "type": "double", "value": 1.0}
        ]
    })
}

fn output_value(name: &str) -> Option<Value> {
    match name {
        "costPerProduct" => Some(json!({
            "count": 12, "mean": 41.5, "min": 30.0, "max": "Infinity",
            "deviation": 4.2, "confidence": "Infinity", "sum": 498.0
        })),
        "totalProcessed" => Some(json!(12)),
        _ => None,
    }
}

async fn version(State(state): State<MockState>) -> Json<Value> {
    state.record("GET", "/version", None, None);
    let mut body = version_body();
    if state.behavior.numeric_dates {
        if let Some(settings) = body["engineSettings"].as_array_mut() {
            settings.push(json!({"name": "startDate", "type": "Date", "value": START_DATE_MILLIS}));
            settings.push(json!({"name": "stopDate", "type": "Date", "value": STOP_DATE_MILLIS}));
        }
    }
    Json(body)
}

async fn get_rl(State(state): State<MockState>) -> Json<Value> {
    state.record("GET", "/rl", None, None);
    Json(state.status())
}

async fn put_rl(State(state): State<MockState>, Json(body): Json<Value>) -> StatusCode {
    state.record("PUT", "/rl", None, Some(body));
    if state.behavior.reject_reset {
        return StatusCode::CONFLICT;
    }
    state.set_state("PAUSED");
    StatusCode::CREATED
}

async fn patch_rl(State(state): State<MockState>, Json(body): Json<Value>) -> StatusCode {
    state.record("PATCH", "/rl", None, Some(body));
    state.set_state("FINISHED");
    StatusCode::ACCEPTED
}

async fn engine(State(state): State<MockState>) -> Json<Value> {
    state.record("GET", "/engine", None, None);
    Json(json!({
        "successful": true,
        "message": null,
        "state": state.state(),
        "time": 4320.0,
        "date": "2024-07-01T00:00:00.000",
        "eventCount": 1200,
        "stepCount": 1,
        "nextStepTime": null,
        "nextEventTime": null,
        "progress": 1.0,
        "settings": {
            "units": "HOUR", "startTime": 0.0, "startDate": START_DATE_MILLIS,
            "stopTime": 4320.0, "seed": 1
        }
    }))
}

async fn lock(State(state): State<MockState>, RawQuery(query): RawQuery) -> (StatusCode, Json<Value>) {
    state.record("GET", "/engine/lock", query, None);
    let code = if state.behavior.lock_times_out {
        StatusCode::REQUEST_TIMEOUT
    } else {
        StatusCode::OK
    };
    (code, Json(state.status()))
}

async fn outputs(State(state): State<MockState>, RawQuery(query): RawQuery) -> Json<Value> {
    state.record("GET", "/outputs", query.clone(), None);
    let mut body = serde_json::Map::new();
    for (key, name) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        if key == "names" {
            if let Some(value) = output_value(&name) {
                body.insert(name.into_owned(), value);
            }
        }
    }
    Json(Value::Object(body))
}

async fn quit(State(state): State<MockState>) -> StatusCode {
    state.record("DELETE", "/", None, None);
    StatusCode::OK
}

pub struct MockServer {
    url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::start_with(MockBehavior::default()).await
    }

    pub async fn start_with(behavior: MockBehavior) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            calls: Arc::clone(&calls),
            engine_state: Arc::new(Mutex::new("IDLE")),
            behavior,
        };

        let app = Router::new()
            .route("/", delete(quit))
            .route("/version", get(version))
            .route("/rl", get(get_rl).put(put_rl).patch(patch_rl))
            .route("/engine", get(engine))
            .route("/engine/lock", get(lock))
            .route("/outputs", get(outputs))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{}", addr),
            calls,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }
}
