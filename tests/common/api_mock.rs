#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::{Value, json};

use qr_connect::api::{ApiError, ConnectionState, CreatedInstance, InstanceApi, QrPayload};

/// Scripted pairing outcome, consumed one per attempt. An empty script
/// keeps yielding empty codes.
pub enum PairOutcome {
    Code(&'static str),
    Empty,
    Error(&'static str),
}

/// Scripted status outcome, consumed one per query. An empty script repeats
/// the last observed state.
pub enum StatusOutcome {
    State(ConnectionState),
    Error(&'static str),
}

/// Scripted in-memory gateway used by the engine, poller, and wizard tests.
#[derive(Default)]
pub struct ScriptedApi {
    create_token: Mutex<String>,
    qr: Mutex<QrPayload>,
    pair_script: Mutex<VecDeque<PairOutcome>>,
    pub pair_attempts: Mutex<Vec<String>>,
    status_script: Mutex<VecDeque<StatusOutcome>>,
    last_status: Mutex<Option<ConnectionState>>,
    pub status_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        let api = Self::default();
        *api.create_token.lock().unwrap() = "tok-test".to_owned();
        api
    }

    pub fn with_create_token(self, token: &str) -> Self {
        *self.create_token.lock().unwrap() = token.to_owned();
        self
    }

    pub fn with_qr(self, qr_base64: &str, code: &str) -> Self {
        *self.qr.lock().unwrap() = QrPayload {
            qr_base64: qr_base64.to_owned(),
            code: code.to_owned(),
        };
        self
    }

    pub fn push_pair(&self, outcome: PairOutcome) {
        self.pair_script.lock().unwrap().push_back(outcome);
    }

    pub fn push_status(&self, outcome: StatusOutcome) {
        self.status_script.lock().unwrap().push_back(outcome);
    }

    pub fn pair_attempt_count(&self) -> usize {
        self.pair_attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl InstanceApi for ScriptedApi {
    async fn create_instance(&self, _name: &str) -> Result<CreatedInstance, ApiError> {
        Ok(CreatedInstance {
            token: self.create_token.lock().unwrap().clone(),
        })
    }

    async fn connection_status(&self, _token: &str) -> Result<ConnectionState, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        match self.status_script.lock().unwrap().pop_front() {
            Some(StatusOutcome::State(state)) => {
                *self.last_status.lock().unwrap() = Some(state);
                Ok(state)
            }
            Some(StatusOutcome::Error(message)) => Err(ApiError::Status {
                status: 500,
                message: message.to_owned(),
            }),
            None => Ok(self
                .last_status
                .lock()
                .unwrap()
                .unwrap_or(ConnectionState::Disconnected)),
        }
    }

    async fn fetch_qr(&self, _token: &str) -> Result<QrPayload, ApiError> {
        Ok(self.qr.lock().unwrap().clone())
    }

    async fn pair_phone(&self, _token: &str, phone: &str) -> Result<Value, ApiError> {
        self.pair_attempts.lock().unwrap().push(phone.to_owned());

        match self.pair_script.lock().unwrap().pop_front() {
            Some(PairOutcome::Code(code)) => Ok(json!({ "data": { "PairingCode": code } })),
            Some(PairOutcome::Empty) | None => Ok(json!({ "data": { "PairingCode": "" } })),
            Some(PairOutcome::Error(message)) => Err(ApiError::Status {
                status: 500,
                message: message.to_owned(),
            }),
        }
    }

    async fn disconnect(&self, _token: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn logout(&self, _token: &str) -> Result<(), ApiError> {
        Ok(())
    }
}
