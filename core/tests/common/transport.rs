// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory transport with scripted failures.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use calsync_core::{CreatedResource, RemoteError, Transport};

/// A recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create {
        calendar_url: String,
        uid: String,
        payload: String,
    },
    Update {
        url: String,
        etag: String,
        payload: String,
    },
    Delete {
        url: String,
        etag: Option<String>,
    },
}

impl Call {
    pub fn payload(&self) -> Option<&str> {
        match self {
            Call::Create { payload, .. } | Call::Update { payload, .. } => Some(payload),
            Call::Delete { .. } => None,
        }
    }
}

/// Succeeds by default, handing out `"v1"`, `"v2"`, ... as version tokens.
/// Scripted results are consumed by the next calls, in order.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Option<RemoteError>>>,
    calls: Mutex<Vec<Call>>,
    versions: Mutex<u32>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call fail with `err`.
    pub fn fail_next(&self, err: RemoteError) {
        self.script.lock().unwrap().push_back(Some(err));
    }

    /// Lets the next call through, so a later one can be made to fail.
    pub fn pass_next(&self) {
        self.script.lock().unwrap().push_back(None);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn next_version(&self) -> String {
        let mut versions = self.versions.lock().unwrap();
        *versions += 1;
        format!("\"v{}\"", *versions)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn create_event(
        &self,
        calendar_url: &str,
        uid: &str,
        payload: String,
    ) -> Result<CreatedResource, RemoteError> {
        self.record(Call::Create {
            calendar_url: calendar_url.to_string(),
            uid: uid.to_string(),
            payload,
        })?;
        Ok(CreatedResource {
            location: format!("{calendar_url}{uid}.ics"),
            etag: self.next_version(),
        })
    }

    async fn update_event(
        &self,
        url: &str,
        payload: String,
        etag: &str,
    ) -> Result<String, RemoteError> {
        self.record(Call::Update {
            url: url.to_string(),
            etag: etag.to_string(),
            payload,
        })?;
        Ok(self.next_version())
    }

    async fn delete_event(&self, url: &str, etag: Option<&str>) -> Result<(), RemoteError> {
        self.record(Call::Delete {
            url: url.to_string(),
            etag: etag.map(ToString::to_string),
        })
    }
}
