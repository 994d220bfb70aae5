use crate::engine::{EngineError, EngineHandle};
use gatewatch_core::{Encoding, Intent};
use zbus::interface;

/// D-Bus interface for the Gatewatch access daemon.
///
/// Bus name: org.gatewatch.Access1
/// Object path: /org/gatewatch/Access1
pub struct AccessService {
    engine: EngineHandle,
}

impl AccessService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

fn failed(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.gatewatch.Access1")]
impl AccessService {
    /// Set the pending operator intent (`none`, `entry` or `exit`).
    /// Returns the intent that was pending before.
    async fn set_intent(&self, intent: &str) -> zbus::fdo::Result<String> {
        let intent: Intent = intent.parse().map_err(zbus::fdo::Error::InvalidArgs)?;
        tracing::info!(%intent, "set_intent requested");
        let previous = self.engine.set_intent(intent).await.map_err(failed)?;
        Ok(previous.to_string())
    }

    /// Run one detection cycle over the face encodings seen in a frame.
    /// Returns the cycle outcome as JSON.
    async fn submit(&self, faces: Vec<Vec<f64>>) -> zbus::fdo::Result<String> {
        tracing::debug!(faces = faces.len(), "submit requested");
        let probes = faces
            .into_iter()
            .map(|values| Encoding::new(values.into_iter().map(|v| v as f32).collect()))
            .collect();
        let outcome = self.engine.submit(probes).await.map_err(failed)?;
        to_json(&outcome)
    }

    /// Run one cycle for a single candidate already resolved by an external
    /// matcher. The daemon's threshold still applies.
    async fn submit_match(&self, identity: &str, distance: f64) -> zbus::fdo::Result<String> {
        tracing::debug!(identity, distance, "submit_match requested");
        let outcome = self
            .engine
            .submit_match(identity.to_string(), distance as f32)
            .await
            .map_err(failed)?;
        to_json(&outcome)
    }

    /// Current inside/outside state for an identity, as JSON.
    async fn state(&self, identity: &str) -> zbus::fdo::Result<String> {
        let state = self
            .engine
            .state(identity.to_string())
            .await
            .map_err(failed)?;
        to_json(&state)
    }

    /// Return daemon status information.
    async fn info(&self) -> zbus::fdo::Result<String> {
        let info = self.engine.info().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "engine": info,
        })
        .to_string())
    }
}
