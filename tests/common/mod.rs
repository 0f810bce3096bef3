//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hotvisor::config::MergedConfig;
use hotvisor::engine::{BuildError, CloseError, Server, ServerBuilder, StartError};
use uuid::Uuid;

pub type Journal = Arc<Mutex<Vec<String>>>;

/// Write `contents` to `dir/name` and return the path.
pub fn write_config(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Builder recording every lifecycle call as `"<op> x=<value of x>"`.
///
/// A config with `"fail": "build"` fails to build.
#[derive(Clone, Default)]
pub struct RecordingBuilder {
    pub journal: Journal,
}

impl RecordingBuilder {
    pub fn entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Poll until `entry` shows up in the journal.
    pub async fn wait_for(&self, entry: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.position(entry).is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl ServerBuilder for RecordingBuilder {
    fn build(&self, config: &MergedConfig) -> Result<Box<dyn Server>, BuildError> {
        let value = config.as_value();
        let label = format!("x={}", value["x"]);
        if value["fail"] == "build" {
            return Err(BuildError::Other("scripted build failure".into()));
        }
        self.journal.lock().unwrap().push(format!("build {}", label));
        Ok(Box::new(RecordingServer {
            id: Uuid::new_v4(),
            label,
            journal: self.journal.clone(),
        }))
    }
}

pub struct RecordingServer {
    id: Uuid,
    label: String,
    journal: Journal,
}

#[async_trait]
impl Server for RecordingServer {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    async fn start(&mut self) -> Result<(), StartError> {
        self.journal.lock().unwrap().push(format!("start {}", self.label));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        self.journal.lock().unwrap().push(format!("close {}", self.label));
        Ok(())
    }
}
