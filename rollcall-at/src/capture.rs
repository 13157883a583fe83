//! Biometric descriptor capture
//!
//! A capture collects one descriptor per pose (straight, left, right) and
//! reduces them to their component-wise mean. Capture is slow and waits on
//! the person in front of the camera, so services always run it before
//! taking the record store write lock.

use async_trait::async_trait;
use rollcall_common::config::CaptureConfig;
use rollcall_common::Descriptor;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Why no usable descriptor was obtained
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture device configured")]
    Unavailable,

    #[error("capture timed out after {0:?}")]
    Timeout(Duration),

    #[error("capture device failed: {0}")]
    Device(String),

    #[error("no face detected in any pose")]
    NoFace,

    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

/// Source of facial descriptors
#[async_trait]
pub trait DescriptorCapture: Send + Sync {
    async fn capture(&self) -> Result<Descriptor, CaptureError>;
}

/// Mean of the captured poses; zero poses means no face was seen
pub fn combine_poses(poses: &[Descriptor]) -> Result<Descriptor, CaptureError> {
    Descriptor::mean(poses).ok_or(CaptureError::NoFace)
}

/// Build the capture source named by configuration
pub fn from_config(config: &CaptureConfig) -> Arc<dyn DescriptorCapture> {
    match &config.command {
        Some(command) => match CommandCapture::new(command.clone(), config.timeout()) {
            Some(capture) => {
                info!(program = %command[0], "Using external capture program");
                Arc::new(capture)
            }
            None => Arc::new(UnavailableCapture),
        },
        None => {
            info!("No capture program configured; requests must carry a descriptor");
            Arc::new(UnavailableCapture)
        }
    }
}

// ========================================
// External capture program
// ========================================

/// Runs a capture program that prints one pose descriptor per line
///
/// Lines that do not parse as a descriptor (prompts, progress messages) are
/// skipped.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandCapture {
    /// `None` if `command` is empty
    pub fn new(command: Vec<String>, timeout: Duration) -> Option<Self> {
        let mut parts = command.into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn run(&self) -> Result<String, CaptureError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Device(format!("failed to launch {}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CaptureError::Timeout(self.timeout))?
            .map_err(|e| CaptureError::Device(e.to_string()))?;

        if !output.status.success() {
            return Err(CaptureError::Device(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse every descriptor line of capture output, skipping the rest
pub fn parse_poses(output: &str) -> Vec<Descriptor> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match Descriptor::parse_delimited(line) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!(line, error = %e, "Skipping non-descriptor capture output");
                None
            }
        })
        .collect()
}

#[async_trait]
impl DescriptorCapture for CommandCapture {
    async fn capture(&self) -> Result<Descriptor, CaptureError> {
        let output = self.run().await?;
        let poses = parse_poses(&output);
        debug!(poses = poses.len(), "Capture program finished");
        combine_poses(&poses)
    }
}

// ========================================
// Pre-recorded captures
// ========================================

/// FIFO of pre-recorded pose sets, one set consumed per capture
#[derive(Debug, Default)]
pub struct QueuedCapture {
    queue: Mutex<VecDeque<Vec<Descriptor>>>,
}

impl QueuedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a capture consisting of a single pose
    pub async fn push(&self, descriptor: Descriptor) {
        self.push_poses(vec![descriptor]).await;
    }

    pub async fn push_poses(&self, poses: Vec<Descriptor>) {
        self.queue.lock().await.push_back(poses);
    }

    pub async fn remaining(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl DescriptorCapture for QueuedCapture {
    async fn capture(&self) -> Result<Descriptor, CaptureError> {
        let poses = self
            .queue
            .lock()
            .await
            .pop_front()
            .ok_or(CaptureError::Unavailable)?;
        combine_poses(&poses)
    }
}

/// Capture source for deployments without a camera
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCapture;

#[async_trait]
impl DescriptorCapture for UnavailableCapture {
    async fn capture(&self) -> Result<Descriptor, CaptureError> {
        Err(CaptureError::Unavailable)
    }
}
