//! In-memory stand-ins for `PortIngress`/`PortEgress`/`HwRegisterIo`,
//! used only by tests (the real sockets and registers are out of
//! scope).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::core::errors::RouterError;

use super::{HwRegisterIo, PortEgress, PortIngress};

/// Feeds `recv_frame` from a channel a test populates by hand.
pub struct LoopbackIngress {
    rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl LoopbackIngress {
    pub fn new() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx: AsyncMutex::new(rx) })
    }
}

#[async_trait]
impl PortIngress for LoopbackIngress {
    async fn recv_frame(&self) -> Result<Vec<u8>, RouterError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(RouterError::Malformed("loopback ingress closed"))
    }
}

/// Collects every frame `send_frame` is given, for assertions in tests.
#[derive(Default)]
pub struct LoopbackEgress {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl LoopbackEgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortEgress for LoopbackEgress {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), RouterError> {
        self.sent.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

/// Lets a test hold its own handle to the same egress double it hands
/// to `RouterState`, so it can inspect `sent_frames()` after dispatch.
#[async_trait]
impl PortEgress for std::sync::Arc<LoopbackEgress> {
    async fn send_frame(&self, frame: &[u8]) -> Result<(), RouterError> {
        (**self).send_frame(frame).await
    }
}

/// Flat word-addressed memory standing in for the hardware register file.
#[derive(Default)]
pub struct LoopbackRegisters {
    words: Mutex<HashMap<u32, u32>>,
}

impl LoopbackRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<u32, u32> {
        self.words.lock().unwrap().clone()
    }
}

#[async_trait]
impl HwRegisterIo for LoopbackRegisters {
    async fn read_word(&self, offset: u32) -> Result<u32, RouterError> {
        Ok(*self.words.lock().unwrap().get(&offset).unwrap_or(&0))
    }

    async fn write_word(&self, offset: u32, value: u32) -> Result<(), RouterError> {
        self.words.lock().unwrap().insert(offset, value);
        Ok(())
    }
}
