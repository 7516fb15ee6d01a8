use async_trait::async_trait;
use std::time::Duration;

use crate::swallow_panic;

/// A background job that runs forever, once per [`Worker::interval`]. A panicking run is
/// swallowed and the job is simply tried again on the next tick.
#[async_trait]
pub trait Worker: Send {
    async fn run(&mut self);
    fn interval(&self) -> Duration;
}

pub fn start<W: Worker + 'static>(mut worker: W) {
    tokio::spawn(async move {
        loop {
            swallow_panic(worker.run()).await;
            tokio::time::sleep(worker.interval()).await;
        }
    });
}
