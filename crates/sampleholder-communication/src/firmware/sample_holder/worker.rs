//! Async handle to a controller running on its own thread
//!
//! The controller does blocking serial I/O, so it lives on a dedicated
//! thread and receives jobs over a channel. Jobs run one at a time in the
//! order they were sent, which keeps a single request in flight on the wire.

use super::controller::{HolderStatus, SampleHolderController, SprSource};
use sampleholder_core::{Error, EventDispatcher, HolderEvent, Result};
use std::thread;
use tokio::sync::{broadcast, mpsc, oneshot};

type Job = Box<dyn FnOnce(&mut SampleHolderController) + Send>;

/// Cloneable async handle to a [`SampleHolderController`]
#[derive(Clone)]
pub struct HolderHandle {
    jobs: mpsc::UnboundedSender<Job>,
    events: EventDispatcher,
}

impl HolderHandle {
    /// Move `controller` onto a worker thread
    ///
    /// The thread exits once every handle has been dropped.
    pub fn spawn(mut controller: SampleHolderController) -> Result<Self> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let events = controller.events().clone();

        thread::Builder::new()
            .name("sample-holder".to_string())
            .spawn(move || {
                tracing::debug!("Sample holder worker started");
                while let Some(job) = rx.blocking_recv() {
                    job(&mut controller);
                }
                if controller.is_connected() {
                    if let Err(e) = controller.disconnect() {
                        tracing::warn!("Disconnect on worker shutdown failed: {}", e);
                    }
                }
                tracing::debug!("Sample holder worker stopped");
            })?;

        Ok(Self { jobs, events })
    }

    /// Run `f` on the worker thread and wait for its result
    pub async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SampleHolderController) -> Result<T> + Send + 'static,
    {
        let (reply, done) = oneshot::channel();
        let job: Job = Box::new(move |controller| {
            let _ = reply.send(f(controller));
        });

        self.jobs
            .send(job)
            .map_err(|_| Error::other("sample holder worker stopped"))?;
        done.await
            .map_err(|_| Error::other("sample holder worker stopped"))?
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<HolderEvent> {
        self.events.subscribe()
    }

    /// See [`SampleHolderController::connect`]
    pub async fn connect(&self) -> Result<SprSource> {
        self.call(|c| c.connect()).await
    }

    /// Close the port and forget the position model
    pub async fn disconnect(&self) -> Result<()> {
        self.call(|c| c.disconnect()).await
    }

    /// Enable the motor and read its position
    pub async fn enable(&self) -> Result<()> {
        self.call(|c| c.enable()).await
    }

    /// Disable the motor
    pub async fn disable(&self) -> Result<()> {
        self.call(|c| c.disable()).await
    }

    /// Run the homing cycle
    pub async fn home(&self) -> Result<()> {
        self.call(|c| c.home()).await
    }

    /// Ask the firmware whether the motor is enabled
    pub async fn is_enabled(&self) -> Result<bool> {
        self.call(|c| c.is_enabled()).await
    }

    /// Move by raw motor steps
    pub async fn move_steps(&self, steps: i64) -> Result<()> {
        self.call(move |c| c.move_steps(steps)).await
    }

    /// Move by sample widths, returning the motor steps taken
    pub async fn step(&self, num: i64) -> Result<i64> {
        self.call(move |c| c.step(num)).await
    }

    /// Go to a sample the short way round
    pub async fn goto(&self, num: i64) -> Result<i64> {
        self.call(move |c| c.goto(num)).await
    }

    /// Shift the firmware home reference
    pub async fn offset(&self, num: i64) -> Result<()> {
        self.call(move |c| c.offset(num)).await
    }

    /// Hop between occupied samples
    pub async fn step_occupied(&self, occupied: Vec<u32>, hops: i64) -> Result<Option<u32>> {
        self.call(move |c| c.step_occupied(&occupied, hops)).await
    }

    /// Status snapshot
    pub async fn status(&self) -> Result<HolderStatus> {
        self.call(|c| Ok(c.status())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::sample_holder::{HolderConfig, SimulatedHolder, SimulatorState};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    fn handle() -> (HolderHandle, Arc<Mutex<SimulatorState>>) {
        let sim = SimulatedHolder::new();
        let state = sim.state();
        let config = HolderConfig {
            settle_delay: Duration::ZERO,
            ..HolderConfig::new("sim")
        };
        let controller = SampleHolderController::new(config, Box::new(sim)).unwrap();
        (HolderHandle::spawn(controller).unwrap(), state)
    }

    #[tokio::test]
    async fn test_handle_runs_jobs_in_order() {
        let (handle, state) = handle();
        let source = handle.connect().await.unwrap();
        assert_eq!(source, SprSource::Queried { spr: 200 });

        handle.enable().await.unwrap();
        assert_eq!(handle.goto(3).await.unwrap(), 3);

        let status = handle.status().await.unwrap();
        assert_eq!(status.position, Some(60));
        assert_eq!(status.sample, Some(3));
        assert_eq!(state.lock().received.last().unwrap(), "run[ move, 60 ]");
    }

    #[tokio::test]
    async fn test_clones_share_one_controller() {
        let (handle, _) = handle();
        let other = handle.clone();
        handle.connect().await.unwrap();
        other.enable().await.unwrap();
        assert!(handle.is_enabled().await.unwrap());

        let mut events = handle.subscribe();
        other.home().await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            HolderEvent::PositionChanged {
                position: 0,
                sample: 0
            }
        );
    }

    #[tokio::test]
    async fn test_errors_cross_the_thread() {
        let (handle, _) = handle();
        let err = handle.goto(2).await.unwrap_err();
        assert!(err.is_controller_error());
    }
}
