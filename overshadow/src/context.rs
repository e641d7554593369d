//! Shared engine context and worker thread management

use crate::config::{OvershadowConfig, ScheduleParams};
use crate::scheduler::{InjectorStats, OvershadowScheduler};
use crate::sensing::{SensingLoop, SensingStats};
use crate::timing::TimingStore;
use crate::OvershadowError;
use common::types::CellParams;
use common::ShutdownToken;
use interfaces::{RadioReceiver, RadioTransmitter};
use phy::{BroadcastSynthesizer, DownlinkSync};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

/// Everything both worker threads share
#[derive(Debug)]
pub struct OvershadowContext {
    pub config: OvershadowConfig,
    /// Resolved mode preset plus overrides
    pub schedule: ScheduleParams,
    /// Cell the sensing loop starts from
    pub initial_cell: CellParams,
    pub timing: TimingStore,
    pub shutdown: ShutdownToken,
}

impl OvershadowContext {
    /// Validate `config` and build a context around it
    pub fn new(config: OvershadowConfig) -> Result<Arc<Self>, OvershadowError> {
        Self::with_shutdown(config, ShutdownToken::new())
    }

    /// Same as [`OvershadowContext::new`] with an externally owned token
    pub fn with_shutdown(config: OvershadowConfig, shutdown: ShutdownToken) -> Result<Arc<Self>, OvershadowError> {
        config.validate()?;
        let initial_cell = config.cell_params()?;
        let schedule = config.sync.schedule();
        Ok(Arc::new(Self {
            timing: TimingStore::new(initial_cell),
            config,
            schedule,
            initial_cell,
            shutdown,
        }))
    }

    /// Start the sensing and scheduler threads
    pub fn spawn<R, P, T, S>(
        self: &Arc<Self>,
        rx: R,
        rx_phy: P,
        tx: T,
        tx_phy: S,
    ) -> Result<Workers, OvershadowError>
    where
        R: RadioReceiver + 'static,
        P: DownlinkSync + 'static,
        T: RadioTransmitter + 'static,
        S: BroadcastSynthesizer + 'static,
    {
        // Subscribe before the sensing loop can publish anything
        let scheduler = OvershadowScheduler::new(self.clone(), tx, tx_phy);
        let sensing = SensingLoop::new(self.clone(), rx, rx_phy);

        let scheduler = std::thread::Builder::new()
            .name("overshadow-tx".to_string())
            .spawn(move || scheduler.run())?;
        let sensing = match std::thread::Builder::new()
            .name("overshadow-rx".to_string())
            .spawn(move || sensing.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shutdown.cancel();
                let _ = scheduler.join();
                return Err(e.into());
            }
        };

        info!("Worker threads started ({} mode)", self.config.sync.mode);
        Ok(Workers { sensing, scheduler })
    }
}

/// Handles of the two running worker threads
pub struct Workers {
    sensing: JoinHandle<Result<SensingStats, OvershadowError>>,
    scheduler: JoinHandle<Result<InjectorStats, OvershadowError>>,
}

impl Workers {
    /// Whether both threads have returned
    pub fn is_finished(&self) -> bool {
        self.sensing.is_finished() && self.scheduler.is_finished()
    }

    /// Wait for both threads; the first error wins
    pub fn join(self) -> Result<(SensingStats, InjectorStats), OvershadowError> {
        let sensing = join_worker("overshadow-rx", self.sensing);
        let scheduler = join_worker("overshadow-tx", self.scheduler);
        Ok((sensing?, scheduler?))
    }
}

fn join_worker<T>(
    name: &str,
    handle: JoinHandle<Result<T, OvershadowError>>,
) -> Result<T, OvershadowError> {
    match handle.join() {
        Ok(result) => {
            if let Err(e) = &result {
                error!("Worker {} stopped with error: {}", name, e);
            }
            result
        }
        Err(_) => Err(OvershadowError::WorkerPanicked(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_rejects_invalid_config() {
        let mut config = OvershadowConfig::default();
        config.cell.nof_prb = 7;
        assert!(matches!(
            OvershadowContext::new(config),
            Err(OvershadowError::Config(_))
        ));
    }

    #[test]
    fn test_context_resolves_schedule() {
        let mut config = OvershadowConfig::default();
        config.sync.target_frame_advance = Some(2);
        let ctx = OvershadowContext::new(config).unwrap();
        assert_eq!(ctx.schedule.target_frame_advance, 2);
        assert_eq!(ctx.schedule.action_phase, 0);
        assert_eq!(ctx.initial_cell.nof_prb.count(), 25);
        assert!(!ctx.timing.snapshot().cell_acquired);
        assert!(!ctx.shutdown.is_cancelled());
    }
}
