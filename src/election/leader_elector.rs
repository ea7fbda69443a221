use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::sleep_until;
use tokio::time::timeout;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::LeaseStore;
use super::LeaseToken;
use crate::metrics::IS_LEADER_METRIC;
use crate::ElectionConfig;
use crate::MaintenanceTask;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionState {
    Follower,
    /// Acquisition request in flight
    Candidate,
    Leader {
        epoch: u64,
    },
}

impl ElectionState {
    pub fn is_leader(&self) -> bool {
        matches!(self, ElectionState::Leader { .. })
    }
}

/// Why leadership ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepDown {
    Shutdown,
    LeaseLost,
    RenewFailed,
    DeadlinePassed,
}

/// Everything owned while leader
struct Leadership {
    token: LeaseToken,
    /// Local view of when the lease expires: start of the last successful
    /// acquire/renew request plus the TTL
    deadline: Instant,
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

/// Follower → Candidate → Leader state machine over a [`LeaseStore`].
///
/// While leader, every registered [`MaintenanceTask`] runs on its own tokio
/// task under a child of the leadership cancellation token.
pub struct LeaderElector {
    instance_id: String,
    config: ElectionConfig,
    lease_store: Arc<dyn LeaseStore>,
    tasks: Vec<Arc<dyn MaintenanceTask>>,
    state_tx: watch::Sender<ElectionState>,
}

impl LeaderElector {
    pub fn new(
        instance_id: impl Into<String>,
        config: ElectionConfig,
        lease_store: Arc<dyn LeaseStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ElectionState::Follower);
        Self {
            instance_id: instance_id.into(),
            config,
            lease_store,
            tasks: Vec::new(),
            state_tx,
        }
    }

    pub fn register_task(
        &mut self,
        task: Arc<dyn MaintenanceTask>,
    ) {
        debug!("registered maintenance task {}", task.name());
        self.tasks.push(task);
    }

    pub fn subscribe(&self) -> watch::Receiver<ElectionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ElectionState {
        *self.state_tx.borrow()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Competes for leadership until `shutdown_signal` changes (or its sender
    /// is dropped). A leader stops its tasks and releases the lease before
    /// returning.
    pub async fn run(
        &self,
        mut shutdown_signal: watch::Receiver<()>,
    ) -> Result<()> {
        info!("[{}] leader elector started", self.instance_id);
        let ttl = self.config.lease_ttl();
        let mut leadership: Option<Leadership> = None;

        loop {
            match leadership.take() {
                None => {
                    self.set_state(ElectionState::Candidate);
                    let started = Instant::now();
                    match self.lease_store.try_acquire(&self.config.lease_key, &self.instance_id, ttl).await {
                        Ok(Some(token)) => {
                            leadership = Some(self.become_leader(token, started + ttl));
                            continue;
                        }
                        Ok(None) => debug!("[{}] lease held by a peer", self.instance_id),
                        Err(e) => warn!("[{}] lease acquisition failed: {:?}", self.instance_id, e),
                    }
                    self.set_state(ElectionState::Follower);

                    let wait = self.follower_retry_delay();
                    tokio::select! {
                        biased;
                        _ = shutdown_signal.changed() => {
                            info!("[{}] shutdown signal received.", self.instance_id);
                            return Ok(());
                        }
                        _ = sleep(wait) => {}
                    }
                }
                Some(mut lead) => {
                    let next_renew = Instant::now() + self.config.renew_interval();
                    tokio::select! {
                        biased;
                        _ = shutdown_signal.changed() => {
                            info!("[{}] shutdown signal received.", self.instance_id);
                            self.step_down(lead, StepDown::Shutdown).await;
                            return Ok(());
                        }
                        _ = sleep_until(next_renew.min(lead.deadline)) => {}
                    }

                    let now = Instant::now();
                    if now >= lead.deadline {
                        self.step_down(lead, StepDown::DeadlinePassed).await;
                        continue;
                    }

                    // A renewal that outlives the current deadline proves nothing
                    let renew = timeout(lead.deadline - now, self.lease_store.renew(&lead.token, ttl)).await;
                    match renew {
                        Ok(Ok(true)) if Instant::now() < lead.deadline => {
                            lead.deadline = now + ttl;
                            leadership = Some(lead);
                        }
                        Ok(Ok(true)) | Err(_) => self.step_down(lead, StepDown::DeadlinePassed).await,
                        Ok(Ok(false)) => self.step_down(lead, StepDown::LeaseLost).await,
                        Ok(Err(e)) => {
                            warn!("[{}] lease renewal failed: {:?}", self.instance_id, e);
                            self.step_down(lead, StepDown::RenewFailed).await;
                        }
                    }
                }
            }
        }
    }

    fn become_leader(
        &self,
        token: LeaseToken,
        deadline: Instant,
    ) -> Leadership {
        info!(
            "[{}] became leader (lease {}, epoch {})",
            self.instance_id, token.key, token.epoch
        );
        let cancel = CancellationToken::new();
        let handles = self
            .tasks
            .iter()
            .map(|task| {
                let task = task.clone();
                let child = cancel.child_token();
                (task.name(), tokio::spawn(async move { task.run(child).await }))
            })
            .collect();

        self.set_state(ElectionState::Leader { epoch: token.epoch });
        IS_LEADER_METRIC.set(1);
        Leadership {
            token,
            deadline,
            cancel,
            handles,
        }
    }

    async fn step_down(
        &self,
        lead: Leadership,
        reason: StepDown,
    ) {
        warn!(
            "[{}] stepping down (epoch {}): {:?}",
            self.instance_id, lead.token.epoch, reason
        );
        lead.cancel.cancel();
        self.set_state(ElectionState::Follower);
        IS_LEADER_METRIC.set(0);

        let names: Vec<&'static str> = lead.handles.iter().map(|(name, _)| *name).collect();
        let aborts: Vec<_> = lead.handles.iter().map(|(_, h)| h.abort_handle()).collect();
        let joins = join_all(lead.handles.into_iter().map(|(_, h)| h));
        match timeout(self.config.stop_timeout(), joins).await {
            Ok(results) => {
                for (name, result) in names.iter().zip(results) {
                    if let Err(e) = result {
                        error!("maintenance task {} ended abnormally: {:?}", name, e);
                    }
                }
            }
            Err(_) => {
                error!(
                    "maintenance tasks {:?} did not stop within {:?}, aborting",
                    names,
                    self.config.stop_timeout()
                );
                aborts.iter().for_each(|a| a.abort());
            }
        }

        if reason == StepDown::Shutdown {
            if let Err(e) = self.lease_store.release(&lead.token).await {
                warn!("[{}] lease release failed: {:?}", self.instance_id, e);
            }
        }
    }

    fn set_state(
        &self,
        state: ElectionState,
    ) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!("[{}] {:?} -> {:?}", self.instance_id, current, state);
                *current = state;
                true
            }
        });
    }

    fn follower_retry_delay(&self) -> Duration {
        let jitter = if self.config.retry_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.config.retry_jitter_ms)
        };
        Duration::from_millis(self.config.retry_interval_ms + jitter)
    }
}
