//! Registration and heartbeating of one ring member.
//!
//! Every write goes through a CAS loop over the whole ring value, and each
//! lifecycler only edits its own entry, except when it forgets members whose
//! heartbeat is older than the forget period. Writes of one lifecycler are
//! serialized, so a state change is never overwritten by an older heartbeat.

use std::collections::HashSet;
use std::sync::Arc;

use corelib::token::generate_tokens;
use corelib::{unix_now, InstanceDesc, InstanceState, RingDesc};
use kv::{cas_loop, KvClient};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LifecyclerConfig;
use crate::delegate::FlushTransferer;
use crate::error::{Error, Result};

/// What this instance believes about itself. The ring entry is rewritten
/// from it on every heartbeat.
#[derive(Clone, Debug)]
struct LocalState {
    state: InstanceState,
    tokens: Vec<u32>,
    registered_timestamp: i64,
}

pub struct Lifecycler {
    config: LifecyclerConfig,
    client: Arc<dyn KvClient>,
    delegate: Arc<dyn FlushTransferer>,
    local: Mutex<LocalState>,
    write_lock: tokio::sync::Mutex<()>,
    heartbeat_loop: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Lifecycler {
    pub fn new(
        config: LifecyclerConfig,
        client: Arc<dyn KvClient>,
        delegate: Arc<dyn FlushTransferer>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            delegate,
            local: Mutex::new(LocalState {
                state: InstanceState::Joining,
                tokens: Vec::new(),
                registered_timestamp: 0,
            }),
            write_lock: tokio::sync::Mutex::new(()),
            heartbeat_loop: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &LifecyclerConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        self.local.lock().state
    }

    pub fn tokens(&self) -> Vec<u32> {
        self.local.lock().tokens.clone()
    }

    /// Register as JOINING, then switch to ACTIVE.
    ///
    /// Tokens of an earlier registration under the same id are kept, as long
    /// as no other member took them in the meantime.
    pub async fn join(&self) -> Result<()> {
        let id = self.config.id.clone();
        let num_tokens = self.config.num_tokens;
        let now = unix_now();

        let guard = self.write_lock.lock().await;
        let written = cas_loop::<RingDesc, _>(
            self.client.as_ref(),
            self.config.codec,
            &self.config.ring_key,
            &self.config.backoff,
            |desc| {
                let mut desc = desc.unwrap_or_default();
                let previous = desc.remove_instance(&id);
                let taken = desc.taken_tokens();

                let mut tokens: Vec<u32> = previous
                    .as_ref()
                    .map(|p| p.tokens.iter().copied().filter(|t| !taken.contains(t)).collect())
                    .unwrap_or_default();
                tokens.truncate(num_tokens);
                if tokens.len() < num_tokens {
                    let mut avoid: HashSet<u32> = taken;
                    avoid.extend(tokens.iter().copied());
                    tokens.extend(generate_tokens(&mut rand::thread_rng(), num_tokens - tokens.len(), &avoid));
                }

                let mut instance = InstanceDesc::new(
                    id.as_str(),
                    self.config.addr.as_str(),
                    self.config.zone.as_str(),
                    tokens,
                    InstanceState::Joining,
                    now,
                );
                if let Some(previous) = previous {
                    instance.registered_timestamp = previous.registered_timestamp;
                }
                desc.add_instance(instance);
                Some(desc)
            },
        )
        .await?;

        let registered = written
            .as_ref()
            .and_then(|desc| desc.instance(&id))
            .ok_or_else(|| Error::NotRegistered(id.clone()))?;
        *self.local.lock() = LocalState {
            state: InstanceState::Joining,
            tokens: registered.tokens.clone(),
            registered_timestamp: registered.registered_timestamp,
        };
        drop(guard);
        info!(instance_id = %id, tokens = registered.tokens.len(), "Instance registered in the ring");

        self.change_state(InstanceState::Active).await
    }

    /// Write our entry once: refresh the timestamp, resolve token collisions
    /// and forget dead members.
    pub async fn heartbeat(&self) -> Result<()> {
        let result = self.write_heartbeat().await;
        match &result {
            Ok(()) => metrics::counter!("lifecycler_heartbeats_total").increment(1),
            Err(_) => metrics::counter!("lifecycler_heartbeat_failures_total").increment(1),
        }
        result
    }

    async fn write_heartbeat(&self) -> Result<()> {
        let id = self.config.id.clone();
        let forget_period = self.config.forget_period;
        let now = unix_now();
        let mut forgotten = Vec::new();

        let _guard = self.write_lock.lock().await;
        let written = cas_loop::<RingDesc, _>(
            self.client.as_ref(),
            self.config.codec,
            &self.config.ring_key,
            &self.config.backoff,
            |desc| {
                let mut desc = desc.unwrap_or_default();
                let local = self.local.lock().clone();
                let mut instance = InstanceDesc::new(
                    id.as_str(),
                    self.config.addr.as_str(),
                    self.config.zone.as_str(),
                    local.tokens,
                    local.state,
                    now,
                );
                instance.registered_timestamp = local.registered_timestamp;
                desc.add_instance(instance);

                let replaced = desc.resolve_token_conflicts(&id, &mut rand::thread_rng());
                if replaced > 0 {
                    debug!(instance_id = %id, replaced, "Regenerated conflicting tokens");
                }
                forgotten = if forget_period.is_zero() {
                    Vec::new()
                } else {
                    desc.forget_stale(now, forget_period, &id)
                };
                Some(desc)
            },
        )
        .await?;

        let own = written
            .as_ref()
            .and_then(|desc| desc.instance(&id))
            .ok_or_else(|| Error::NotRegistered(id.clone()))?;
        self.local.lock().tokens = own.tokens.clone();

        for member in &forgotten {
            info!(instance_id = %id, forgotten = %member, "Forgot member with expired heartbeat");
        }
        metrics::counter!("lifecycler_forgotten_members_total").increment(forgotten.len() as u64);
        Ok(())
    }

    /// Move to `to` and persist it. Staying in the current state is a no-op.
    pub async fn change_state(&self, to: InstanceState) -> Result<()> {
        let from = {
            let mut local = self.local.lock();
            let from = local.state;
            if from == to {
                return Ok(());
            }
            if !from.can_transition_to(to) {
                return Err(corelib::Error::InvalidStateTransition { from, to }.into());
            }
            local.state = to;
            from
        };

        if let Err(e) = self.heartbeat().await {
            self.local.lock().state = from;
            return Err(e);
        }
        info!(instance_id = %self.config.id, from = ?from, to = ?to, "Instance state changed");
        Ok(())
    }

    /// Spawn the periodic heartbeat. Failures are logged and retried on the
    /// next tick. Starting again replaces a running loop.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.heartbeat_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(instance_id = %this.config.id, "Heartbeat loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = this.heartbeat().await {
                            warn!(instance_id = %this.config.id, error = %e, "Heartbeat failed");
                        }
                    }
                }
            }
        });

        if let Some((previous, previous_handle)) = self.heartbeat_loop.lock().replace((token, handle)) {
            previous.cancel();
            previous_handle.abort();
        }
    }

    /// Stop the heartbeat loop and wait for it to exit. The loop can be
    /// started again afterwards.
    pub async fn stop(&self) {
        let running = self.heartbeat_loop.lock().take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    /// Leave the ring: LEAVING, hand off or flush data, LEFT, then stop
    /// heartbeating and optionally remove our entry.
    pub async fn leave(&self) -> Result<()> {
        if matches!(self.state(), InstanceState::Joining | InstanceState::Active) {
            self.change_state(InstanceState::Leaving).await?;
        }

        match self.delegate.transfer_out().await {
            Ok(()) => info!(instance_id = %self.config.id, "Transferred data out"),
            Err(e) => {
                warn!(instance_id = %self.config.id, error = %e, "Transfer failed, flushing instead");
                if let Err(e) = self.delegate.flush().await {
                    warn!(instance_id = %self.config.id, error = %e, "Flush failed");
                }
            }
        }

        self.change_state(InstanceState::Left).await?;
        self.stop().await;

        if self.config.unregister_on_shutdown {
            self.unregister().await?;
        }
        Ok(())
    }

    async fn unregister(&self) -> Result<()> {
        let id = self.config.id.as_str();
        let _guard = self.write_lock.lock().await;
        cas_loop::<RingDesc, _>(
            self.client.as_ref(),
            self.config.codec,
            &self.config.ring_key,
            &self.config.backoff,
            |desc| {
                let mut desc = desc?;
                desc.remove_instance(id)?;
                Some(desc)
            },
        )
        .await?;
        info!(instance_id = %id, "Instance removed from the ring");
        Ok(())
    }
}
