//! Limiter lifecycle and the tick loop.
//!
//! `Limiter` owns every piece of mutable state and the loop task. Start is
//! idempotent and schedules the first tick one normal interval out; Stop
//! cancels the task, waits for an in-flight tick to finish, and then
//! forces charging back on so a stopped limiter never leaves a battery
//! stuck below its cutoff.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::LimiterCfg;
use crate::error::PowerError;
use crate::limiter::band::ChargeBand;
use crate::limiter::decision::{self, ChargeReading, TickDelay};
use crate::limiter::gate::ChargeGate;
use crate::power::{ChargingSwitch, PowerRegistry};

/// Snapshot of limiter state, broadcast on a watch channel after every
/// tick and served as JSON over the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterStatus {
    pub running: bool,
    pub tick_count: u64,
    pub lower_threshold: u8,
    pub upper_threshold: u8,
    /// Last sampled inputs; `None` before the first tick and after a
    /// power-supply fault.
    pub reading: Option<ChargeReading>,
    pub charging_suppressed: bool,
    pub cutoff_pending: bool,
    pub last_delay_ms: u64,
    pub updated_at: DateTime<Utc>,
}

impl LimiterStatus {
    fn initial(band: &ChargeBand) -> Self {
        Self {
            running: false,
            tick_count: 0,
            lower_threshold: band.lower(),
            upper_threshold: band.upper(),
            reading: None,
            charging_suppressed: false,
            cutoff_pending: false,
            last_delay_ms: 0,
            updated_at: Utc::now(),
        }
    }
}

/// State a tick and a threshold write can both touch. One lock guards all
/// of it, so a parameter write never interleaves with a decision.
#[derive(Debug)]
struct SharedState {
    band: ChargeBand,
    gate: ChargeGate,
    cutoff_pending: bool,
}

struct RunHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The charge limiter.
pub struct Limiter {
    cfg: Arc<LimiterCfg>,
    registry: Arc<dyn PowerRegistry>,
    switch: Arc<dyn ChargingSwitch>,
    shared: Arc<Mutex<SharedState>>,
    /// Present exactly while the loop task is scheduled. Held across stop
    /// so start/stop cannot interleave.
    run: Mutex<Option<RunHandle>>,
    /// Raw value last written to the `enabled` tunable.
    enabled_raw: AtomicU32,
    status_tx: watch::Sender<LimiterStatus>,
}

impl Limiter {
    pub fn new(
        cfg: Arc<LimiterCfg>,
        registry: Arc<dyn PowerRegistry>,
        switch: Arc<dyn ChargingSwitch>,
    ) -> Self {
        let band = ChargeBand::new(cfg.lower_threshold, cfg.upper_threshold);
        let (status_tx, _) = watch::channel(LimiterStatus::initial(&band));
        Self {
            shared: Arc::new(Mutex::new(SharedState {
                band,
                gate: ChargeGate::new(),
                cutoff_pending: false,
            })),
            run: Mutex::new(None),
            enabled_raw: AtomicU32::new(0),
            cfg,
            registry,
            switch,
            status_tx,
        }
    }

    /// Receiver for per-tick status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<LimiterStatus> {
        self.status_tx.subscribe()
    }

    /// Latest status snapshot.
    pub fn status(&self) -> LimiterStatus {
        self.status_tx.borrow().clone()
    }

    /// Raw value last written to the `enabled` tunable.
    pub fn enabled_raw(&self) -> u32 {
        self.enabled_raw.load(Ordering::Relaxed)
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    /// Write the `enabled` tunable: any nonzero value starts the loop,
    /// zero stops it. Both directions are idempotent.
    pub async fn set_enabled(&self, raw: u32) {
        self.enabled_raw.store(raw, Ordering::Relaxed);
        if raw != 0 {
            self.start().await;
        } else {
            self.stop().await;
        }
    }

    pub async fn band(&self) -> ChargeBand {
        self.shared.lock().await.band
    }

    /// Write the resume threshold. Returns the value actually stored.
    pub async fn set_lower_threshold(&self, value: u32) -> u8 {
        let mut shared = self.shared.lock().await;
        let applied = shared.band.set_lower(value);
        let band = shared.band;
        drop(shared);
        self.publish_band(&band);
        tracing::info!(requested = value, applied, "lower threshold updated");
        applied
    }

    /// Write the cutoff threshold. Returns the value actually stored.
    pub async fn set_upper_threshold(&self, value: u32) -> u8 {
        let mut shared = self.shared.lock().await;
        let applied = shared.band.set_upper(value);
        let band = shared.band;
        drop(shared);
        self.publish_band(&band);
        tracing::info!(requested = value, applied, "upper threshold updated");
        applied
    }

    fn publish_band(&self, band: &ChargeBand) {
        self.status_tx.send_modify(|s| {
            s.lower_threshold = band.lower();
            s.upper_threshold = band.upper();
            s.updated_at = Utc::now();
        });
    }

    /// Start the loop. No-op when already running.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            tracing::debug!("limiter already running");
            return;
        }

        {
            // Suppression tracking and the armed cutoff never survive a
            // restart; only the band does.
            let mut shared = self.shared.lock().await;
            shared.gate = ChargeGate::new();
            shared.cutoff_pending = false;
        }

        let token = CancellationToken::new();
        let task = LoopTask {
            cfg: self.cfg.clone(),
            registry: self.registry.clone(),
            switch: self.switch.clone(),
            shared: self.shared.clone(),
            status_tx: self.status_tx.clone(),
            tick_count: 0,
        };
        let handle = tokio::spawn(task.run(token.clone()));
        *run = Some(RunHandle {
            token,
            task: handle,
        });

        self.status_tx.send_modify(|s| {
            s.running = true;
            s.tick_count = 0;
            s.reading = None;
            s.charging_suppressed = false;
            s.cutoff_pending = false;
            s.updated_at = Utc::now();
        });
        tracing::info!(first_tick_ms = self.cfg.tick_ms, "limiter started");
    }

    /// Stop the loop and force charging back on. No-op when already
    /// stopped. When this returns, no tick is in flight or scheduled.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(RunHandle { token, task }) = run.take() else {
            tracing::debug!("limiter already stopped");
            return;
        };

        token.cancel();
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "loop task join failed");
        }

        // Best effort, regardless of what the loop last did: lookup or
        // write failures leave charging in whatever state it was.
        let mut shared = self.shared.lock().await;
        if let Err(e) = self
            .switch
            .set_charging_enabled(&self.cfg.battery_name, true)
        {
            tracing::debug!(error = %e, "forced enable failed, leaving charging state as-is");
        }
        shared.gate = ChargeGate::new();
        shared.cutoff_pending = false;
        drop(shared);

        self.status_tx.send_modify(|s| {
            s.running = false;
            s.charging_suppressed = false;
            s.cutoff_pending = false;
            s.updated_at = Utc::now();
        });
        tracing::info!("limiter stopped, charging forced on");
    }
}

/// The spawned tick loop. Owns nothing the `Limiter` handle does not
/// share; exits only via cancellation.
struct LoopTask {
    cfg: Arc<LimiterCfg>,
    registry: Arc<dyn PowerRegistry>,
    switch: Arc<dyn ChargingSwitch>,
    shared: Arc<Mutex<SharedState>>,
    status_tx: watch::Sender<LimiterStatus>,
    tick_count: u64,
}

impl LoopTask {
    async fn run(mut self, token: CancellationToken) {
        let mut delay = TickDelay::Normal.interval(&self.cfg);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(tick_count = self.tick_count, "tick loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    delay = self.tick().await;
                }
            }
        }
    }

    /// One control-loop pass. Returns the delay before the next tick.
    async fn tick(&mut self) -> Duration {
        self.tick_count += 1;

        let reading = match self.sample() {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(error = %e, "power supply unavailable, backing off");
                let delay = TickDelay::FaultBackoff.interval(&self.cfg);
                let shared = self.shared.lock().await;
                let (suppressed, pending) = (shared.gate.suppressed(), shared.cutoff_pending);
                drop(shared);
                self.publish(None, suppressed, pending, delay);
                return delay;
            }
        };

        let mut shared = self.shared.lock().await;
        let decision = decision::decide(&reading, &shared.band, shared.cutoff_pending);
        shared.cutoff_pending = decision.cutoff_pending;
        if let Some(request) = decision.request {
            shared
                .gate
                .apply(self.switch.as_ref(), &self.cfg.battery_name, request);
        }
        let suppressed = shared.gate.suppressed();
        let pending = shared.cutoff_pending;
        drop(shared);

        let delay = decision.delay.interval(&self.cfg);
        tracing::debug!(
            percent = reading.percent,
            status = reading.status.as_str(),
            usb_present = reading.usb_present,
            suppressed,
            pending,
            delay_ms = delay.as_millis() as u64,
            "tick"
        );
        self.publish(Some(reading), suppressed, pending, delay);
        delay
    }

    /// Read both supplies. Any failure here is a transient fault.
    fn sample(&self) -> Result<ChargeReading, PowerError> {
        let battery = self
            .registry
            .lookup(&self.cfg.battery_name)
            .ok_or_else(|| PowerError::NotFound(self.cfg.battery_name.clone()))?;
        let usb = self
            .registry
            .lookup(&self.cfg.usb_name)
            .ok_or_else(|| PowerError::NotFound(self.cfg.usb_name.clone()))?;
        Ok(ChargeReading {
            status: battery.status()?,
            percent: battery.capacity()?,
            usb_present: usb.present()?,
        })
    }

    fn publish(
        &self,
        reading: Option<ChargeReading>,
        suppressed: bool,
        pending: bool,
        delay: Duration,
    ) {
        self.status_tx.send_modify(|s| {
            s.running = true;
            s.tick_count = self.tick_count;
            s.reading = reading;
            s.charging_suppressed = suppressed;
            s.cutoff_pending = pending;
            s.last_delay_ms = delay.as_millis() as u64;
            s.updated_at = Utc::now();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::{ChargeStatus, PowerSource};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU8};
    use std::time::Duration;

    struct FakeSupply {
        status: StdMutex<ChargeStatus>,
        percent: AtomicU8,
        present: AtomicBool,
    }

    impl FakeSupply {
        fn new(status: ChargeStatus, percent: u8, present: bool) -> Arc<Self> {
            Arc::new(Self {
                status: StdMutex::new(status),
                percent: AtomicU8::new(percent),
                present: AtomicBool::new(present),
            })
        }
    }

    impl PowerSource for FakeSupply {
        fn status(&self) -> Result<ChargeStatus, PowerError> {
            Ok(*self.status.lock().unwrap())
        }

        fn capacity(&self) -> Result<u8, PowerError> {
            Ok(self.percent.load(Ordering::Relaxed))
        }

        fn present(&self) -> Result<bool, PowerError> {
            Ok(self.present.load(Ordering::Relaxed))
        }
    }

    struct FakeRegistry {
        battery: Arc<FakeSupply>,
        usb: Arc<FakeSupply>,
        offline: AtomicBool,
    }

    impl PowerRegistry for FakeRegistry {
        fn lookup(&self, name: &str) -> Option<Arc<dyn PowerSource>> {
            if self.offline.load(Ordering::Relaxed) {
                return None;
            }
            match name {
                "battery" => Some(self.battery.clone()),
                "usb" => Some(self.usb.clone()),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct FakeSwitch {
        calls: StdMutex<Vec<bool>>,
    }

    impl ChargingSwitch for FakeSwitch {
        fn set_charging_enabled(&self, _name: &str, enable: bool) -> Result<(), PowerError> {
            self.calls.lock().unwrap().push(enable);
            Ok(())
        }
    }

    fn fast_cfg(debounce_ms: u64) -> Arc<LimiterCfg> {
        Arc::new(LimiterCfg {
            tick_ms: 10,
            fault_backoff_ms: 30,
            debounce_ms,
            ..LimiterCfg::default()
        })
    }

    fn rig(percent: u8, status: ChargeStatus) -> (Arc<Limiter>, Arc<FakeRegistry>, Arc<FakeSwitch>) {
        rig_with_debounce(percent, status, 20)
    }

    /// A rig with a debounce beyond the test duration, for asserting on
    /// the armed-but-not-fired state without racing the second tick.
    fn rig_armed_only(
        percent: u8,
        status: ChargeStatus,
    ) -> (Arc<Limiter>, Arc<FakeRegistry>, Arc<FakeSwitch>) {
        rig_with_debounce(percent, status, 60_000)
    }

    fn rig_with_debounce(
        percent: u8,
        status: ChargeStatus,
        debounce_ms: u64,
    ) -> (Arc<Limiter>, Arc<FakeRegistry>, Arc<FakeSwitch>) {
        let registry = Arc::new(FakeRegistry {
            battery: FakeSupply::new(status, percent, true),
            usb: FakeSupply::new(ChargeStatus::Unknown, 0, true),
            offline: AtomicBool::new(false),
        });
        let switch = Arc::new(FakeSwitch::default());
        let limiter = Arc::new(Limiter::new(
            fast_cfg(debounce_ms),
            registry.clone(),
            switch.clone(),
        ));
        (limiter, registry, switch)
    }

    /// Wait until the loop has published at least `n` ticks.
    async fn wait_ticks(limiter: &Limiter, n: u64) {
        let mut rx = limiter.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while rx.borrow_and_update().tick_count < n {
                rx.changed().await.expect("status channel closed");
            }
        })
        .await
        .expect("loop did not reach the expected tick count");
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let (limiter, _registry, _switch) = rig(50, ChargeStatus::Charging);
        limiter.start().await;
        limiter.start().await;
        assert!(limiter.is_running().await);
        wait_ticks(&limiter, 2).await;
        limiter.stop().await;
        assert!(!limiter.is_running().await);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_only_forces_enable_when_started() {
        let (limiter, _registry, switch) = rig(50, ChargeStatus::Charging);
        limiter.stop().await;
        assert!(switch.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_battery_cuts_off_after_debounce_tick() {
        let (limiter, _registry, switch) = rig(100, ChargeStatus::Charging);
        limiter.set_enabled(1).await;
        wait_ticks(&limiter, 2).await;

        let status = limiter.status();
        assert!(status.charging_suppressed);
        // Exactly one disable: first tick arms, second fires, later ticks
        // are absorbed by the gate.
        assert_eq!(*switch.calls.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn first_high_tick_only_arms() {
        let (limiter, _registry, switch) = rig_armed_only(100, ChargeStatus::Charging);
        limiter.start().await;
        wait_ticks(&limiter, 1).await;

        let status = limiter.status();
        assert!(status.cutoff_pending);
        assert!(!status.charging_suppressed);
        assert!(switch.calls.lock().unwrap().is_empty());
        assert_eq!(status.last_delay_ms, 60_000);
        limiter.stop().await;
    }

    #[tokio::test]
    async fn drained_battery_resumes_charging() {
        let (limiter, registry, switch) = rig(100, ChargeStatus::Charging);
        limiter.start().await;
        wait_ticks(&limiter, 2).await;
        assert!(limiter.status().charging_suppressed);

        registry.battery.percent.store(90, Ordering::Relaxed);
        let before = limiter.status().tick_count;
        wait_ticks(&limiter, before + 1).await;

        let status = limiter.status();
        assert!(!status.charging_suppressed);
        assert_eq!(*switch.calls.lock().unwrap(), vec![false, true]);
        limiter.stop().await;
    }

    #[tokio::test]
    async fn stop_forces_charging_on() {
        let (limiter, _registry, switch) = rig(100, ChargeStatus::Charging);
        limiter.set_enabled(1).await;
        wait_ticks(&limiter, 2).await;
        assert!(limiter.status().charging_suppressed);

        limiter.set_enabled(0).await;
        let calls = switch.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![false, true]);
        let status = limiter.status();
        assert!(!status.running);
        assert!(!status.charging_suppressed);
    }

    #[tokio::test]
    async fn lookup_fault_backs_off_without_actuating() {
        let (limiter, registry, switch) = rig(100, ChargeStatus::Charging);
        registry.offline.store(true, Ordering::Relaxed);
        limiter.start().await;
        wait_ticks(&limiter, 1).await;

        let status = limiter.status();
        assert_eq!(status.reading, None);
        assert_eq!(status.last_delay_ms, 30);
        assert!(switch.calls.lock().unwrap().is_empty());
        limiter.stop().await;
    }

    #[tokio::test]
    async fn threshold_writes_race_free_with_running_loop() {
        let (limiter, _registry, _switch) = rig(97, ChargeStatus::Charging);
        limiter.start().await;
        wait_ticks(&limiter, 1).await;

        assert_eq!(limiter.set_lower_threshold(98).await, 98);
        assert_eq!(limiter.set_lower_threshold(100).await, 95);
        assert_eq!(limiter.set_upper_threshold(90).await, 100);

        let status = limiter.status();
        assert_eq!(status.lower_threshold, 95);
        assert_eq!(status.upper_threshold, 100);
        limiter.stop().await;
    }

    #[tokio::test]
    async fn restart_clears_debounce_state() {
        let (limiter, _registry, switch) = rig_armed_only(100, ChargeStatus::Charging);
        limiter.start().await;
        wait_ticks(&limiter, 1).await;
        assert!(limiter.status().cutoff_pending);

        limiter.stop().await;
        switch.calls.lock().unwrap().clear();

        limiter.start().await;
        wait_ticks(&limiter, 1).await;
        // First tick after restart arms again instead of firing.
        assert!(limiter.status().cutoff_pending);
        assert!(switch.calls.lock().unwrap().is_empty());
        limiter.stop().await;
    }
}
