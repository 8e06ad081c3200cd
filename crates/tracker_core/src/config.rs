use std::time::Duration;

/// Tuning for progress normalization. The ceilings and plateau thresholds
/// were tuned against a specific backend's batching behaviour, so all of
/// them are configuration rather than constants.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizerConfig {
    /// Consecutive unchanged samples before simulation may engage.
    pub plateau_trigger: u32,
    /// Progress values eligible for simulation. Empty means any value.
    pub plateau_values: Vec<f64>,
    /// Tolerance when matching `plateau_values`.
    pub plateau_tolerance: f64,
    /// Simulation cap when no batch hint was parsed.
    pub low_ceiling: f64,
    /// Simulation cap when a hint indicates the final batch.
    pub high_ceiling: f64,
    /// Synthetic climb rate, in progress points per second.
    pub sim_rate: f64,
    /// Interval between simulation ticks.
    pub sim_tick: Duration,
    /// Highest value any sample or simulation may display. Only a terminal
    /// `completed` event sets 100.
    pub pre_terminal_cap: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            plateau_trigger: 3,
            plateau_values: vec![50.0],
            plateau_tolerance: 0.5,
            low_ceiling: 75.0,
            high_ceiling: 95.0,
            sim_rate: 0.35,
            sim_tick: Duration::from_secs(1),
            pre_terminal_cap: 99.0,
        }
    }
}

/// Tuning for polling cadence, backoff, and stall detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Poll interval when displayed progress is near completion.
    pub poll_fast: Duration,
    /// Poll interval mid-task.
    pub poll_moderate: Duration,
    /// Displayed progress at which `poll_fast` kicks in.
    pub near_complete_threshold: f64,
    /// First backoff delay after a poll failure; doubles per failure.
    pub backoff_base: Duration,
    /// Upper bound on the backed-off poll delay.
    pub poll_max_delay: Duration,
    /// Fraction of the poll delay added as uniform jitter by the driver.
    pub jitter_frac: f64,
    /// Consecutive poll failures before the degradation warning surfaces.
    pub poll_failure_surface_threshold: u32,
    /// Period of the stall-detector sweep.
    pub stall_check_interval: Duration,
    /// T1: no channel activity before polling activates.
    pub stall_activity: Duration,
    /// T2: progress unchanged before simulation is handed off.
    pub stall_plateau: Duration,
    /// T3: no terminal event before forced resolution is considered.
    pub stall_terminal: Duration,
    /// T4: no progress at all since start before the early-stall warning.
    pub stall_early: Duration,
    /// Minimum displayed progress for forced resolution to claim completion.
    pub forced_resolution_confidence: f64,
    /// How long to wait for a server cancel acknowledgment.
    pub cancel_fallback: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_fast: Duration::from_secs(1),
            poll_moderate: Duration::from_secs(3),
            near_complete_threshold: 80.0,
            backoff_base: Duration::from_secs(2),
            poll_max_delay: Duration::from_secs(30),
            jitter_frac: 0.2,
            poll_failure_surface_threshold: 5,
            stall_check_interval: Duration::from_secs(2),
            stall_activity: Duration::from_secs(8),
            stall_plateau: Duration::from_secs(10),
            stall_terminal: Duration::from_secs(120),
            stall_early: Duration::from_secs(45),
            forced_resolution_confidence: 90.0,
            cancel_fallback: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub normalizer: NormalizerConfig,
    pub scheduler: SchedulerConfig,
    /// Interval between heartbeat round-trip probes.
    pub heartbeat_interval: Duration,
    /// Heartbeat latency at or above which quality degrades.
    pub quality_degraded: Duration,
    /// Heartbeat latency at or above which quality is poor.
    pub quality_poor: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            scheduler: SchedulerConfig::default(),
            heartbeat_interval: Duration::from_secs(10),
            quality_degraded: Duration::from_millis(250),
            quality_poor: Duration::from_millis(1000),
        }
    }
}
