use std::env;
use std::str::FromStr;
use std::time::Duration;

use simulator::{RestartPolicy, SimulationSettings};
use tracking::progress::FALLBACK_SPEED_KMH;
use tracking_core::{Error, HistoryFilter, Result};

/// Service configuration, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub tick_interval: Duration,
    pub steps: usize,
    pub average_speed_kmh: f64,
    pub restart_policy: RestartPolicy,
    /// When set, a device report stops the shipment's running simulation.
    pub device_overrides_simulation: bool,
    pub history_default_limit: usize,
    pub eta_fallback_speed_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        let simulation = SimulationSettings::default();
        Self {
            tick_interval: simulation.tick_interval,
            steps: simulation.steps,
            average_speed_kmh: simulation.average_speed_kmh,
            restart_policy: RestartPolicy::default(),
            device_overrides_simulation: false,
            history_default_limit: HistoryFilter::DEFAULT_LIMIT,
            eta_fallback_speed_kmh: FALLBACK_SPEED_KMH,
        }
    }
}

impl Config {
    /// Reads configuration from the environment, falling back to defaults
    /// when any value is invalid.
    #[must_use]
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|err| {
            tracing::warn!("invalid configuration, using defaults: {err}");
            Self::default()
        })
    }

    /// Reads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the first invalid variable.
    pub fn try_from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the first invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let default_tick_ms = u64::try_from(defaults.tick_interval.as_millis()).unwrap_or(5_000);

        let tick_ms: u64 = parse(&lookup, "SIM_TICK_INTERVAL_MS", default_tick_ms)?;
        let steps: usize = parse(&lookup, "SIM_STEPS", defaults.steps)?;
        let average_speed_kmh: f64 =
            parse(&lookup, "SIM_AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?;
        let restart_policy = parse(&lookup, "SIM_RESTART_POLICY", defaults.restart_policy)?;
        let device_overrides_simulation = flag(
            &lookup,
            "DEVICE_OVERRIDES_SIMULATION",
            defaults.device_overrides_simulation,
        )?;
        let history_default_limit: usize =
            parse(&lookup, "HISTORY_DEFAULT_LIMIT", defaults.history_default_limit)?;
        let eta_fallback_speed_kmh: f64 =
            parse(&lookup, "ETA_FALLBACK_SPEED_KMH", defaults.eta_fallback_speed_kmh)?;

        if tick_ms == 0 {
            return Err(invalid("SIM_TICK_INTERVAL_MS", "must be positive"));
        }
        if steps == 0 {
            return Err(invalid("SIM_STEPS", "must be positive"));
        }
        if !average_speed_kmh.is_finite() || average_speed_kmh < 0.0 {
            return Err(invalid("SIM_AVERAGE_SPEED_KMH", "must be a non-negative number"));
        }
        if history_default_limit == 0 {
            return Err(invalid("HISTORY_DEFAULT_LIMIT", "must be positive"));
        }
        if !eta_fallback_speed_kmh.is_finite() || eta_fallback_speed_kmh <= 0.0 {
            return Err(invalid("ETA_FALLBACK_SPEED_KMH", "must be a positive number"));
        }

        Ok(Self {
            tick_interval: Duration::from_millis(tick_ms),
            steps,
            average_speed_kmh,
            restart_policy,
            device_overrides_simulation,
            history_default_limit,
            eta_fallback_speed_kmh,
        })
    }

    /// Engine defaults derived from this configuration.
    #[must_use]
    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            tick_interval: self.tick_interval,
            average_speed_kmh: self.average_speed_kmh,
            steps: self.steps,
            seed: None,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(key) else {
        tracing::trace!("{key} not set, using default");
        return Ok(default);
    };
    value.trim().parse::<T>().map_err(|err| invalid(key, &format!("`{value}`: {err}")))
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(invalid(key, &format!("`{other}` is not a boolean"))),
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::Configuration(format!("{key} {reason}"))
}
