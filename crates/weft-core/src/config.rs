#![forbid(unsafe_code)]

//! Owner configuration.
//!
//! [`ReactiveConfig`] is handed to [`Owner::with_config`](crate::owner::Owner::with_config)
//! and flows into every Value the owner constructs.
//!
//! # Environment
//!
//! [`ReactiveConfig::from_env`] reads:
//!
//! - `WEFT_FAULT_POLICY`: `isolate` or `propagate` (case-insensitive).
//! - `WEFT_LABEL`: owner label used in log fields and errors.
//!
//! Unset or unparseable variables fall back to the defaults.

use std::str::FromStr;

/// Environment variable selecting the [`FaultPolicy`].
pub const ENV_FAULT_POLICY: &str = "WEFT_FAULT_POLICY";
/// Environment variable providing the owner label.
pub const ENV_LABEL: &str = "WEFT_LABEL";

/// What a fan-out does with a handler that panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Catch the panic, log it, keep notifying the remaining handlers.
    #[default]
    Isolate,
    /// Keep notifying the remaining handlers, then resume the first panic
    /// once the fan-out has finished.
    Propagate,
}

impl FaultPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isolate => "isolate",
            Self::Propagate => "propagate",
        }
    }
}

impl FromStr for FaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown fault policy: {other}")),
        }
    }
}

/// Configuration for an [`Owner`](crate::owner::Owner).
#[derive(Debug, Clone)]
pub struct ReactiveConfig {
    /// Label used in log fields and binding errors.
    pub label: Option<String>,
    /// Handler fault policy inherited by every Value the owner creates.
    pub fault_policy: FaultPolicy,
    /// Emit DEBUG events for enable/disable/bind/destroy.
    pub trace_lifecycle: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            label: None,
            fault_policy: FaultPolicy::Isolate,
            trace_lifecycle: true,
        }
    }
}

impl ReactiveConfig {
    /// Build a config from `WEFT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(policy) = lookup(ENV_FAULT_POLICY).and_then(|raw| raw.parse().ok()) {
            config.fault_policy = policy;
        }
        if let Some(label) = lookup(ENV_LABEL).filter(|l| !l.trim().is_empty()) {
            config.label = Some(label);
        }
        config
    }

    /// Set the owner label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the handler fault policy.
    #[must_use]
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Toggle lifecycle DEBUG events.
    #[must_use]
    pub fn with_trace_lifecycle(mut self, enabled: bool) -> Self {
        self.trace_lifecycle = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ReactiveConfig::default();
        assert_eq!(config.fault_policy, FaultPolicy::Isolate);
        assert!(config.label.is_none());
        assert!(config.trace_lifecycle);
    }

    #[test]
    fn builders_chain() {
        let config = ReactiveConfig::default()
            .with_label("sidebar")
            .with_fault_policy(FaultPolicy::Propagate)
            .with_trace_lifecycle(false);
        assert_eq!(config.label.as_deref(), Some("sidebar"));
        assert_eq!(config.fault_policy, FaultPolicy::Propagate);
        assert!(!config.trace_lifecycle);
    }

    #[test]
    fn policy_parses_case_insensitive() {
        assert_eq!("Propagate".parse::<FaultPolicy>(), Ok(FaultPolicy::Propagate));
        assert_eq!(" isolate ".parse::<FaultPolicy>(), Ok(FaultPolicy::Isolate));
        assert!("abort".parse::<FaultPolicy>().is_err());
    }

    #[test]
    fn env_lookup_applies_known_values() {
        let config = ReactiveConfig::from_lookup(lookup(&[
            (ENV_FAULT_POLICY, "propagate"),
            (ENV_LABEL, "todo-list"),
        ]));
        assert_eq!(config.fault_policy, FaultPolicy::Propagate);
        assert_eq!(config.label.as_deref(), Some("todo-list"));
    }

    #[test]
    fn env_lookup_ignores_garbage() {
        let config =
            ReactiveConfig::from_lookup(lookup(&[(ENV_FAULT_POLICY, "explode"), (ENV_LABEL, "  ")]));
        assert_eq!(config.fault_policy, FaultPolicy::Isolate);
        assert!(config.label.is_none());
    }
}
