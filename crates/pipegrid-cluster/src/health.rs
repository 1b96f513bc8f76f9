//! Node health classification.
//!
//! Liveness checks themselves run outside pipegrid. What arrives here is
//! either a ready-made classification (`NodeManager::set_health`) or a
//! stream of raw probe results, which a `HealthTracker` folds into
//! `Alive` / `Suspect` / `Dead` using consecutive-failure thresholds.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pipegrid_core::config::HealthConfig;

/// Health of a node as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    Alive,
    Suspect,
    Dead,
}

impl NodeHealth {
    pub fn label(&self) -> &'static str {
        match self {
            NodeHealth::Alive => "alive",
            NodeHealth::Suspect => "suspect",
            NodeHealth::Dead => "dead",
        }
    }
}

/// Result of a single external liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// The node answered and reported itself healthy.
    Healthy,
    /// The node answered but reported a problem.
    Unhealthy,
    /// The node could not be reached.
    Failed,
}

/// Tracks consecutive probe results for a single node.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    health: NodeHealth,
    consecutive_failures: u32,
    /// Failures before `Suspect`.
    suspect_threshold: u32,
    /// Failures before `Dead`.
    dead_threshold: u32,
}

impl HealthTracker {
    pub fn new(config: &HealthConfig) -> Self {
        Self::with_thresholds(config.suspect_after_failures, config.dead_after_failures)
    }

    pub fn with_thresholds(suspect_threshold: u32, dead_threshold: u32) -> Self {
        Self {
            health: NodeHealth::Alive,
            consecutive_failures: 0,
            suspect_threshold: suspect_threshold.max(1),
            dead_threshold: dead_threshold.max(suspect_threshold).max(1),
        }
    }

    /// Record a probe result and return the new classification.
    pub fn record(&mut self, result: ProbeResult) -> NodeHealth {
        match result {
            ProbeResult::Healthy => {
                if self.health != NodeHealth::Alive {
                    debug!(
                        failures = self.consecutive_failures,
                        "node recovered to alive"
                    );
                }
                self.consecutive_failures = 0;
                self.health = NodeHealth::Alive;
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_failures += 1;

                let next = if self.consecutive_failures >= self.dead_threshold {
                    NodeHealth::Dead
                } else if self.consecutive_failures >= self.suspect_threshold {
                    NodeHealth::Suspect
                } else {
                    self.health
                };

                if next != self.health {
                    warn!(
                        failures = self.consecutive_failures,
                        health = next.label(),
                        "node health degraded"
                    );
                }
                self.health = next;
            }
        }

        self.health
    }

    /// Override the classification (external feed). Resets the failure count
    /// when the node is declared alive.
    pub fn force(&mut self, health: NodeHealth) {
        if health == NodeHealth::Alive {
            self.consecutive_failures = 0;
        }
        self.health = health;
    }

    pub fn health(&self) -> NodeHealth {
        self.health
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
