//! Session configuration.

use crate::activation::ActivationMode;

/// Configuration shared by a knowledge base and the sessions it creates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// How each round walks its agenda.
    pub activation_mode: ActivationMode,

    /// Delta computation threads; 0 uses one per available core.
    pub parallelism: usize,

    /// Initial fact table size per type.
    pub initial_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activation_mode: ActivationMode::Default,
            parallelism: 0,
            initial_capacity: 16,
        }
    }
}

impl SessionConfig {
    /// Creates a configuration that computes deltas on a single worker thread.
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            parallelism: 1,
            ..Self::default()
        }
    }

    /// Creates a configuration for bulk loads: the whole agenda runs every
    /// round and fact tables start large.
    #[must_use]
    pub fn batch() -> Self {
        Self {
            activation_mode: ActivationMode::Continuous,
            parallelism: 0,
            initial_capacity: 4096,
        }
    }

    /// Builder method to set the activation mode.
    #[must_use]
    pub fn with_activation_mode(mut self, mode: ActivationMode) -> Self {
        self.activation_mode = mode;
        self
    }

    /// Builder method to set the number of delta threads.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Builder method to set the initial fact table size.
    #[must_use]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}
