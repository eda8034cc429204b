//! Load-once holder for in-process models.
//!
//! A local model is loaded on first use. Whatever the first attempt
//! produces sticks: a loaded model is reused, and a load error is kept
//! and returned to every later caller without another download attempt.

use anyhow::{anyhow, Result};
use tracing::{info, warn};

/// State of a lazily loaded model.
pub enum ModelSlot<M> {
    Unloaded,
    Ready(M),
    Failed(String),
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::Unloaded
    }
}

impl<M> ModelSlot<M> {
    /// Return the model, running `load` only if no attempt was made yet.
    pub fn get_or_load(
        &mut self,
        what: &str,
        model_name: &str,
        load: impl FnOnce() -> Result<M>,
    ) -> Result<&mut M> {
        if let Self::Unloaded = self {
            info!(model = %model_name, "loading {}", what);
            *self = match load() {
                Ok(model) => Self::Ready(model),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(model = %model_name, "{} failed to load: {}", what, reason);
                    Self::Failed(reason)
                }
            };
        }
        match self {
            Self::Ready(model) => Ok(model),
            Self::Failed(reason) => Err(anyhow!("{} {} unavailable: {}", what, model_name, reason)),
            Self::Unloaded => Err(anyhow!("{} {} not loaded", what, model_name)),
        }
    }
}
