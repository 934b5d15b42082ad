//! Tunable read/write semantics.
//!
//! Three parameters: `enabled` starts and stops the loop, the two
//! thresholds shape the charge band. Values are unsigned decimal text;
//! a write that does not parse is rejected without touching state.

use std::sync::Arc;

use crate::error::CtlError;
use crate::limiter::Limiter;

pub const PARAM_ENABLED: &str = "enabled";
pub const PARAM_LOWER: &str = "lower_threshold";
pub const PARAM_UPPER: &str = "upper_threshold";

pub struct ParamStore {
    limiter: Arc<Limiter>,
}

impl ParamStore {
    pub fn new(limiter: Arc<Limiter>) -> Self {
        Self { limiter }
    }

    /// Current value of a tunable, as decimal text.
    pub async fn show(&self, param: &str) -> Result<String, CtlError> {
        match param {
            PARAM_ENABLED => Ok(self.limiter.enabled_raw().to_string()),
            PARAM_LOWER => Ok(self.limiter.band().await.lower().to_string()),
            PARAM_UPPER => Ok(self.limiter.band().await.upper().to_string()),
            _ => Err(CtlError::UnknownParameter(param.to_owned())),
        }
    }

    /// Write a tunable. Threshold writes are repaired against the other
    /// threshold; `enabled` treats any nonzero value as "on".
    pub async fn store(&self, param: &str, value: &str) -> Result<(), CtlError> {
        let parsed: u32 = value
            .trim()
            .parse()
            .map_err(|_| CtlError::InvalidInput(value.to_owned()))?;
        match param {
            PARAM_ENABLED => self.limiter.set_enabled(parsed).await,
            PARAM_LOWER => {
                self.limiter.set_lower_threshold(parsed).await;
            }
            PARAM_UPPER => {
                self.limiter.set_upper_threshold(parsed).await;
            }
            _ => return Err(CtlError::UnknownParameter(param.to_owned())),
        }
        Ok(())
    }
}
