use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

pub const DEFAULT_MIN_CREDITS: u32 = 12;
pub const DEFAULT_MAX_CREDITS: u32 = 18;

/// Term-wide credit-hour bounds. Configuration, not per-student state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPolicy {
    pub min_credits: u32,
    pub max_credits: u32,
}

impl RegistrationPolicy {
    pub fn new(min_credits: u32, max_credits: u32) -> Result<Self, PolicyError> {
        if max_credits == 0 {
            return Err(PolicyError::ZeroMaximum);
        }
        if min_credits > max_credits {
            return Err(PolicyError::InvertedBounds {
                min: min_credits,
                max: max_credits,
            });
        }
        Ok(Self {
            min_credits,
            max_credits,
        })
    }

    /// Whether a term total lies within `[min_credits, max_credits]`.
    pub fn admits(&self, total_credits: u32) -> bool {
        (self.min_credits..=self.max_credits).contains(&total_credits)
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            min_credits: DEFAULT_MIN_CREDITS,
            max_credits: DEFAULT_MAX_CREDITS,
        }
    }
}
