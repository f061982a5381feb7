use std::time::Duration;

use crate::types::error::AppError;

#[derive(Debug, Clone)]
pub struct FrontierConfig {
    // Defer activation of newly-held queues to bound simultaneously-active hosts
    pub hold_queues: bool,
    // Pause imposed on a queue after each completed fetch
    pub politeness_delay: Duration,
    // Wait before re-serving a transient failure, absent a server-directed delay
    pub retry_delay: Duration,
    // Transient failures beyond this attempt count become terminal failures
    pub max_retries: u32,
    // Politeness waits longer than this deactivate the queue when other work exists
    pub snooze_long: Duration,
    // Session balance granted at each activation
    pub balance_replenish: i64,
    // Extra cost charged to a queue on terminal failure
    pub error_penalty: i64,
    // Lifetime expenditure ceiling per queue; <= 0 means unlimited
    pub total_budget: i64,
    // Upper bound on one next() wait cycle
    pub default_wait: Duration,
    pub cost_policy: String,
    pub queue_policy: String,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            hold_queues: false,
            politeness_delay: Duration::from_secs(2),
            retry_delay: Duration::from_secs(900),
            max_retries: 30,
            snooze_long: Duration::from_secs(300),
            balance_replenish: 3000,
            error_penalty: 100,
            total_budget: 0,
            default_wait: Duration::from_secs(1),
            cost_policy: "unit".to_string(),
            queue_policy: "hostname".to_string(),
        }
    }
}

impl FrontierConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.balance_replenish <= 0 {
            return Err(AppError::InvalidConfig(
                "balance_replenish must be positive".to_string(),
            ));
        }

        if self.default_wait.is_zero() {
            return Err(AppError::InvalidConfig(
                "default_wait must be non-zero".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(AppError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.error_penalty < 0 {
            return Err(AppError::InvalidConfig(
                "error_penalty must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
