pub mod cost;
pub mod hostname;

use std::sync::Arc;

use crate::types::{
    error::AppError,
    traits::{cost_policy::CostAssignmentPolicy, queue_policy::QueueAssignmentPolicy},
};

use cost::{PathDepthCostPolicy, UnitCostPolicy};
use hostname::HostnamePolicy;

// Policies are selected by configuration value through this table; an
// unknown name is a fatal configuration error at frontier construction.

pub fn cost_policy_by_name(name: &str) -> Result<Arc<dyn CostAssignmentPolicy>, AppError> {
    match name {
        "unit" => Ok(Arc::new(UnitCostPolicy)),
        "path-depth" => Ok(Arc::new(PathDepthCostPolicy)),
        other => Err(AppError::UnknownPolicy(other.to_string())),
    }
}

pub fn queue_policy_by_name(name: &str) -> Result<Arc<dyn QueueAssignmentPolicy>, AppError> {
    match name {
        "hostname" => Ok(Arc::new(HostnamePolicy)),
        other => Err(AppError::UnknownPolicy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_policies_resolve() {
        assert!(cost_policy_by_name("unit").is_ok());
        assert!(cost_policy_by_name("path-depth").is_ok());
        assert!(queue_policy_by_name("hostname").is_ok());
    }

    #[test]
    fn test_unknown_policy_is_fatal() {
        assert!(matches!(
            cost_policy_by_name("clairvoyant"),
            Err(AppError::UnknownPolicy(_))
        ));
        assert!(matches!(
            queue_policy_by_name("round-robin"),
            Err(AppError::UnknownPolicy(_))
        ));
    }
}
