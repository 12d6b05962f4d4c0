//! Static plan catalog used to provision subscription quota.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    pub id: String,
    pub name: String,
    /// Campaigns per subscription period. One campaign = one send unit.
    pub send_limit: u64,
    /// Recipients per campaign, not cumulative.
    pub recipient_limit: u64,
    pub promotion_limit: u64,
    pub period_days: i64,
}

pub fn default_plans() -> Vec<PlanConfig> {
    vec![
        PlanConfig {
            id: "starter".to_string(),
            name: "Starter".to_string(),
            send_limit: 10,
            recipient_limit: 100,
            promotion_limit: 5,
            period_days: 30,
        },
        PlanConfig {
            id: "growth".to_string(),
            name: "Growth".to_string(),
            send_limit: 60,
            recipient_limit: 1000,
            promotion_limit: 25,
            period_days: 30,
        },
        PlanConfig {
            id: "enterprise".to_string(),
            name: "Enterprise".to_string(),
            send_limit: 500,
            recipient_limit: 10_000,
            promotion_limit: 200,
            period_days: 30,
        },
    ]
}

pub fn find_plan<'a>(plans: &'a [PlanConfig], id: &str) -> Option<&'a PlanConfig> {
    plans.iter().find(|plan| plan.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plans_present() {
        let plans = default_plans();
        assert!(find_plan(&plans, "starter").is_some());
        assert!(find_plan(&plans, "growth").is_some());
        assert!(find_plan(&plans, "enterprise").is_some());
        assert!(find_plan(&plans, "nonexistent").is_none());
    }

    #[test]
    fn test_plan_limits_increase_by_tier() {
        let plans = default_plans();
        let starter = find_plan(&plans, "starter").unwrap();
        let growth = find_plan(&plans, "growth").unwrap();
        assert!(growth.send_limit > starter.send_limit);
        assert!(growth.recipient_limit > starter.recipient_limit);
    }
}
