//! Authenticated principal and companion quota

use std::collections::BTreeSet;

pub const PRO_PLAN: &str = "pro";

/// Feature flags granting a companion quota, in evaluation order. A later
/// match overrides an earlier one.
pub const QUOTA_FEATURES: [(&str, usize); 2] =
    [("3_companion_limit", 3), ("10_companion_limit", 10)];

/// Something the identity provider can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    Plan(&'a str),
    Feature(&'a str),
}

/// The identity performing a request, as forwarded by the identity edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub plan: Option<String>,
    pub features: BTreeSet<String>,
    /// Bearer token minted for the data tier.
    pub token: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Principal {
        Principal {
            id: id.into(),
            plan: None,
            features: BTreeSet::new(),
            token: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Principal {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Principal {
        self.features.insert(feature.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Principal {
        self.token = Some(token.into());
        self
    }

    pub fn has(&self, capability: Capability<'_>) -> bool {
        match capability {
            Capability::Plan(plan) => self.plan.as_deref() == Some(plan),
            Capability::Feature(feature) => self.features.contains(feature),
        }
    }

    pub fn quota(&self) -> CompanionQuota {
        if self.has(Capability::Plan(PRO_PLAN)) {
            return CompanionQuota::Unlimited;
        }

        // no plan and no flag leaves the limit at zero
        let mut limit = 0;
        for (feature, feature_limit) in QUOTA_FEATURES {
            if self.has(Capability::Feature(feature)) {
                limit = feature_limit;
            }
        }
        CompanionQuota::Limited(limit)
    }
}

/// How many companions a principal may author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionQuota {
    Unlimited,
    Limited(usize),
}

/// Data-tier token of an optional principal.
pub fn token_of(principal: Option<&Principal>) -> Option<&str> {
    principal.and_then(|p| p.token.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_plan_is_unlimited() {
        let principal = Principal::new("user_1")
            .with_plan("pro")
            .with_feature("3_companion_limit");
        assert_eq!(principal.quota(), CompanionQuota::Unlimited);
    }

    #[test]
    fn larger_flag_wins() {
        let principal = Principal::new("user_1")
            .with_feature("10_companion_limit")
            .with_feature("3_companion_limit");
        assert_eq!(principal.quota(), CompanionQuota::Limited(10));

        let principal = Principal::new("user_1").with_feature("3_companion_limit");
        assert_eq!(principal.quota(), CompanionQuota::Limited(3));
    }

    #[test]
    fn no_plan_or_flag_is_zero() {
        let principal = Principal::new("user_1").with_plan("basic");
        assert_eq!(principal.quota(), CompanionQuota::Limited(0));
    }

    #[test]
    fn capability_predicate() {
        let principal = Principal::new("user_1")
            .with_plan("pro")
            .with_feature("beta");
        assert!(principal.has(Capability::Plan("pro")));
        assert!(!principal.has(Capability::Plan("basic")));
        assert!(principal.has(Capability::Feature("beta")));
        assert!(!principal.has(Capability::Feature("pro")));
    }
}
