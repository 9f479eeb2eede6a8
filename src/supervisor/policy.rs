//! Exception decision policy
//!
//! The policy is data the model consults, not branching in the supervisor
//! loop: each rule pairs an exception signal with the strategy to pursue.
//! New exception classes are added by extending the table, without touching
//! the loop.

/// Order value above which damaged/lost cases are expedited
pub const HIGH_VALUE_THRESHOLD: f64 = 200.0;

/// One row of the decision policy
#[derive(Debug, Clone)]
pub struct PolicyRule {
    /// Stable signal label; becomes the resolution classification
    pub signal: String,

    /// Strategy described declaratively for the model
    pub strategy: String,

    /// Lowercase fragments matched against the exception status and reason;
    /// a rule with no matchers is rendered but never classifies
    matchers: Vec<String>,

    /// Minimum order value for this rule to apply
    min_order_value: Option<f64>,
}

impl PolicyRule {
    /// Create a rule matching any of the given fragments
    pub fn new(
        signal: impl Into<String>,
        strategy: impl Into<String>,
        matchers: &[&str],
    ) -> Self {
        Self {
            signal: signal.into(),
            strategy: strategy.into(),
            matchers: matchers.iter().map(|m| m.to_lowercase()).collect(),
            min_order_value: None,
        }
    }

    /// Require a minimum order value
    pub fn with_min_order_value(mut self, value: f64) -> Self {
        self.min_order_value = Some(value);
        self
    }

    fn matches(&self, description: &str, order_value: Option<f64>) -> bool {
        if self.matchers.is_empty() {
            return false;
        }
        if let Some(min) = self.min_order_value {
            if order_value.map(|v| v <= min).unwrap_or(true) {
                return false;
            }
        }
        let description = description.to_lowercase();
        self.matchers.iter().any(|m| description.contains(m))
    }
}

/// The full decision policy consulted by the supervisor
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    rules: Vec<PolicyRule>,
}

impl DecisionPolicy {
    /// Create a policy from rules, kept in table order
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// The rules in table order
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Render the policy as prompt text, one line per rule
    pub fn render(&self) -> String {
        self.rules
            .iter()
            .map(|rule| format!("- {}: {}", rule.signal, rule.strategy))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Match an exception description against the table
    ///
    /// Value-conditioned rules win over unconditioned ones, so a damaged
    /// high-value order classifies as high-value rather than merely damaged.
    /// Returns `None` for unclassifiable input.
    pub fn classify(&self, description: &str, order_value: Option<f64>) -> Option<&PolicyRule> {
        let mut unconditioned = None;
        for rule in &self.rules {
            if rule.matches(description, order_value) {
                if rule.min_order_value.is_some() {
                    return Some(rule);
                }
                if unconditioned.is_none() {
                    unconditioned = Some(rule);
                }
            }
        }
        unconditioned
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        default_policy()
    }
}

/// The reference decision policy
///
/// A default, not a contract: callers swap in their own table through
/// `Supervisor::with_policy`. The one behavior treated as load-bearing is
/// that unclassifiable input falls through to direct customer notification.
pub fn default_policy() -> DecisionPolicy {
    DecisionPolicy::new(vec![
        PolicyRule::new(
            "customer_not_home_first_attempt",
            "notify the customer and update the order status; do not refund",
            &["not home", "access issue", "no access", "gate code"],
        ),
        PolicyRule::new(
            "damaged_or_lost",
            "issue a refund, then allocate replacement inventory, then recreate the order, \
             then notify the customer",
            &["damaged", "lost"],
        ),
        PolicyRule::new(
            "high_value_damaged_or_lost",
            "issue an expedited priority refund, then allocate replacement inventory, then \
             recreate the order, then notify the customer",
            &["damaged", "lost"],
        )
        .with_min_order_value(HIGH_VALUE_THRESHOLD),
        PolicyRule::new(
            "repeated_failed_attempts",
            "notify the customer to arrange pickup; if they stay unreachable past the grace \
             window, refund the order, cancel it and send a final notice",
            &["failed attempts", "third attempt", "3 attempts", "multiple attempts"],
        ),
        PolicyRule::new(
            "complete_loss_or_theft",
            "issue an immediate full refund, then allocate replacement inventory, then \
             recreate the order, then notify the customer",
            &["theft", "stolen", "complete loss"],
        ),
        PolicyRule::new(
            "unclassified",
            "notify the customer directly; take no other action",
            &[],
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_home() {
        let policy = default_policy();
        let rule = policy
            .classify("Customer Not Home first attempt", None)
            .unwrap();
        assert_eq!(rule.signal, "customer_not_home_first_attempt");
    }

    #[test]
    fn test_classify_damaged_by_value() {
        let policy = default_policy();

        let rule = policy.classify("Package Damaged in transit", Some(120.0)).unwrap();
        assert_eq!(rule.signal, "damaged_or_lost");

        let rule = policy.classify("Package Damaged in transit", Some(250.0)).unwrap();
        assert_eq!(rule.signal, "high_value_damaged_or_lost");

        // exactly at the threshold is not high-value
        let rule = policy.classify("Package Damaged in transit", Some(200.0)).unwrap();
        assert_eq!(rule.signal, "damaged_or_lost");
    }

    #[test]
    fn test_classify_theft() {
        let policy = default_policy();
        let rule = policy.classify("package stolen from porch", Some(80.0)).unwrap();
        assert_eq!(rule.signal, "complete_loss_or_theft");
    }

    #[test]
    fn test_unclassifiable_returns_none() {
        let policy = default_policy();
        assert!(policy.classify("weird unknown situation", Some(500.0)).is_none());
    }

    #[test]
    fn test_render_includes_every_row() {
        let policy = default_policy();
        let rendered = policy.render();

        for rule in policy.rules() {
            assert!(rendered.contains(&rule.signal));
        }
        assert!(rendered.contains("unclassified"));
    }
}
