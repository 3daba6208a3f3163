use serde::{Deserialize, Serialize};

use super::payment::TransactionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    OneTime,
    Subscription,
}

impl PlanKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            PlanKind::OneTime => TransactionType::OneTime,
            PlanKind::Subscription => TransactionType::Subscription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub name: String,
    pub description: String,
    pub kind: PlanKind,
    /// Credits granted once, or messages allowed per billing period.
    pub quantity: i64,
    /// Price in cents.
    pub amount: i64,
    #[serde(skip_serializing)]
    pub price_id: Option<String>,
}

impl Plan {
    pub fn is_purchasable(&self) -> bool {
        self.price_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Subscription plans whose subscribers may export messages to a spreadsheet.
pub const EXPORT_ELIGIBLE_PLANS: [&str; 2] = ["plan_2", "plan_3"];

struct PlanSeed {
    plan_id: &'static str,
    name: &'static str,
    description: &'static str,
    kind: PlanKind,
    quantity: i64,
    amount: i64,
    price_env: &'static str,
}

/// Credit packs keep the `STRIPE_PRICE_ONE/TWO/THREE` names existing deployments set.
const PLAN_SEEDS: [PlanSeed; 6] = [
    PlanSeed {
        plan_id: "plan_1",
        name: "Starter",
        description: "100 messages every month",
        kind: PlanKind::Subscription,
        quantity: 100,
        amount: 999,
        price_env: "STRIPE_PRICE_PLAN_1",
    },
    PlanSeed {
        plan_id: "plan_2",
        name: "Growth",
        description: "500 messages every month plus Excel export",
        kind: PlanKind::Subscription,
        quantity: 500,
        amount: 2999,
        price_env: "STRIPE_PRICE_PLAN_2",
    },
    PlanSeed {
        plan_id: "plan_3",
        name: "Pro",
        description: "1500 messages every month plus Excel export",
        kind: PlanKind::Subscription,
        quantity: 1500,
        amount: 6999,
        price_env: "STRIPE_PRICE_PLAN_3",
    },
    PlanSeed {
        plan_id: "credits_100",
        name: "Starter Pack",
        description: "100 message credits",
        kind: PlanKind::OneTime,
        quantity: 100,
        amount: 499,
        price_env: "STRIPE_PRICE_ONE",
    },
    PlanSeed {
        plan_id: "credits_500",
        name: "Growth Pack",
        description: "500 message credits",
        kind: PlanKind::OneTime,
        quantity: 500,
        amount: 1999,
        price_env: "STRIPE_PRICE_TWO",
    },
    PlanSeed {
        plan_id: "credits_1500",
        name: "Pro Pack",
        description: "1500 message credits",
        kind: PlanKind::OneTime,
        quantity: 1500,
        amount: 4999,
        price_env: "STRIPE_PRICE_THREE",
    },
];

/// The fixed plan catalog with Stripe price ids resolved at start-up.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Builds the catalog, looking price ids up through `price_for(env_var)`.
    pub fn build(price_for: impl Fn(&str) -> Option<String>) -> Self {
        let plans = PLAN_SEEDS
            .iter()
            .map(|seed| Plan {
                plan_id: seed.plan_id.to_string(),
                name: seed.name.to_string(),
                description: seed.description.to_string(),
                kind: seed.kind,
                quantity: seed.quantity,
                amount: seed.amount,
                price_id: price_for(seed.price_env).filter(|p| !p.trim().is_empty()),
            })
            .collect();
        PlanCatalog { plans }
    }

    pub fn from_env() -> Self {
        Self::build(|key| std::env::var(key).ok())
    }

    /// Catalog with synthetic price ids, used by tests.
    pub fn with_test_prices() -> Self {
        Self::build(|key| Some(format!("price_{}", key.to_lowercase())))
    }

    pub fn plans(&self) -> &[Plan] {
        &self.plans
    }

    pub fn find(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.plan_id == plan_id)
    }

    pub fn find_by_price_id(&self, price_id: &str) -> Option<&Plan> {
        self.plans
            .iter()
            .find(|p| p.price_id.as_deref() == Some(price_id))
    }
}
