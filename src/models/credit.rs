use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Standalone, non-expiring message credits.
///
/// `credits == total_earned - total_used` holds after every store mutation;
/// the balance can never go negative because decrements are conditional.
#[derive(Debug, Clone, Copy, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditBalance {
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub credits: i64,
    pub total_earned: i64,
    pub total_used: i64,
}

impl CreditBalance {
    pub fn empty(user_id: Uuid) -> Self {
        CreditBalance {
            user_id,
            credits: 0,
            total_earned: 0,
            total_used: 0,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.credits >= 0 && self.credits == self.total_earned - self.total_used
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "charge_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChargeSource {
    Subscription,
    Credits,
}

/// One unit of allowance that was taken and may have to be given back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    Subscription(Uuid),
    Credits,
}

impl Charge {
    pub fn source(&self) -> ChargeSource {
        match self {
            Charge::Subscription(_) => ChargeSource::Subscription,
            Charge::Credits => ChargeSource::Credits,
        }
    }

    pub fn subscription_id(&self) -> Option<Uuid> {
        match self {
            Charge::Subscription(id) => Some(*id),
            Charge::Credits => None,
        }
    }

    /// Rebuilds a charge from its persisted columns.
    pub fn from_parts(source: Option<ChargeSource>, subscription_id: Option<Uuid>) -> Option<Self> {
        match (source?, subscription_id) {
            (ChargeSource::Credits, _) => Some(Charge::Credits),
            (ChargeSource::Subscription, Some(id)) => Some(Charge::Subscription(id)),
            (ChargeSource::Subscription, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_balance_is_consistent() {
        assert!(CreditBalance::empty(Uuid::new_v4()).is_consistent());
        let drifted = CreditBalance {
            user_id: Uuid::new_v4(),
            credits: 3,
            total_earned: 5,
            total_used: 1,
        };
        assert!(!drifted.is_consistent());
    }

    #[test]
    fn charge_round_trips_through_columns() {
        let sub = Uuid::new_v4();
        let charge = Charge::Subscription(sub);
        assert_eq!(
            Charge::from_parts(Some(charge.source()), charge.subscription_id()),
            Some(charge)
        );
        assert_eq!(
            Charge::from_parts(Some(ChargeSource::Credits), None),
            Some(Charge::Credits)
        );
        assert_eq!(Charge::from_parts(Some(ChargeSource::Subscription), None), None);
        assert_eq!(Charge::from_parts(None, Some(sub)), None);
    }
}
