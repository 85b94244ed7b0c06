use serde::{Deserialize, Serialize};

use crate::domain::tender::Tender;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Vendor,
    Buyer,
    Admin,
}

/// The identity on whose behalf a lifecycle operation runs. Controllers
/// resolve authentication upstream; the engine only needs id + role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: UserId, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn vendor(id: i64) -> Self {
        Self::new(UserId(id), ActorRole::Vendor)
    }

    pub fn buyer(id: i64) -> Self {
        Self::new(UserId(id), ActorRole::Buyer)
    }

    pub fn admin(id: i64) -> Self {
        Self::new(UserId(id), ActorRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Owner-or-admin check used by every buyer-side entry point.
    pub fn can_manage(&self, tender: &Tender) -> bool {
        self.is_admin() || tender.created_by == self.id
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::tender::{Tender, TenderId, TenderStatus};

    use super::{Actor, UserId};

    fn tender_owned_by(owner: i64) -> Tender {
        Tender {
            id: TenderId(1),
            title: "Office refurbishment".to_string(),
            description: String::new(),
            category_id: None,
            budget_min: None,
            budget_max: None,
            deadline: Utc::now() + chrono::Duration::days(7),
            status: TenderStatus::Open,
            created_by: UserId(owner),
            view_count: 0,
            requirements: None,
            published_at: None,
            closing_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_can_manage_own_tender() {
        let tender = tender_owned_by(7);
        assert!(Actor::buyer(7).can_manage(&tender));
        assert!(!Actor::buyer(8).can_manage(&tender));
    }

    #[test]
    fn admin_can_manage_any_tender() {
        let tender = tender_owned_by(7);
        assert!(Actor::admin(99).can_manage(&tender));
    }
}
