use super::order::Order;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    #[default]
    User,
    Admin,
}

/// The authenticated caller of an escrow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::User,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    Create,
    Release { force: bool },
    Cancel,
}

impl fmt::Display for EscrowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscrowAction::Create => f.write_str("create escrow"),
            EscrowAction::Release { force: false } => f.write_str("release escrow"),
            EscrowAction::Release { force: true } => f.write_str("force-release escrow"),
            EscrowAction::Cancel => f.write_str("cancel escrow"),
        }
    }
}

/// Decides whether `actor` may perform `action` on `order`.
///
/// Buyers create and cancel, sellers release, admins only force-release.
pub fn can_perform(action: EscrowAction, order: &Order, actor: &Actor) -> bool {
    match action {
        EscrowAction::Create => order.is_buyer(&actor.id),
        EscrowAction::Release { force: false } => order.is_seller(&actor.id),
        EscrowAction::Release { force: true } => actor.is_admin(),
        EscrowAction::Cancel => order.is_buyer(&actor.id),
    }
}
