//! Roles como orden total (nivel entero) y el principal autenticado.

use serde::{Deserialize, Serialize};

use crate::UserId;

string_tag! {
    pub enum Role : "role" {
        User => "user",
        PartLeader => "part_leader",
        GroupLeader => "group_leader",
        Admin => "admin",
    }
}

impl Role {
    /// user(1) < part_leader(2) < group_leader(3) < admin(4)
    pub fn level(&self) -> u8 {
        match self {
            Role::User => 1,
            Role::PartLeader => 2,
            Role::GroupLeader => 3,
            Role::Admin => 4,
        }
    }

    pub fn has_permission(&self, required: Role) -> bool {
        self.level() >= required.level()
    }
}

/// Identidad ya validada por el gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
}

impl Principal {
    pub fn has_permission(&self, required: Role) -> bool {
        self.role.has_permission(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_is_total() {
        for a in Role::ALL {
            for b in Role::ALL {
                assert_eq!(a.has_permission(*b), a.level() >= b.level());
            }
        }
        assert!(Role::Admin.has_permission(Role::GroupLeader));
        assert!(!Role::PartLeader.has_permission(Role::GroupLeader));
    }
}
