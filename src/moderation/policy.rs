/// Authorization policy for administrative actions
use crate::{
    error::{ConsoleError, ConsoleResult},
    identity::Principal,
    models::Admin,
};

/// An authenticated principal holding an admin record
///
/// Only the moderation engine builds callers, after finding the admin record.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    principal: Principal,
    admin: Admin,
}

impl Caller {
    pub(crate) fn new(principal: Principal, admin: Admin) -> Self {
        Self { principal, admin }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn admin(&self) -> &Admin {
        &self.admin
    }

    pub fn id(&self) -> &str {
        &self.principal.id
    }

    pub fn is_super_admin(&self) -> bool {
        self.admin.super_admin
    }
}

/// Action subject to the policy
#[derive(Debug, Clone, Copy)]
pub enum PolicyAction<'a> {
    /// Ban, temporary ban, unban, room deletion, dashboard access
    Moderate,
    /// Grant admin capability, possibly with super-admin rights
    GrantAdmin { super_admin: bool },
    /// Revoke an existing admin record
    RevokeAdmin { target: &'a Admin },
}

/// Decide whether `caller` may perform `action`
pub fn authorize(caller: &Caller, action: PolicyAction<'_>) -> ConsoleResult<()> {
    match action {
        PolicyAction::Moderate => Ok(()),
        PolicyAction::GrantAdmin { super_admin } => {
            if super_admin && !caller.is_super_admin() {
                return Err(ConsoleError::Unauthorized(
                    "Only super admins can grant super admin rights".to_string(),
                ));
            }
            Ok(())
        }
        PolicyAction::RevokeAdmin { target } => {
            if target.super_admin {
                return Err(ConsoleError::Unauthorized(
                    "Super admins cannot be removed".to_string(),
                ));
            }
            if caller.is_super_admin() || caller.id() == target.id {
                Ok(())
            } else {
                Err(ConsoleError::Unauthorized(
                    "Only super admins can remove other admins".to_string(),
                ))
            }
        }
    }
}
