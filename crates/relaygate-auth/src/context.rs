use relaygate_core::ids::{PrincipalId, PrincipalKind, RoleName};

/// Immutable auth context attached to the per-call context for the handler,
/// per §4.2 step 5.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: PrincipalId,
    pub kind: PrincipalKind,
    pub roles: Vec<RoleName>,
}

impl AuthContext {
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin_or_owner(&self) -> bool {
        self.has_role(RoleName::Admin) || self.has_role(RoleName::Owner)
    }
}
