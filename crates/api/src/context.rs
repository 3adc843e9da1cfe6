use campusstay_auth::{Principal, Role};

/// Authenticated principal for a request, inserted by the auth middleware.
///
/// This is immutable and present on every protected route.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn role(&self) -> Role {
        self.principal.role()
    }
}
