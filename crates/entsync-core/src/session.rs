// ── Session scope ──
//
// The tenant/region the console is currently operating in. Cached data is
// implicitly scoped to it, so loaders re-evaluate whenever it changes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current tenant/region scoping context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionScope {
    pub tenant: Option<String>,
    pub region: Option<String>,
}

impl SessionScope {
    pub fn new(tenant: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            tenant: Some(tenant.into()),
            region: Some(region.into()),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.tenant.as_deref().unwrap_or("-"),
            self.region.as_deref().unwrap_or("-")
        )
    }
}
