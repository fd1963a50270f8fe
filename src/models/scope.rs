use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

use crate::errors::ServiceError;

/// A tenant, optionally narrowed to one product, over which demand is forecast.
///
/// A missing `product_id` is the company-wide aggregate scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Validate)]
pub struct Scope {
    #[validate(length(min = 1, max = 128), custom = "validate_identifier")]
    pub tenant_id: String,
    #[validate(length(min = 1, max = 128), custom = "validate_identifier")]
    pub product_id: Option<String>,
}

impl Scope {
    /// Builds a validated scope; malformed identifiers are rejected with `InvalidScope`.
    pub fn new(
        tenant_id: impl Into<String>,
        product_id: Option<impl Into<String>>,
    ) -> Result<Self, ServiceError> {
        let scope = Self {
            tenant_id: tenant_id.into(),
            product_id: product_id.map(Into::into),
        };
        scope.ensure_valid()?;
        Ok(scope)
    }

    /// Company-wide scope for a tenant.
    pub fn tenant(tenant_id: impl Into<String>) -> Result<Self, ServiceError> {
        Self::new(tenant_id, None::<String>)
    }

    /// Scope narrowed to one product of a tenant.
    pub fn product(
        tenant_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        Self::new(tenant_id, Some(product_id))
    }

    /// Re-checks identifiers; scopes deserialized from callers bypass `new`.
    pub fn ensure_valid(&self) -> Result<(), ServiceError> {
        self.validate()
            .map_err(|e| ServiceError::InvalidScope(format!("{}: {}", self.key(), e)))
    }

    pub fn is_company_wide(&self) -> bool {
        self.product_id.is_none()
    }

    /// Stable key: `tenant` or `tenant/product`.
    pub fn key(&self) -> String {
        match &self.product_id {
            Some(product) => format!("{}/{}", self.tenant_id, product),
            None => self.tenant_id.clone(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("identifier");
        err.message = Some("identifiers may only contain [A-Za-z0-9_.:-]".into());
        Err(err)
    }
}
