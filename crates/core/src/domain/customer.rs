use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(pub String);

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One monitored account as configured by the operator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSpec {
    pub name: String,
    pub org_id: OrgId,
    pub credit_limit: Decimal,
    pub currency: String,
}

impl CustomerSpec {
    pub fn new(
        name: impl Into<String>,
        org_id: impl Into<String>,
        credit_limit: Decimal,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            org_id: OrgId(org_id.into()),
            credit_limit,
            currency: currency.into(),
        }
    }
}
