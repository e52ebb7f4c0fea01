use std::fmt;

use creditwatch_core::domain::CustomerSpec;
use creditwatch_core::extract::RawReplies;

/// The three questions asked about every customer, in the order they are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Balance,
    Usage,
    Flags,
}

impl QueryKind {
    pub const ALL: [Self; 3] = [Self::Balance, Self::Usage, Self::Flags];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Usage => "usage",
            Self::Flags => "flags",
        }
    }

    pub fn prompt(self, customer: &CustomerSpec) -> String {
        let org_id = &customer.org_id;
        match self {
            Self::Balance => format!(
                "What is the current account balance and the credit limit for organization \
                 {org_id}? Give both amounts in {}.",
                customer.currency
            ),
            Self::Usage => format!(
                "For organization {org_id}, what is the current month usage so far, the \
                 monthly recurring charge (MRC) for next month, and the daily run rate?"
            ),
            Self::Flags => format!(
                "For organization {org_id}, is auto-recharge enabled, and does the account \
                 have VIP status? Answer each question with yes or no."
            ),
        }
    }

    pub fn record(self, replies: &mut RawReplies, text: String) {
        match self {
            Self::Balance => replies.balance = text,
            Self::Usage => replies.usage = text,
            Self::Flags => replies.flags = text,
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use creditwatch_core::domain::CustomerSpec;
    use creditwatch_core::extract::RawReplies;
    use rust_decimal::Decimal;

    use super::QueryKind;

    #[test]
    fn prompts_name_the_organization() {
        let customer = CustomerSpec::new("Acme", "org-acme", Decimal::new(10_000, 0), "EUR");

        for kind in QueryKind::ALL {
            assert!(kind.prompt(&customer).contains("org-acme"), "{kind} prompt lacks org id");
        }
        assert!(QueryKind::Balance.prompt(&customer).contains("EUR"));
    }

    #[test]
    fn replies_are_recorded_by_kind() {
        let mut replies = RawReplies::default();
        QueryKind::Usage.record(&mut replies, "MRC: $200".to_owned());

        assert_eq!(replies.usage, "MRC: $200");
        assert!(replies.balance.is_empty());
        assert!(replies.flags.is_empty());
    }
}
