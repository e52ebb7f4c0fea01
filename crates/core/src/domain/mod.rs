pub mod customer;

pub use customer::{CustomerSpec, OrgId};
