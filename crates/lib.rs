pub mod domain;
pub mod infra;
pub mod messaging;
pub mod observability;
pub mod payments;
