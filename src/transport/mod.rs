//! Transport bindings of the channel contract
pub mod registry;
pub mod socket;
pub mod topic;
