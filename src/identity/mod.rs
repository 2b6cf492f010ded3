// Identity reconciliation: the crosswalk-backed registry mapping every
// external identifier namespace onto one internal player key.

pub mod names;
pub mod registry;

pub use registry::{
    CrosswalkRejection, CrosswalkRow, IdentityRegistry, LoadReport, NameMatch, RegistryError,
    RejectedRowReason,
};
