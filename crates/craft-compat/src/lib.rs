//! Optional third-party capabilities, probed once at startup.
#![forbid(unsafe_code)]

pub mod capability;
pub mod provider;

pub use capability::{CapabilityProbe, CapabilityState, CapabilityTable, StaticProbe, well_known};
pub use provider::{
    CapabilityProvider, CapabilityRequest, CapabilityResponse, CapabilityUnavailable, Providers,
};
