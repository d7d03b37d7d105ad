//! Helper functions and types that don't belong to a specific storage backend or API.
mod delivery;

pub use delivery::DeliveryMinter;
