// Domain layer: core models and the storage port. No provider SDKs here.

pub mod model;
pub mod ports;
