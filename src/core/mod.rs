pub mod fetch;
pub mod pipeline;
pub mod resolver;
pub mod transfer;
pub mod transform;
