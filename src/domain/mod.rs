//! Domain layer: entities, money types and the ports the services depend on.

pub mod money;
pub mod payout;
pub mod ports;
pub mod rental;
pub mod resource;
pub mod user;
