//! Application layer: the services the front-end and the console call into.
//!
//! Each service holds only shared store handles and no entity state, so every
//! request can run as an independent task. [`Services`] wires them all over
//! one [`Stores`] set.

pub mod directory;
pub mod ledger;
pub mod referral;
pub mod registry;
pub mod reservation;
pub mod session;

pub use directory::UserDirectory;
pub use ledger::Ledger;
pub use referral::{Attribution, NoOpReason, ReferralService};
pub use registry::ResourceRegistry;
pub use reservation::ReservationEngine;
pub use session::FormSessions;

use crate::domain::ports::Stores;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Make the bike available again when its rental closes. Off by default:
    /// a returned bike waits for an administrator to release it.
    pub release_on_close: bool,
}

#[derive(Clone)]
pub struct Services {
    pub directory: UserDirectory,
    pub registry: ResourceRegistry,
    pub reservations: ReservationEngine,
    pub referrals: ReferralService,
    pub ledger: Ledger,
}

impl Services {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        Self {
            directory: UserDirectory::new(stores.users.clone()),
            registry: ResourceRegistry::new(stores.resources.clone(), stores.users.clone()),
            reservations: ReservationEngine::new(
                stores.rentals.clone(),
                stores.resources.clone(),
                config,
            ),
            referrals: ReferralService::new(stores.users),
            ledger: Ledger::new(stores.rentals, stores.payouts),
        }
    }
}
