mod health;
mod invariants;
mod mint;
mod settle;
mod sweep;

pub use health::health_routes;
pub use invariants::invariants_routes;
pub use mint::mint_routes;
pub use settle::settle_routes;
pub use sweep::sweep_routes;
