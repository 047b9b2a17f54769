pub mod capture;
pub mod classifier;
pub mod config;
pub mod container;
pub mod fingerprint;
pub mod geometry;
pub mod group_code;
pub mod parser;
pub mod persistence;
pub mod reconcile;
pub mod sessions;
pub mod sweep;
pub mod today;

pub use capture::*;
pub use classifier::*;
pub use config::*;
pub use container::*;
pub use geometry::*;
pub use parser::*;
pub use reconcile::*;
pub use sessions::*;
pub use sweep::*;

pub use persistence::*;
