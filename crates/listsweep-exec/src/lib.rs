pub mod contracts;
pub mod driver;
pub mod media;
pub mod runner;

pub use contracts::*;
pub use driver::*;
pub use media::*;
pub use runner::*;
