mod executor;
mod job;
mod worker;

pub use executor::*;
pub use job::*;
pub use worker::*;
