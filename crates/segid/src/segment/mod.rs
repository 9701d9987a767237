mod chain;
mod default;
mod interface;
mod merged;

pub use chain::*;
pub use default::*;
pub use interface::*;
pub use merged::*;
