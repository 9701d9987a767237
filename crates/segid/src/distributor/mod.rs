#[cfg(feature = "async-tokio")]
mod block_on;
mod interface;
mod memory;
#[cfg(any(feature = "sqlite", feature = "async-sqlite"))]
mod sql;
#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "async-sqlite")]
mod sqlx_store;
mod store;

#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub use block_on::*;
pub use interface::*;
pub use memory::*;
#[cfg_attr(docsrs, doc(cfg(any(feature = "sqlite", feature = "async-sqlite"))))]
#[cfg(any(feature = "sqlite", feature = "async-sqlite"))]
pub use sql::*;
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
#[cfg(feature = "sqlite")]
pub use sqlite::*;
#[cfg_attr(docsrs, doc(cfg(feature = "async-sqlite")))]
#[cfg(feature = "async-sqlite")]
pub use sqlx_store::*;
pub use store::*;
