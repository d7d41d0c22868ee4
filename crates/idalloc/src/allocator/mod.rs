mod block;
mod lock;
#[cfg(feature = "async-tokio")]
mod tokio_lock;

pub use lock::*;
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub use tokio_lock::*;
