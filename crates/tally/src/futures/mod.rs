mod allocator;
mod interface;
mod numbering;
#[cfg(feature = "async-tokio")]
mod runtime;
mod sleep_provider;

pub use allocator::*;
pub use interface::*;
pub use numbering::*;
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
pub use runtime::*;
pub use sleep_provider::*;
