mod tokio_sleep;

pub use tokio_sleep::*;
