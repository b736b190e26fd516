mod base;
mod persistence;
mod retry;
mod worker;
mod workload;

pub use base::*;
pub use persistence::*;
pub use retry::*;
pub use worker::*;
pub use workload::*;
