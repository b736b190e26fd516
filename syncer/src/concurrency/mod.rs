pub mod cancel;
pub mod retry;
