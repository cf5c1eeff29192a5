//! Retrying fetch controller.

mod controller;
mod policy;
mod state;

pub use controller::{FetchController, FetchControllerBuilder};
pub use policy::RetryPolicy;
pub use state::{AsyncDataState, FetchPhase};
