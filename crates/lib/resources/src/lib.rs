//! Declarative resource records managed by the resiliencebench control loops.
//!
//! Every record serializes as `{"metadata": ..., "spec": ..., "status": ...}` so
//! repositories can version the spec and status halves independently.

mod benchmark;
pub mod labels;
mod meta;
mod queue;
mod scenario;
mod service;
mod status;
mod workload;

pub use self::benchmark::*;
pub use self::meta::*;
pub use self::queue::*;
pub use self::scenario::*;
pub use self::service::*;
pub use self::status::*;
pub use self::workload::*;
