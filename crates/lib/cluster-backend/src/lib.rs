//! Capabilities the operator needs from the container platform: load-job
//! lifecycle, deployment environment edits and service-mesh policies.

mod deployment;
mod job;
mod mesh;

pub use self::deployment::*;
pub use self::job::*;
pub use self::mesh::*;

pub use resiliencebench_backends_core::{BackendError, BackendResult};
