//! Build identity: statuses, start types, channels, build records and the
//! reserved bookkeeping parameter keys.

mod info;
mod keys;
mod status;

pub use info::{BuildInstance, PipelineInfo, RunningTask};
pub use keys::{is_skip_key, skip_element_key, ReservedKey, SKIP_ELEMENT_PREFIX};
pub use status::{BuildStatus, ChannelCode, StartType};

/// Flat start parameter map threaded through launch, retry and snapshots.
pub type ParamMap = std::collections::HashMap<String, serde_json::Value>;
