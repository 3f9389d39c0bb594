pub mod agent;
pub mod binary;
pub mod capacity;
pub mod error;
pub mod keypair;
pub mod policy;
pub mod session;
pub mod slots;
pub mod usage;
pub mod user;

pub use agent::{AgentRecord, AgentStatus};
pub use binary::{bytes_to_gib, display_binary_size, gib_to_bytes, parse_binary_size, BYTES_PER_GIB};
pub use capacity::{Capacity, SAFE_MAX_INT};
pub use error::SlotError;
pub use keypair::KeypairRecord;
pub use policy::{DefaultForUnspecified, ResourcePolicyRecord};
pub use session::{
    format_elapsed, ClusterMode, SessionRecord, SessionStatus, SessionType,
};
pub use slots::{
    parse_slots, NormalizeOptions, ResourceKind, ResourceSlotRecord, SlotUnit, UnknownSlotPolicy,
};
pub use usage::{
    compute_usage, display_capacity, display_slot_amount, mark_if_unlimited,
    mark_if_unlimited_text, try_compute_usage, usage_rows, NormalizedUsage, UsageRow,
    NOT_AVAILABLE_SYMBOL, UNLIMITED_SYMBOL,
};
pub use user::{AccountRole, UserRecord, UserSettings};

pub mod auth;
pub mod telemetry;
