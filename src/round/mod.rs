// Round lifecycle: state machine, entity, registry and orchestration
pub mod manager;
pub mod record;
pub mod registry;
pub mod status;
pub mod trading_round;

pub use manager::{Collaborators, RoundManager, RoundOutcome};
pub use record::{
    DecisionOutcome, DecisionRecord, OrderKind, OrderRecord, OrderRecordStatus, RoundMetrics,
    StatusChange,
};
pub use registry::{RoundRegistry, RoundSummary};
pub use status::RoundStatus;
pub use trading_round::Round;
