//! Session state — stages, shared and private context, the extraction
//! ledger, and the store that owns it all.

pub mod context;
pub mod ledger;
pub mod records;
pub mod stage;
pub mod store;

pub use context::{
    AgentContext, AgentStatus, Message, Role, Session, SessionMemory, SharedContext, UserProfile,
    WorkflowProgress,
};
pub use ledger::{ExtractionLedger, ExtractionRecord, ExtractionSource};
pub use records::{
    AssemblyComplete, BusinessRecord, CampaignBrief, Candidate, CandidatesIdentified,
    MessagesDrafted, OutreachDraft,
};
pub use stage::{Stage, StageTransition, TransitionTrigger};
pub use store::{SessionHandle, SessionStore};
