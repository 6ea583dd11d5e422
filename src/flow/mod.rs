//! Turn handling: routing, context injection, completion signals, and the
//! controller that owns stage transitions.

pub mod controller;
pub mod coordinator;
pub mod injector;
pub mod router;
pub mod signal;

pub use controller::{RouteDecision, StageController};
pub use coordinator::{TurnCoordinator, TurnOutcome, TurnRequest};
pub use router::{IntentClassifier, KeywordIntentClassifier};
pub use signal::{CompletionSignal, SIGNAL_MARKER};
