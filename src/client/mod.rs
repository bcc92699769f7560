//! The client half: component bookkeeping, action batching and DOM reconciliation.

pub mod component;
mod connection;
pub mod directives;
pub mod dom;
pub mod hooks;
pub mod message;
pub mod morph;
pub mod offline;
pub mod polling;
pub mod queue;
mod runtime;

pub use component::Component;
pub use connection::{Connection, Delivery, HttpReply, LoopbackTransport, OutboundRequest, Ticket, Transport};
pub use dom::{Browser, Dom, NodeKind, UserEvent, Visit};
pub use hooks::{Hook, HookBus, HookEvent, Incoming};
pub use message::{Message, MessageState, QueuedAction};
pub use morph::{morph, MorphObserver, MorphOptions, MorphSummary};
pub use runtime::Runtime;
