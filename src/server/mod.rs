//! The server half: component registry and the turn dispatcher.

mod bus;
mod collab;
mod component;
mod dispatcher;
mod effects;
mod html;
mod registry;
mod scope;
mod uploads;

pub use bus::{EventBus, Phase, Signal, SignalEvent, Subscription};
pub use collab::{BlobStore, MemoryBlobStore, NoBlobs, NoValidation, NoViews, Validation, Validator, ViewResolver};
pub use component::{is_reserved, Args, Capabilities, Component, Rules, RESERVED_METHODS};
pub use dispatcher::{Dispatcher, InboundRequest, Mounted, PageContext};
pub use effects::EffectCompiler;
pub use html::add_root_attributes;
pub use registry::Registry;
pub use scope::Scope;
pub use uploads::is_upload_method;
