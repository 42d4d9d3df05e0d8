//! Reqflow Core Library
//!
//! Requirement state, typed domain events and the asynchronous import,
//! analysis and attachment workflows around them.

pub mod bus;
pub mod capability;
pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod mediator;
pub mod natural;
pub mod orchestrator;
pub mod progress;
pub mod requirement;
pub mod workflow;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use capability::Capabilities;
pub use config::MediatorConfig;
pub use error::{ReqflowError, ReqflowResult};
pub use events::{DomainEvent, EventKind};
pub use mediator::RequirementsMediator;
pub use requirement::model::Requirement;
