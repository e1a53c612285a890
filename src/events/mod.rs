pub mod publisher;

pub use publisher::{LifecycleEvent, LifecycleEventPublisher};
