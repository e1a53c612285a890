pub mod scheduler_registry;

pub use scheduler_registry::SchedulerRegistry;
