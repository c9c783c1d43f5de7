// Domain layer - Runtime, signal, dashboard and wire models
pub mod dashboard;
pub mod protocol;
pub mod runtime;
pub mod signal;
