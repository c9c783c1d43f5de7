// Application layer - Use cases and the seams they depend on
pub mod broker;
pub mod connector;
pub mod dashboard_service;
pub mod deploy_service;
pub mod dispatcher;
pub mod error;
pub mod frame_sync;
pub mod prototype_repository;
pub mod registry;
pub mod signal_feed;
pub mod signal_store;
pub mod target_selector;
