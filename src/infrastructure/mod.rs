// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod http_prototype_repository;
pub mod selection_store;
pub mod socketio;
pub mod socketio_transport;
