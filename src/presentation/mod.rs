// Presentation layer - HTTP routes, event streams and the widget frame socket
pub mod app_state;
pub mod frames;
pub mod handlers;
pub mod streams;
