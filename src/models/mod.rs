pub mod chat;
pub mod payload;
pub mod websocket;
