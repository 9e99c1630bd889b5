pub mod chats;
pub mod connection;
pub mod dispatch;
pub mod envelope;
pub mod events;
pub mod fanout;
pub mod registry;
pub mod server;
