// HTTP request handlers and the API key gate

pub mod connection;
pub mod gate;
pub mod health;
pub mod logs;
pub mod payload;
pub mod settings;
pub mod status;
pub mod upload;
