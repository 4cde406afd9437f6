pub mod chat;
pub mod events;
pub mod history;
pub mod options;
pub mod storage;
