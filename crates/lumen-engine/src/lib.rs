pub mod client;
pub mod config;
pub mod session;

pub use client::{
    ClientError, DryrunTransport, GeminiTransport, GenerationClient, ModelTransport,
    PromptActionKind,
};
pub use config::ClientConfig;
pub use session::{
    now_millis, Action, Changes, Effect, Gallery, HistoryRow, Phase, PromptRequest, Rejection,
    SessionController, SessionEvent, SessionView, Update,
};
