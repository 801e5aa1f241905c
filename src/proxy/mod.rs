// Guarded proxying of chat-completion requests

pub mod pipeline;
pub mod stream;
