mod chat;
mod model;
mod settings;
mod stream;

pub use chat::*;
pub use model::*;
pub use settings::*;
pub use stream::*;
