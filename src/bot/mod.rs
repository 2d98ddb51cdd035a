//! Bot module - routes chat messages to the horoscope, weather and GigaChat handlers.

pub mod flows;
pub mod router;
pub mod telegram;


pub use flows::{Conversations, PendingStep};
pub use router::{classify, IncomingMessage, Route, Router, Services};
pub use telegram::{Messenger, TelegramClient, TextFormat};
