pub mod bot;
pub mod command;
pub mod interaction;

pub use bot::{now, Bot, Nominee, UserPoll};
pub use db::{Config, Database, NoTls};
pub use ed25519_dalek::VerifyingKey;
pub use model::TTL;
pub use twilight_http::Client as Discord;
pub use twilight_model::id::{
    marker::{ApplicationMarker, GuildMarker},
    Id,
};
