mod client;
mod models;
mod spec;

pub use client::StakeClient;
pub use models::{GraphqlRequest, RawRound, parse_page};
pub use spec::{GameProfile, GameProfiles};
