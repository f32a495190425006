mod models;

pub use models::{Credentials, TokenPair, TokenPairDto, UserProfile, BEARER_SCHEME};
