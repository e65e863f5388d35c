pub mod request_id;
pub mod terminal;
pub mod user_auth;
