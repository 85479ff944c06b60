pub mod errors;
pub mod messages;
