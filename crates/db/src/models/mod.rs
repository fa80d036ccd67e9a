pub mod comment;
pub mod post;
pub mod repair;
pub mod user_stats;
