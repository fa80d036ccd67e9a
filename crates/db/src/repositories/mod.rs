pub mod comment_repo;
pub mod post_repo;
pub mod repair_repo;
pub mod user_stats_repo;

pub use comment_repo::CommentRepo;
pub use post_repo::PostRepo;
pub use repair_repo::{CandidateQuery, RepairRepo};
pub use user_stats_repo::UserStatsRepo;
