pub mod ingest;
pub mod leaderboard;
pub mod ratings;
pub mod scoring;
