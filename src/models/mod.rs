pub mod leaderboard;
pub mod print;
