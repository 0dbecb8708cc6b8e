pub mod leaderboard_service;
#[cfg(test)]
pub mod memory_store;
pub mod print_service;
pub mod rank_service;
pub mod store;
