pub mod game_repository;
pub mod session_repository;
