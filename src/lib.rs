//! Periodic AniList → PostgreSQL anime data updater.

pub mod anilist;
pub mod config;
pub mod db;
pub mod model;
pub mod scheduler;
pub mod updater;
