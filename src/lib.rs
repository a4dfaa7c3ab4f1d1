//! Oris: occupational risk tracking and corporate wellness backend.

pub mod app_config;
pub mod daily;
pub mod db;
pub mod error;
pub mod exams;
pub mod jobs;
pub mod middleware;
pub mod notifications;
pub mod occurrences;
pub mod orm;
pub mod rate_limit;
pub mod risk;
pub mod session;
pub mod stats;
pub mod storage;
pub mod user;
pub mod web;
