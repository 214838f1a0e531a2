//! Blogicum - a small blogging platform
//!
//! Users publish posts, optionally scheduled for a future date and filed
//! under a category and a location, and comment on each other's posts.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
