//! Docuva - A knowledge base with AI-assisted authoring
//!
//! Modules group topics, topics group articles, and a separate navigation
//! taxonomy of menus and sub-menus points at the same articles. This crate
//! holds the storage layer, services, JSON API and server-rendered site.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod site;
pub mod theme;
