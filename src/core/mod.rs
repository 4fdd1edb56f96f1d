// Core modules: configuration, authentication, transport contract, session state, naming.
pub mod agent;
pub mod auth;
pub mod config;
pub mod connspec;
pub mod context;
pub mod error;
pub mod namespace;
pub mod rest;
pub mod session;
