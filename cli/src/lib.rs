//! A3S Pack CLI - export buildpack launch directories as OCI images.

pub mod commands;
