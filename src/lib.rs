//! # fakebuild - Rule Graphs and Module Builds
//!
//! `fake` reads a `Fakefile` of `target <- prerequisites` rules, decides what
//! is stale by modification time, and rebuilds it, sequentially or on a
//! bounded worker pool. Rules that name a `pom.xml` are built by a resolver
//! that walks coordinates, parents and profiles, downloading missing
//! artifacts with SHA-1 verification.
//!
//! ## Quick Start
//!
//! ```bash
//! # Build the default rule
//! fake
//!
//! # Override a variable and build one target
//! fake DEBUG=true ij.jar
//!
//! # Package a module and copy its runtime dependencies
//! fake module jars --pom core/pom.xml
//! ```
//!
//! ## Module Organization
//!
//! - [`rules`] - Rule file parsing, variables, globs and the rule graph
//! - [`build`] - Up-to-date checks, actions and scheduling
//! - [`maven`] - Coordinates, descriptors and dependency resolution
//! - [`session`] - Shared configuration and collaborators for a run
//! - [`commands`] - CLI command handlers

/// Up-to-date checks, rule actions, sequential and parallel scheduling.
pub mod build;

/// Handlers for the `module` and `doctor` subcommands.
pub mod commands;

/// Configuration file parsing (`fake.toml`) and environment overrides.
pub mod config;

/// Error type shared by every layer.
pub mod error;

/// Coordinates, descriptors, repositories and module builds.
pub mod maven;

/// Archive writing.
pub mod package;

/// Rule files and the rule graph.
pub mod rules;

/// Per-run state: configuration, compiler, process runner and resolver.
pub mod session;

/// Compiler and process abstractions.
pub mod toolchain;

/// Dependency tree visualization.
pub mod tree;

/// Terminal UI utilities (tables).
pub mod ui;
