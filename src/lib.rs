// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Layered configuration and framework catalog manager.
//!
//! Driving attaches a shared configuration repository to a host project and
//! manages a catalog of __framework__ repositories declared in `gitlist.json`
//! manifests. The heart of it is the manifest pipeline:
//!
//! 1. [`path`] finds the project root and configuration root.
//! 2. [`manifest`] loads every manifest into one catalog.
//! 3. [`resolve`] looks up a name and its `extends` references.
//! 4. [`sources`] rewrites relative source paths into absolute ones and
//!    merges them.
//!
//! Everything that talks to Git goes through the [`vcs::Vcs`] trait.

pub mod config;
pub mod ide;
pub mod link;
pub mod manifest;
pub mod path;
pub mod resolve;
pub mod skills;
pub mod sources;
pub mod store;
pub mod vcs;
pub mod workspace;
