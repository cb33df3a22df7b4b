//! Kasane core library.
//!
//! Kasane constructs derived build rules on demand. A [`target::BuildTarget`]
//! names a declared target plus a set of flavours; the
//! [`resolver::RuleResolver`] turns each flavoured target into exactly one
//! rule registered in a [`registry::RuleRegistry`]. Flavours select the Infer
//! pipeline stage, the C/C++ platform and the derived artefact, while
//! [`capability`] traits let rules from different toolchains link against
//! and include headers from one another.
//!
//! Target graphs are read from YAML manifests by [`manifest`] and driven
//! from the command line through [`cli`] and [`runner`].

pub mod capability;
pub mod cli;
pub mod config;
pub mod cxx;
pub mod error;
pub mod flavour;
pub mod graph;
pub mod infer;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod swift;
pub mod target;
pub mod traversal;
