//! `mailsexp`: search mail folders with a small S-expression language.
//!
//! This crate provides the expression parser and evaluator, the header,
//! body and thread predicates it calls, and the folder backends (MBOX
//! files with a persisted summary index, in-memory folders, and a SQLite
//! summary database that whole searches can be delegated to).

pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod parser;
pub mod search;
pub mod sexp;
pub mod store;
