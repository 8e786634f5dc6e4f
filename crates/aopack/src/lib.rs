//! aopack: bundle a multi-file Lua project into one AO `Eval` payload
//!
//! The pipeline has two halves. [`graph_builder`] walks the `require` graph of
//! a project starting at its entry file and returns the local modules in
//! dependency order. [`bundler`] folds that ordered list into a single Lua
//! source string that registers every dependency in the module cache before
//! running the entry file.

pub mod bundler;
pub mod config;
pub mod dependency_graph;
pub mod dirs;
pub mod fs;
pub mod graph_builder;
pub mod naming;
pub mod orchestrator;
pub mod require_scanner;
