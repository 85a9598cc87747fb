//! Worktree agent supervisor: a control plane for a fleet of interactive
//! coding agents, one per git worktree, each living in a detached tmux
//! session. The supervisor spawns and adopts sessions, captures their
//! scrollback in batches, classifies agent state from the output tail,
//! relays user input back into the panes, and drives the merge workflow.
//!
//! The enclosing TUI talks to the supervisor over two channels: it feeds
//! [`supervisor::events::SupervisorEvent`]s in and drains render-agnostic
//! [`supervisor::events::UiMsg`]s out. Nothing in this crate draws.

pub mod buffer;
pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod status;
pub mod supervisor;
