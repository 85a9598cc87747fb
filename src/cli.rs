use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sidecar", version, about = "Worktree agent supervisor for tmux")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Workspace root (defaults to git repo root from cwd)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the supervisor event loop (default when no subcommand given)
    Dashboard,

    /// List worktrees and their agent sessions
    List,

    /// Create a worktree (and branch) for a new task
    New {
        /// Worktree name (directory basename)
        name: String,

        /// Branch name (defaults to the worktree name)
        #[arg(short, long)]
        branch: Option<String>,

        /// Base ref to branch from (defaults to the default branch)
        #[arg(long)]
        base: Option<String>,

        /// Agent to record for this worktree
        #[arg(short, long)]
        agent: Option<String>,

        /// Task-tracker id to link
        #[arg(short, long)]
        task: Option<String>,
    },

    /// Delete a worktree
    Delete {
        /// Worktree name
        name: String,
    },

    /// Start (or reconnect to) the agent session for a worktree
    Start {
        /// Worktree name
        name: String,

        /// Agent to launch (defaults to the worktree's recorded agent)
        #[arg(short, long)]
        agent: Option<String>,

        /// Initial prompt for the agent
        #[arg(short, long)]
        prompt: Option<String>,

        /// Append the agent's skip-permissions flag, if it has one
        #[arg(long)]
        skip_permissions: bool,
    },

    /// Gracefully stop a worktree's agent session
    Stop {
        /// Worktree name
        name: String,
    },

    /// Attach the terminal to a worktree's agent session
    Attach {
        /// Worktree name
        name: String,
    },

    /// Check tool availability and report orphaned sessions
    Doctor,

    /// Kill supervisor sessions whose worktree no longer exists
    Cleanup {
        /// Actually kill the orphans instead of just listing them
        #[arg(long)]
        force: bool,
    },
}
