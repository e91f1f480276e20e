//! Agent workspaces
//!
//! Each upload gets its own directory under the store root, named after its
//! agent id:
//!
//! ```text
//! {workspace_root}/
//! ├── agent_3f1c…/        ← one upload batch
//! │   ├── main.py
//! │   └── test_main.py
//! └── agent_9a02…/
//! ```

pub mod store;

pub use store::{Workspace, WorkspaceStore, AGENT_ID_PREFIX};
