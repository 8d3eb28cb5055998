//! Code generation for the Peaque framework.
//!
//! Everything the framework writes as JavaScript or HTML flows through
//! here: the frontend entry that wires discovered components into the
//! client router, the standalone backend entry for production, and the
//! `<head>` fragments rendered from merged head descriptors. Output is
//! deterministic so identical inputs always produce identical bytes.

pub mod backend_entry;
pub mod code_builder;
pub mod document;
pub mod frontend_entry;
pub mod head;

pub use backend_entry::{
    generate_backend_entry, ApiRoute, BackendEntrySpec, JobEntry, PageRoute, RpcModule,
};
pub use code_builder::{CodeBuilder, ImportCollection};
pub use document::{render_document, spa_shell};
pub use frontend_entry::generate_frontend_entry;
pub use head::{collect_head_stacks, merge_heads, render_head, HeadDescriptor, HeadStacks};
