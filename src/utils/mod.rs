//! Cross-cutting helpers used by more than one module, the way the
//! teacher keeps a bare `utils` module alongside its `core` tree.

pub mod compression;
pub mod helpers;
