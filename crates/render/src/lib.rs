//! Block-document renderer — converts the declarative popup content format
//! produced by the designer into a single markup string. Pure: no network,
//! no storage, no clock.

pub mod blocks;

pub use blocks::{render_content, Block};
