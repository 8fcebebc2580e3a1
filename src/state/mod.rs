/// State management module
///
/// This module handles everything outside the loading pipeline:
/// - Shared data structures (data.rs)
/// - The mark database and its background writer (library.rs)
/// - The asset source and folder scanning (source.rs)
/// - The session tying it all together (session.rs)

pub mod data;
pub mod library;
pub mod session;
pub mod source;
