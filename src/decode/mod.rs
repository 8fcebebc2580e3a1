/// File-backed decoding
///
/// - Embedded JPEG extraction from camera RAW files (embedded.rs)
/// - The asset provider used outside of tests (file.rs)

pub mod embedded;
pub mod file;

pub use file::FileDecodeProvider;
