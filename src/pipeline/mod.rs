//! The two request pipelines and their helpers.
//!
//! ## Data Flow
//!
//! ```text
//! markdown ──▶ convert ──▶ docx bytes
//!              (uuid artifacts + pandoc, hard timeout)
//!
//! image ──▶ encode ──▶ recognize ──▶ postprocess ──▶ text
//!           (data URL)  (vision API)   (text-mode stripping)
//! ```
//!
//! 1. [`convert`]: isolate one conversion in uniquely named scratch
//!    files, run the converter, always clean up
//! 2. [`encode`]: wrap upload bytes in a base64 data URL
//! 3. [`recognize`]: validate, build the chat request, call the vision API;
//!    the only stage with network I/O
//! 4. [`postprocess`]: line-anchored markup stripping for text mode

pub mod convert;
pub mod encode;
pub mod postprocess;
pub mod recognize;
