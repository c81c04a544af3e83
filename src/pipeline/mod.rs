//! Pipeline stages for paste ingestion and Markdown output.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets the
//! coordinator, the direct-upload path and the CLI reuse them piecemeal.
//!
//! ## Data Flow
//!
//! ```text
//! clipboard HTML ──▶ strip ──▶ extract ──▶ document ──▶ bridge ──▶ postprocess
//!  (Fragment)       (noise)   (decode +    (insert)     (HTML→MD)   (cleanup)
//!                              upload)
//! ```
//!
//! 1. [`strip`]: remove producer noise (office-suite markup, comments,
//!    scripts and styles); pure and infallible
//! 2. [`decode`]: turn a `data:` URI into bytes, MIME type and filename
//! 3. [`upload`]: drive the uploader with timeout and retry/backoff; the
//!    only stage with network I/O
//! 4. [`extract`]: decode and upload every inline image of a fragment
//!    concurrently, then rewrite or remove each `<img>`
//! 5. [`postprocess`]: deterministic text-cleanup rules applied to the
//!    Markdown writer's output

pub mod decode;
pub mod extract;
pub mod postprocess;
pub mod strip;
pub mod upload;
