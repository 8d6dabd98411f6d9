//! Services module - collaborators the state machine delegates to.
//!
//! The core keeps two concerns at arm's length behind this module:
//!
//! - [`encoding`]: the boundary between in-memory UTF-8 and the legacy
//!   Windows-1252 files (`plugins.txt`, `Morrowind.ini`), plus strict
//!   UTF-8 reads for `loadorder.txt`.
//! - [`esp`]: plugin-record parsing, reduced to the master flag and the
//!   declared-masters list. [`RecordReader`] is an injectable seam;
//!   [`EspReader`] is the built-in header-only implementation.
//!
//! Nothing in here holds state or touches the order files; these are
//! pure functions over bytes and paths.

pub mod encoding;
pub mod esp;

pub use encoding::Transcoder;
pub use esp::{EspReader, RecordReader};
