//! Source location tracking for strata documents.
//!
//! Every syntax event handed to the resolution graph, every graph node and
//! every error carries a [`SourceInfo`]. Anchors into expressions embedded
//! in a scalar are expressed as substrings of the scalar's anchor, and values
//! synthesized during evaluation borrow the anchor of the node that produced
//! them.
//!
//! ```rust
//! use strata_source_map::*;
//!
//! let mut ctx = SourceContext::new();
//! let file_id = ctx.add_file("main.yml", Some("a: 1\nb: 2\n".into()));
//!
//! let range = Range::new(Location::new(5, 1, 0), Location::new(9, 1, 4));
//! let info = SourceInfo::original(file_id, range);
//!
//! let (start, _) = info.map_range(&ctx).unwrap();
//! assert_eq!(start.location.row, 1);
//! ```

pub mod context;
pub mod source_info;
pub mod types;

pub use context::{LineIndex, SourceContext, SourceFile};
pub use source_info::{MappedLocation, SourceInfo, SourceMapping};
pub use types::{FileId, Location, Range};
