//! Path validation used when resolving blob descriptor locations back to
//! filesystem paths under a namespace's `_blobs/` directory.

pub mod path;

pub use path::*;
