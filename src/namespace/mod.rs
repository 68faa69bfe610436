//! Path classification and namespace layout
//!
//! ```text
//!   ~/smain/work/r.pdf ──expand_home──▶ /home/u/smain/work/r.pdf
//!                                              │ classify: Document
//!                                              ▼
//!                              rewrite ──▶ /home/u/spdf/work/r.pdf
//! ```

pub mod category;
pub mod paths;

pub use category::{classify, Category};
pub use paths::{join_destination, Namespace};
