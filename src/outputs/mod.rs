//! Output generation for published posts.
//!
//! # Submodules
//!
//! - [`html`]: Renders an [`AggregationBatch`](crate::models::AggregationBatch)
//!   into the Blogger post body

pub mod html;
