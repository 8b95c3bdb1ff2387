//! The analysis layer turns a frame sequence into a similarity matrix and
//! locates the contraction in it.
//!
//! All code here requires that frames were properly ingested and validated
//! by the [input processing layer].
//!
//! [input processing layer]: crate::layer_input_processing

pub mod contraction;
pub mod correlation;
pub mod median_levelset;
pub mod producer;
pub mod savgol;
pub mod similarity;
