//! Necessary types, helpers, and functions to ingest frames and to prepare
//! them for the **analysis layer**.
//!
//! Frames enter through a [`source::FrameSource`], are validated against the
//! capture timeline, and end up in a [`time_index_cache::TimeIndexCache`].
//! Apart from listing an image directory, nothing here touches the outer
//! world. Decoding of image and movie formats is injected by the user.

pub mod f64;
pub mod frame;
pub mod loader;
pub mod source;
pub mod time_index_cache;
