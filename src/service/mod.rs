//! Access facade over the token registry and the content store.
//!
//! - [`ImageService`]: the seven operations the HTTP layer calls

mod images;

pub use images::ImageService;
