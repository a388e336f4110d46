pub mod cross_file;

pub use cross_file::{CrossFileResolver, EntityCache, NameCollision, ResolutionReport};
