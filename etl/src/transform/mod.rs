pub mod catalog;
pub mod events;
pub mod facts;

pub use catalog::CatalogTransformer;
pub use events::EventTransformer;
pub use facts::{FactAssembler, FactMetrics};
