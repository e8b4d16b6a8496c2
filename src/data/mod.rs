pub mod connectors;
pub mod observation;
pub mod parameters;

pub use connectors::CsvConnector;
pub use observation::{CsvObservationStore, MemoryObservationStore, ObservationStore};
pub use parameters::{JsonlParameterStore, MemoryParameterStore, ParameterRecord, ParameterStore};
