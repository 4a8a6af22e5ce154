pub mod generator;
pub mod subconverter;

pub use generator::simple_generator;
pub use subconverter::{subconverter, SubconverterConfig, SubconverterResult, SubconverterTarget};
