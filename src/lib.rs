pub mod generator;
pub mod interfaces;
pub mod models;
pub mod parser;
pub mod rulesets;
pub mod settings;
pub mod template;
pub mod utils;
pub mod web_handlers;

// Re-export the main types for easier access
pub use interfaces::{subconverter, SubconverterConfig, SubconverterResult, SubconverterTarget};
pub use models::{Proxy, ProxyType};
pub use settings::Settings;
pub use template::TemplateArgs;
