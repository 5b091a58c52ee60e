pub mod loader;
pub mod model;
pub mod parameters;
pub mod validate;

pub use model::{
    CheckSource, CheckSpec, CommonSection, ConfigFile, DataSourceSpec, ExtendedParameters,
    PublisherSection, RawConfigFile, TaskSpec,
};
pub use parameters::CustomParameters;
