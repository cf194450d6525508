mod domain;
pub use domain::{Device, DeviceId, Label, LabelId};

mod error;
pub use error::{ModelError, ModelResult};

mod spec;
pub use spec::PoolSpec;
