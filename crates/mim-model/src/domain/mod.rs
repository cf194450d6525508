mod id;
pub use id::{DeviceId, LabelId};

mod label;
pub use label::Label;

mod device;
pub use device::Device;
