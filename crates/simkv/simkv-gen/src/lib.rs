//! Service-time distributions and the Zipf key generator that drive the
//! simulated request stream's timing and key skew.

mod service_time;
mod zipf;

pub use service_time::{
    BimodalServTimeGenerator, ExpServTimeGenerator, FixedServiceTime, ServiceTimeGenerator,
    UniformServTimeGenerator,
};
pub use zipf::ZipfKeyGenerator;
