pub mod ssd;

pub use ssd::SsdBackend;
