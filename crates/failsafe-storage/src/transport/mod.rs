//! Notification transport implementations
//!
//! - Amazon SNS (production)
//! - In-memory recorder (testing)

mod memory;
mod sns;

pub use memory::MemoryTransport;
pub use sns::SnsTransport;
