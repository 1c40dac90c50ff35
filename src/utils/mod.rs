pub mod ip;

pub use ip::{IpRange, IpRangeError, IpRanges, client_ip};
