pub mod connection_pair;

pub use connection_pair::{ConnectionPair, Side};
pub use packets::{packet_of, raw_bunch};

/// Routes `log` output through env_logger; safe to call from every test
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
