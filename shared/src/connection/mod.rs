pub mod channel_table;
pub mod connection;
pub mod connection_config;
pub mod error;
pub mod events;
pub mod packet_id_range;
pub mod packet_transport;
pub mod packet_writer;
