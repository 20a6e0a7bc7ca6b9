pub mod channel;
pub mod channel_config;
pub mod channel_id;
pub mod channel_kind;
pub mod control;
pub mod entity;
pub mod partial;
pub mod reliable;
