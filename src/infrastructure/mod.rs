pub mod abi;
pub mod console_channel;
pub mod eth_log_source;
pub mod fake_source;
pub mod multi_channel;
pub mod sms_channel;
