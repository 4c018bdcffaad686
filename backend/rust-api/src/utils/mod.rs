pub mod client_ip;
pub mod retry;
pub mod token;
