pub mod fogbugz;
pub mod http;
pub mod response;
pub mod secrets;
