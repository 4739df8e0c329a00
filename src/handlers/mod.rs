pub mod arp_handler;
pub mod dispatcher;
pub mod ip_handler;
pub mod pwospf_handler;
