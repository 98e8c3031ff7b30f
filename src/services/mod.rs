pub mod session_registry;
pub mod watchdog;
pub mod update_relay;
pub mod presence_relay;
pub mod survey;
