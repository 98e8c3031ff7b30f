pub mod handler;
mod msg_auth_handler;
mod msg_load_handler;
mod msg_ping_handler;
mod msg_presence_handler;
mod msg_survey_handler;
mod msg_update_handler;
