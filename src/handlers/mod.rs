pub mod health;
pub mod diagnostics;
pub mod doc_export;
pub mod reset;
pub mod websocket_info;

pub use health::*;
pub use diagnostics::*;
pub use doc_export::*;
pub use reset::*;
pub use websocket_info::*;
