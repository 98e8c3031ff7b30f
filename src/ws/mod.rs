pub mod connctx;
pub mod peers;
