pub mod flow;
pub mod logging;
