mod generate;
mod serve;

pub use generate::run_generate;
pub use serve::run_serve;
