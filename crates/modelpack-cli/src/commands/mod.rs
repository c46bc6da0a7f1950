mod dockerfile;
mod init;
mod plan;

pub use dockerfile::dockerfile;
pub use init::init_project;
pub use plan::plan;
