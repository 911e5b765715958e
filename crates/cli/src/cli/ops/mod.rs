pub mod cat;
pub mod gc;
pub mod init;
pub mod ls;
pub mod put;
pub mod version;

pub use cat::Cat;
pub use gc::Gc;
pub use init::Init;
pub use ls::Ls;
pub use put::Put;
pub use version::Version;
