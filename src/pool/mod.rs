pub mod process;
pub mod thread;
pub use process::ProcessPool;
pub use thread::ThreadPool;
