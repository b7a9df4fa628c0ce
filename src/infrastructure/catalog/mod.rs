pub mod task_loader;

pub use task_loader::TaskLoader;
