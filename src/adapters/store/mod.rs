mod memory;

pub use memory::StatCache;
